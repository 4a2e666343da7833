//! kubectl-style rendering of a drain report.
//!
//! Sections are printed in a fixed order. Empty cells show `<none>`, values
//! that could not be determined show `none`.

use std::fmt::{self, Write};

use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::report::{
    BudgetPod, BudgetReport, DrainReport, DrainVerdict, NodeRecord, OwnerBuckets, PodRecord,
};

const EMPTY_CELL: &str = "<none>";
const UNKNOWN: &str = "none";
const INDENT: &str = "  ";

/// Row for owner-bucketed and unrecognized pods.
#[derive(Tabled)]
struct PodRow {
    owner: String,
    #[tabled(rename = "ownerKind")]
    owner_kind: String,
    #[tabled(rename = "podName")]
    pod_name: String,
    namespace: String,
    #[tabled(rename = "hasHostPath")]
    has_host_path: bool,
    #[tabled(rename = "cpuReq")]
    cpu_request: String,
    #[tabled(rename = "cpuLimit")]
    cpu_limit: String,
    #[tabled(rename = "memReq")]
    memory_request: String,
    #[tabled(rename = "memLimit")]
    memory_limit: String,
}

impl PodRow {
    fn new(owner: &str, pod: &PodRecord) -> Self {
        Self {
            owner: cell(owner),
            owner_kind: cell(pod.ownership.owner_kind().unwrap_or_default()),
            pod_name: cell(&pod.name),
            namespace: cell(&pod.namespace),
            has_host_path: pod.host_path,
            cpu_request: pod.resources.cpu_request.to_string(),
            cpu_limit: pod.resources.cpu_limit.to_string(),
            memory_request: pod.resources.memory_request.to_string(),
            memory_limit: pod.resources.memory_limit.to_string(),
        }
    }
}

#[derive(Tabled)]
struct IsolatedRow {
    #[tabled(rename = "podName")]
    pod_name: String,
    namespace: String,
    #[tabled(rename = "hasHostPath")]
    has_host_path: bool,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "nodeName")]
    name: String,
    #[tabled(rename = "maxPods")]
    max_pods: u64,
    #[tabled(rename = "currentPods")]
    current_pods: String,
    gpu: bool,
    schedulable: bool,
    #[tabled(rename = "cpuAllocatable")]
    cpu_allocatable: String,
    #[tabled(rename = "memAllocatable")]
    memory_allocatable: String,
    #[tabled(rename = "cpuAllocated")]
    cpu_allocated: String,
    #[tabled(rename = "memAllocated")]
    memory_allocated: String,
}

impl From<&NodeRecord> for NodeRow {
    fn from(node: &NodeRecord) -> Self {
        Self {
            name: cell(&node.name),
            // An unknown capacity keeps the historical "0".
            max_pods: node.max_pods.unwrap_or(0),
            current_pods: known(node.current_pods),
            gpu: node.gpu,
            schedulable: node.schedulable,
            cpu_allocatable: known(node.cpu_allocatable),
            memory_allocatable: known(node.memory_allocatable),
            cpu_allocated: known(node.cpu_allocated),
            memory_allocated: known(node.memory_allocated),
        }
    }
}

#[derive(Tabled)]
struct BudgetRow {
    #[tabled(rename = "pdbName")]
    name: String,
    namespace: String,
    #[tabled(rename = "minAvailable")]
    min_available: String,
    #[tabled(rename = "maxUnavailable")]
    max_unavailable: String,
    #[tabled(rename = "allowed")]
    disruptions_allowed: i32,
    #[tabled(rename = "healthy")]
    current_healthy: i32,
    #[tabled(rename = "expected")]
    expected_pods: i32,
    #[tabled(rename = "impact")]
    impact: String,
}

impl From<&BudgetReport> for BudgetRow {
    fn from(report: &BudgetReport) -> Self {
        let budget = &report.budget;
        Self {
            name: cell(&budget.name),
            namespace: cell(&budget.namespace),
            min_available: cell(&budget.min_available),
            max_unavailable: cell(&budget.max_unavailable),
            disruptions_allowed: budget.disruptions_allowed,
            current_healthy: budget.current_healthy,
            expected_pods: budget.expected_pods,
            impact: format_impact(report),
        }
    }
}

#[derive(Tabled)]
struct BudgetPodRow {
    owner: String,
    #[tabled(rename = "ownerKind")]
    owner_kind: String,
    #[tabled(rename = "podName")]
    pod_name: String,
    namespace: String,
    #[tabled(rename = "nodeName")]
    node_name: String,
}

impl From<&BudgetPod> for BudgetPodRow {
    fn from(pod: &BudgetPod) -> Self {
        Self {
            owner: cell(pod.ownership.owner_name().unwrap_or_default()),
            owner_kind: cell(pod.ownership.owner_kind().unwrap_or_default()),
            pod_name: cell(&pod.pod_name),
            namespace: cell(&pod.namespace),
            node_name: cell(pod.node_name.as_deref().unwrap_or_default()),
        }
    }
}

fn cell(value: &str) -> String {
    if value.is_empty() {
        EMPTY_CELL.to_string()
    } else {
        value.to_string()
    }
}

fn known<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |v| v.to_string())
}

fn format_impact(report: &BudgetReport) -> String {
    let pods = report.impact.pods_on_node;
    match report.impact.verdict {
        DrainVerdict::Unaffected => DrainVerdict::Unaffected.to_string(),
        DrainVerdict::Tightened => format!("Tightened ({} on node)", pods).yellow().to_string(),
        DrainVerdict::Blocked => format!("Blocked ({} on node)", pods).red().to_string(),
    }
}

/// Render `report` as text sections.
pub fn render(
    report: &DrainReport,
    context: &str,
    show_daemonsets: bool,
) -> Result<String, fmt::Error> {
    let mut out = String::with_capacity(4096);
    let pods = &report.pods;

    writeln!(
        out,
        "{} (context: {}, {} pods evicted, {} PDBs blocking)",
        format!("Drain {}", report.node).bold(),
        context,
        pods.evicted_count(),
        report.blocking_budgets().count()
    )?;
    writeln!(out)?;

    write_owned_pods(&mut out, "ReplicaSetPods", &pods.replica_set_pods)?;
    write_owned_pods(&mut out, "StatefulSetPods", &pods.stateful_set_pods)?;
    if show_daemonsets {
        write_owned_pods(&mut out, "DaemonSetPods", &pods.daemon_set_pods)?;
    }
    if !pods.unrecognized_pods.is_empty() {
        write_unrecognized_pods(&mut out, &pods.unrecognized_pods)?;
    }
    write_isolated_pods(&mut out, &pods.isolated_pods)?;
    write_nodes(&mut out, &report.nodes)?;
    write_budgets(&mut out, &report.budgets)?;

    let host_path_owners = pods.host_path_owners();
    if !host_path_owners.is_empty() {
        writeln!(
            out,
            "{} {}",
            "Workloads mounting hostPath:".yellow(),
            host_path_owners.join(", ")
        )?;
    }

    Ok(out)
}

fn write_owned_pods(out: &mut String, title: &str, buckets: &OwnerBuckets) -> fmt::Result {
    if buckets.is_empty() {
        return write_empty_section(out, title);
    }

    let rows: Vec<PodRow> = buckets
        .iter()
        .flat_map(|(owner, pods)| pods.iter().map(move |pod| PodRow::new(owner, pod)))
        .collect();
    write_section(out, title, &rows)
}

fn write_unrecognized_pods(out: &mut String, pods: &[PodRecord]) -> fmt::Result {
    let rows: Vec<PodRow> = pods
        .iter()
        .map(|pod| PodRow::new(pod.ownership.owner_name().unwrap_or_default(), pod))
        .collect();
    write_section(out, "UnrecognizedPods", &rows)
}

fn write_isolated_pods(out: &mut String, pods: &[PodRecord]) -> fmt::Result {
    if pods.is_empty() {
        return write_empty_section(out, "IsolatedPods");
    }

    let rows: Vec<IsolatedRow> = pods
        .iter()
        .map(|pod| IsolatedRow {
            pod_name: cell(&pod.name),
            namespace: cell(&pod.namespace),
            has_host_path: pod.host_path,
        })
        .collect();
    write_section(out, "IsolatedPods", &rows)
}

fn write_nodes(out: &mut String, nodes: &[NodeRecord]) -> fmt::Result {
    if nodes.is_empty() {
        return write_empty_section(out, "Nodes");
    }

    let rows: Vec<NodeRow> = nodes.iter().map(NodeRow::from).collect();
    write_section(out, "Nodes", &rows)
}

fn write_budgets(out: &mut String, budgets: &[BudgetReport]) -> fmt::Result {
    if budgets.is_empty() {
        return write_empty_section(out, "PodDisruptionBudgets");
    }

    writeln!(out, "{}", "PodDisruptionBudgets:".bold())?;
    for budget in budgets {
        write_table(out, &[BudgetRow::from(budget)], INDENT)?;

        let nested = format!("{}{}", INDENT, INDENT);
        if budget.budget.pods.is_empty() {
            writeln!(out, "{}pods: {}", nested, EMPTY_CELL)?;
        } else {
            let rows: Vec<BudgetPodRow> =
                budget.budget.pods.iter().map(BudgetPodRow::from).collect();
            write_table(out, &rows, &nested)?;
        }
    }
    writeln!(out)
}

fn write_empty_section(out: &mut String, title: &str) -> fmt::Result {
    writeln!(out, "{} {}", format!("{}:", title).bold(), UNKNOWN)?;
    writeln!(out)
}

fn write_section<T: Tabled>(out: &mut String, title: &str, rows: &[T]) -> fmt::Result {
    writeln!(out, "{}", format!("{}:", title).bold())?;
    write_table(out, rows, INDENT)?;
    writeln!(out)
}

fn write_table<T: Tabled>(out: &mut String, rows: &[T], indent: &str) -> fmt::Result {
    let mut table = Table::new(rows);
    apply_table_style(&mut table);
    for line in table.to_string().lines() {
        writeln!(out, "{}{}", indent, line.trim_end())?;
    }
    Ok(())
}

/// Apply kubectl-style table formatting: no borders, no separators, 2-space column gap.
fn apply_table_style(table: &mut Table) {
    use tabled::settings::object::Columns;
    use tabled::settings::themes::Theme;
    use tabled::settings::{Modify, Padding};

    let mut theme = Theme::from_style(Style::empty());
    theme.remove_horizontal_lines();
    table.with(theme);
    table.with(Modify::new(Columns::new(..)).with(Padding::new(0, 2, 0, 0)));
}
