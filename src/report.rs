//! Drain impact report model.
//!
//! Everything here is a read-only snapshot built fresh on each run. The
//! renderer in `output` consumes it; `serde` gives the JSON form.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::k8s::accessor::TERMINATED_PHASES;
use crate::quantity::Quantity;

/// Workload kinds an owner reference can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum WorkloadKind {
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective owner of a pod after indirection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadRef {
    pub name: String,
    pub kind: WorkloadKind,
}

impl WorkloadRef {
    pub fn new(name: impl Into<String>, kind: WorkloadKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Outcome of resolving a pod's first owner reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "camelCase")]
pub enum Ownership {
    Owned(WorkloadRef),
    /// Owner kind outside the known workload set; kept for display only.
    Unrecognized { kind: String, name: String },
    /// No owner references at all.
    Isolated,
}

impl Ownership {
    pub fn owner_name(&self) -> Option<&str> {
        match self {
            Ownership::Owned(workload) => Some(&workload.name),
            Ownership::Unrecognized { name, .. } => Some(name),
            Ownership::Isolated => None,
        }
    }

    pub fn owner_kind(&self) -> Option<&str> {
        match self {
            Ownership::Owned(workload) => Some(workload.kind.as_str()),
            Ownership::Unrecognized { kind, .. } => Some(kind),
            Ownership::Isolated => None,
        }
    }
}

/// Summed container requests and limits of one pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodResources {
    pub cpu_request: Quantity,
    pub cpu_limit: Quantity,
    pub memory_request: Quantity,
    pub memory_limit: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub node_name: Option<String>,
    pub ownership: Ownership,
    pub host_path: bool,
    pub resources: PodResources,
}

/// Pods grouped by resolved owner name.
pub type OwnerBuckets = BTreeMap<String, Vec<PodRecord>>;

/// Target node pods partitioned by ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodClassification {
    /// Deployment and bare ReplicaSet pods.
    pub replica_set_pods: OwnerBuckets,
    pub stateful_set_pods: OwnerBuckets,
    pub daemon_set_pods: OwnerBuckets,
    pub unrecognized_pods: Vec<PodRecord>,
    pub isolated_pods: Vec<PodRecord>,
}

impl PodClassification {
    /// Number of pods that would be evicted by a drain (DaemonSet pods excluded).
    pub fn evicted_count(&self) -> usize {
        let bucketed: usize = self
            .replica_set_pods
            .values()
            .chain(self.stateful_set_pods.values())
            .map(Vec::len)
            .sum();
        bucketed + self.unrecognized_pods.len() + self.isolated_pods.len()
    }

    /// Owner names of evicted pods that mount host paths.
    pub fn host_path_owners(&self) -> Vec<&str> {
        let mut owners: Vec<&str> = self
            .replica_set_pods
            .iter()
            .chain(self.stateful_set_pods.iter())
            .filter(|(_, pods)| pods.iter().any(|p| p.host_path))
            .map(|(owner, _)| owner.as_str())
            .collect();
        owners.sort_unstable();
        owners.dedup();
        owners
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub name: String,
    /// `None` when the pod CIDR is missing or malformed.
    pub max_pods: Option<u64>,
    /// `None` when the node's pods could not be listed.
    pub current_pods: Option<usize>,
    pub gpu: bool,
    pub schedulable: bool,
    pub cpu_allocatable: Option<Quantity>,
    pub memory_allocatable: Option<Quantity>,
    pub cpu_allocated: Option<Quantity>,
    pub memory_allocated: Option<Quantity>,
    pub kubelet_version: String,
    pub kube_proxy_version: String,
    pub kernel_version: String,
}

/// A pod selected by a disruption budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetPod {
    pub ownership: Ownership,
    pub pod_name: String,
    pub namespace: String,
    pub node_name: Option<String>,
    pub phase: Option<String>,
}

impl BudgetPod {
    /// Whether draining `node` evicts this pod. Finished pods and DaemonSet
    /// pods stay put.
    pub fn evicted_by_drain_of(&self, node: &str) -> bool {
        if self.node_name.as_deref() != Some(node) {
            return false;
        }
        if self
            .phase
            .as_deref()
            .is_some_and(|p| TERMINATED_PHASES.contains(&p))
        {
            return false;
        }
        !matches!(
            &self.ownership,
            Ownership::Owned(workload) if workload.kind == WorkloadKind::DaemonSet
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRecord {
    pub name: String,
    pub namespace: String,
    pub min_available: String,
    pub max_unavailable: String,
    pub disruptions_allowed: i32,
    pub current_healthy: i32,
    pub expected_pods: i32,
    pub pods: Vec<BudgetPod>,
}

/// What draining the target node does to a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DrainVerdict {
    /// No selected pod runs on the node.
    Unaffected,
    /// Evictions fit within the allowed disruptions.
    Tightened,
    /// More selected pods on the node than allowed disruptions.
    Blocked,
}

impl fmt::Display for DrainVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DrainVerdict::Unaffected => "Unaffected",
            DrainVerdict::Tightened => "Tightened",
            DrainVerdict::Blocked => "Blocked",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetImpact {
    /// Selected pods the drain would evict.
    pub pods_on_node: usize,
    pub verdict: DrainVerdict,
}

impl BudgetImpact {
    pub fn assess(budget: &BudgetRecord, node: &str) -> Self {
        let pods_on_node = budget
            .pods
            .iter()
            .filter(|p| p.evicted_by_drain_of(node))
            .count();
        let allowed = usize::try_from(budget.disruptions_allowed).unwrap_or(0);

        let verdict = if pods_on_node == 0 {
            DrainVerdict::Unaffected
        } else if pods_on_node > allowed {
            DrainVerdict::Blocked
        } else {
            DrainVerdict::Tightened
        };

        Self {
            pods_on_node,
            verdict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetReport {
    #[serde(flatten)]
    pub budget: BudgetRecord,
    pub impact: BudgetImpact,
}

/// Full drain impact report for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub node: String,
    #[serde(flatten)]
    pub pods: PodClassification,
    pub nodes: Vec<NodeRecord>,
    pub budgets: Vec<BudgetReport>,
}

impl DrainReport {
    pub fn assemble(
        node: &str,
        pods: PodClassification,
        nodes: Vec<NodeRecord>,
        budgets: Vec<BudgetRecord>,
    ) -> Self {
        let budgets = budgets
            .into_iter()
            .map(|budget| BudgetReport {
                impact: BudgetImpact::assess(&budget, node),
                budget,
            })
            .collect();

        Self {
            node: node.to_string(),
            pods,
            nodes,
            budgets,
        }
    }

    pub fn blocking_budgets(&self) -> impl Iterator<Item = &BudgetReport> {
        self.budgets
            .iter()
            .filter(|b| b.impact.verdict == DrainVerdict::Blocked)
    }
}
