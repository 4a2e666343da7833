//! PodDisruptionBudget evaluation.

use futures::StreamExt;
use futures::stream;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::{debug, warn};

use crate::detect::owner::{self, namespace_of};
use crate::detect::pod::sort_by_identity;
use crate::detect::selector::match_labels;
use crate::error::KblastError;
use crate::k8s::accessor::{ClusterAccessor, PodQuery};
use crate::report::{BudgetPod, BudgetRecord};

/// List every budget in the cluster and evaluate it.
///
/// Only the budget listing itself is fatal.
pub async fn evaluate_all<A: ClusterAccessor + ?Sized>(
    cluster: &A,
    concurrency: usize,
) -> Result<Vec<BudgetRecord>, KblastError> {
    let mut budgets = cluster
        .list_disruption_budgets()
        .await
        .map_err(|e| KblastError::primary("list PodDisruptionBudgets", e))?;
    budgets.sort_by(|a, b| {
        (a.metadata.namespace.as_deref(), a.metadata.name.as_deref())
            .cmp(&(b.metadata.namespace.as_deref(), b.metadata.name.as_deref()))
    });

    Ok(evaluate(cluster, &budgets, concurrency).await)
}

/// Evaluate `budgets` in order, resolving the pods each one selects.
pub async fn evaluate<A: ClusterAccessor + ?Sized>(
    cluster: &A,
    budgets: &[PodDisruptionBudget],
    concurrency: usize,
) -> Vec<BudgetRecord> {
    stream::iter(budgets)
        .map(|budget| budget_record(cluster, budget, concurrency))
        .buffered(concurrency.max(1))
        .collect()
        .await
}

async fn budget_record<A: ClusterAccessor + ?Sized>(
    cluster: &A,
    budget: &PodDisruptionBudget,
    concurrency: usize,
) -> BudgetRecord {
    let name = budget.metadata.name.clone().unwrap_or_default();
    let namespace = namespace_of(&budget.metadata).to_string();
    let spec = budget.spec.as_ref();
    let status = budget.status.as_ref();

    let selected = selected_pods(cluster, budget, &namespace, &name).await;
    let pods = stream::iter(&selected)
        .map(|pod| budget_pod(cluster, pod))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    BudgetRecord {
        min_available: limit_or_zero(spec.and_then(|s| s.min_available.as_ref())),
        max_unavailable: limit_or_zero(spec.and_then(|s| s.max_unavailable.as_ref())),
        disruptions_allowed: status.map_or(0, |s| s.disruptions_allowed),
        current_healthy: status.map_or(0, |s| s.current_healthy),
        expected_pods: status.map_or(0, |s| s.expected_pods),
        name,
        namespace,
        pods,
    }
}

async fn selected_pods<A: ClusterAccessor + ?Sized>(
    cluster: &A,
    budget: &PodDisruptionBudget,
    namespace: &str,
    name: &str,
) -> Vec<Pod> {
    let selector = budget.spec.as_ref().and_then(|s| s.selector.as_ref());
    let labels = match match_labels(selector) {
        Ok(labels) => labels,
        Err(e) => {
            warn!("Skipping pod lookup for PDB {}/{}: {}", namespace, name, e);
            return Vec::new();
        }
    };

    match cluster
        .list_pods(Some(namespace), &PodQuery::with_labels(labels))
        .await
    {
        Ok(mut pods) => {
            sort_by_identity(&mut pods);
            debug!("PDB {}/{} selects {} pods", namespace, name, pods.len());
            pods
        }
        Err(e) => {
            warn!("Failed to list pods for PDB {}/{}: {}", namespace, name, e);
            Vec::new()
        }
    }
}

async fn budget_pod<A: ClusterAccessor + ?Sized>(cluster: &A, pod: &Pod) -> BudgetPod {
    BudgetPod {
        ownership: owner::resolve(cluster, pod).await,
        pod_name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: namespace_of(&pod.metadata).to_string(),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
    }
}

fn limit_or_zero(value: Option<&IntOrString>) -> String {
    match value {
        Some(IntOrString::Int(i)) => i.to_string(),
        Some(IntOrString::String(s)) => s.clone(),
        None => "0".to_string(),
    }
}
