//! Read-only cluster snapshot access.
//!
//! Detection code only talks to the cluster through [`ClusterAccessor`], so the
//! same engine runs against a live API server or an in-memory fixture.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;

use crate::error::AccessError;

/// Pod phases that no longer hold node resources.
pub const TERMINATED_PHASES: &[&str] = &["Succeeded", "Failed"];

#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, AccessError>;

    /// List pods in `namespace` (all namespaces when `None`) matching `query`.
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        query: &PodQuery,
    ) -> Result<Vec<Pod>, AccessError>;

    async fn get_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, AccessError>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, AccessError>;

    async fn list_disruption_budgets(&self) -> Result<Vec<PodDisruptionBudget>, AccessError>;
}

/// Conjunctive pod filter, rendered to field and label selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodQuery {
    pub node_name: Option<String>,
    pub exclude_terminated: bool,
    pub labels: BTreeMap<String, String>,
}

impl PodQuery {
    /// Pods bound to `node` that are not in a terminal phase.
    pub fn non_terminated_on(node: &str) -> Self {
        Self {
            node_name: Some(node.to_string()),
            exclude_terminated: true,
            labels: BTreeMap::new(),
        }
    }

    /// Pods carrying every one of `labels`. An empty map selects all pods.
    pub fn with_labels(labels: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            ..Default::default()
        }
    }

    pub fn field_selector(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(node) = &self.node_name {
            parts.push(format!("spec.nodeName={}", node));
        }
        if self.exclude_terminated {
            parts.extend(
                TERMINATED_PHASES
                    .iter()
                    .map(|phase| format!("status.phase!={}", phase)),
            );
        }
        (!parts.is_empty()).then(|| parts.join(","))
    }

    pub fn label_selector(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}
