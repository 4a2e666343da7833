//! In-memory [`ClusterAccessor`] and object builders for tests.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, Node, NodeSpec, NodeStatus, NodeSystemInfo, Pod, PodSpec,
    PodStatus, ResourceRequirements, Volume,
};
use k8s_openapi::api::policy::v1::{
    PodDisruptionBudget, PodDisruptionBudgetSpec, PodDisruptionBudgetStatus,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::error::AccessError;
use crate::k8s::accessor::{ClusterAccessor, PodQuery, TERMINATED_PHASES};

/// Snapshot held in memory, with switchable failures.
#[derive(Default, Clone)]
pub struct MemoryCluster {
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub replica_sets: Vec<ReplicaSet>,
    pub deployments: Vec<Deployment>,
    pub budgets: Vec<PodDisruptionBudget>,
    pub fail_list_nodes: bool,
    pub fail_list_budgets: bool,
    /// Node names whose field-filtered pod listing fails.
    pub fail_pods_on_nodes: BTreeSet<String>,
    /// Namespaces whose label-filtered pod listing fails.
    pub fail_pods_in_namespaces: BTreeSet<String>,
    /// Deployments that exist but cannot be fetched.
    pub fail_deployments: BTreeSet<String>,
}

fn unavailable() -> AccessError {
    AccessError::Connection("connection refused".to_string())
}

fn find<'a, K>(
    items: &'a [K],
    meta: impl Fn(&K) -> &ObjectMeta,
    ns: &str,
    name: &str,
) -> Option<&'a K> {
    items.iter().find(|item| {
        let m = meta(item);
        m.namespace.as_deref() == Some(ns) && m.name.as_deref() == Some(name)
    })
}

/// Evaluate `query` the way the API server applies its field and label selectors.
fn selects(query: &PodQuery, pod: &Pod) -> bool {
    if let Some(node) = &query.node_name {
        let bound = pod.spec.as_ref().and_then(|s| s.node_name.as_deref());
        if bound != Some(node.as_str()) {
            return false;
        }
    }

    if query.exclude_terminated {
        let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
        if phase.is_some_and(|p| TERMINATED_PHASES.contains(&p)) {
            return false;
        }
    }

    let labels = pod.metadata.labels.as_ref();
    query.labels.iter().all(|(key, value)| {
        labels
            .and_then(|l| l.get(key))
            .is_some_and(|actual| actual == value)
    })
}

#[async_trait]
impl ClusterAccessor for MemoryCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>, AccessError> {
        if self.fail_list_nodes {
            return Err(unavailable());
        }
        Ok(self.nodes.clone())
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        query: &PodQuery,
    ) -> Result<Vec<Pod>, AccessError> {
        if let Some(node) = &query.node_name
            && self.fail_pods_on_nodes.contains(node)
        {
            return Err(unavailable());
        }
        if let Some(ns) = namespace
            && self.fail_pods_in_namespaces.contains(ns)
        {
            return Err(unavailable());
        }

        Ok(self
            .pods
            .iter()
            .filter(|pod| namespace.is_none() || pod.metadata.namespace.as_deref() == namespace)
            .filter(|pod| selects(query, pod))
            .cloned()
            .collect())
    }

    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicaSet, AccessError> {
        find(&self.replica_sets, |rs| &rs.metadata, namespace, name)
            .cloned()
            .ok_or_else(|| AccessError::not_found("ReplicaSet", namespace, name))
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, AccessError> {
        if self.fail_deployments.contains(name) {
            return Err(unavailable());
        }
        find(&self.deployments, |d| &d.metadata, namespace, name)
            .cloned()
            .ok_or_else(|| AccessError::not_found("Deployment", namespace, name))
    }

    async fn list_disruption_budgets(&self) -> Result<Vec<PodDisruptionBudget>, AccessError> {
        if self.fail_list_budgets {
            return Err(unavailable());
        }
        Ok(self.budgets.clone())
    }
}

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

fn owner_ref(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{}", name),
        controller: Some(true),
        ..Default::default()
    }
}

fn resource_map(entries: &[(&str, &str)]) -> Option<BTreeMap<String, K8sQuantity>> {
    if entries.is_empty() {
        return None;
    }
    Some(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), K8sQuantity(v.to_string())))
            .collect(),
    )
}

pub fn node(name: &str, pod_cidr: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            pod_cidr: (!pod_cidr.is_empty()).then(|| pod_cidr.to_string()),
            unschedulable: Some(false),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            allocatable: resource_map(&[
                ("cpu", "3920m"),
                ("memory", "7934732Ki"),
                ("pods", "110"),
            ]),
            node_info: Some(NodeSystemInfo {
                kubelet_version: "v1.31.2".to_string(),
                kube_proxy_version: "v1.31.2".to_string(),
                kernel_version: "6.1.112".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

/// Fluent pod builder.
pub struct PodBuilder {
    pod: Pod,
}

pub fn pod(namespace: &str, name: &str, node: &str) -> PodBuilder {
    PodBuilder {
        pod: Pod {
            metadata: meta(namespace, name),
            spec: Some(PodSpec {
                node_name: Some(node.to_string()),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
        },
    }
}

impl PodBuilder {
    pub fn owned_by(mut self, kind: &str, name: &str) -> Self {
        self.pod
            .metadata
            .owner_references
            .get_or_insert_with(Vec::new)
            .push(owner_ref(kind, name));
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.pod
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn phase(mut self, phase: &str) -> Self {
        if let Some(status) = self.pod.status.as_mut() {
            status.phase = Some(phase.to_string());
        }
        self
    }

    pub fn host_path(mut self, path: &str) -> Self {
        self.volumes().push(Volume {
            name: "host".to_string(),
            host_path: Some(HostPathVolumeSource {
                path: path.to_string(),
                type_: None,
            }),
            ..Default::default()
        });
        self
    }

    pub fn empty_dir(mut self) -> Self {
        self.volumes().push(Volume {
            name: "scratch".to_string(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        });
        self
    }

    /// Add a container with `(resource, quantity)` requests and limits.
    pub fn container(mut self, requests: &[(&str, &str)], limits: &[(&str, &str)]) -> Self {
        let container = Container {
            name: "app".to_string(),
            resources: Some(ResourceRequirements {
                requests: resource_map(requests),
                limits: resource_map(limits),
                ..Default::default()
            }),
            ..Default::default()
        };
        if let Some(spec) = self.pod.spec.as_mut() {
            spec.containers.push(container);
        }
        self
    }

    pub fn init_container(mut self, requests: &[(&str, &str)]) -> Self {
        let container = Container {
            name: "init".to_string(),
            resources: Some(ResourceRequirements {
                requests: resource_map(requests),
                ..Default::default()
            }),
            ..Default::default()
        };
        if let Some(spec) = self.pod.spec.as_mut() {
            spec.init_containers
                .get_or_insert_with(Vec::new)
                .push(container);
        }
        self
    }

    fn volumes(&mut self) -> &mut Vec<Volume> {
        self.pod
            .spec
            .get_or_insert_with(Default::default)
            .volumes
            .get_or_insert_with(Vec::new)
    }

    pub fn build(self) -> Pod {
        self.pod
    }
}

pub fn replica_set(namespace: &str, name: &str, owner: Option<(&str, &str)>) -> ReplicaSet {
    let mut metadata = meta(namespace, name);
    if let Some((kind, owner_name)) = owner {
        metadata.owner_references = Some(vec![owner_ref(kind, owner_name)]);
    }
    ReplicaSet {
        metadata,
        ..Default::default()
    }
}

pub fn deployment(namespace: &str, name: &str) -> Deployment {
    Deployment {
        metadata: meta(namespace, name),
        ..Default::default()
    }
}

/// Disruption budget selecting `labels`, with `(expected, healthy, allowed)` status.
pub fn budget(
    namespace: &str,
    name: &str,
    min_available: Option<IntOrString>,
    labels: &[(&str, &str)],
    status: (i32, i32, i32),
) -> PodDisruptionBudget {
    let (expected_pods, current_healthy, disruptions_allowed) = status;
    PodDisruptionBudget {
        metadata: meta(namespace, name),
        spec: Some(PodDisruptionBudgetSpec {
            min_available,
            selector: Some(LabelSelector {
                match_labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                match_expressions: None,
            }),
            ..Default::default()
        }),
        status: Some(PodDisruptionBudgetStatus {
            current_healthy,
            desired_healthy: current_healthy - disruptions_allowed,
            disruptions_allowed,
            expected_pods,
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_node_and_phase() {
        let query = PodQuery::non_terminated_on("n1");
        assert!(selects(&query, &pod("a", "p", "n1").build()));
        assert!(selects(&query, &pod("a", "p", "n1").phase("Pending").build()));
        assert!(!selects(&query, &pod("a", "p", "n1").phase("Succeeded").build()));
        assert!(!selects(&query, &pod("a", "p", "n1").phase("Failed").build()));
        assert!(!selects(&query, &pod("a", "p", "n2").build()));
    }

    #[test]
    fn test_selects_labels() {
        let labels = BTreeMap::from([("app".to_string(), "shop".to_string())]);
        let query = PodQuery::with_labels(labels);
        let tagged = pod("a", "p", "n1")
            .label("app", "shop")
            .label("x", "y")
            .build();
        assert!(selects(&query, &tagged));
        assert!(!selects(&query, &pod("a", "p", "n1").label("app", "cart").build()));
        assert!(!selects(&query, &pod("a", "p", "n1").build()));
        assert!(selects(&PodQuery::default(), &pod("a", "p", "n1").build()));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cluster = MemoryCluster {
            pods: vec![pod("shop", "web", "n1").build()],
            fail_pods_in_namespaces: ["shop".to_string()].into(),
            ..Default::default()
        };
        let everything = PodQuery::default();
        assert!(cluster.list_pods(Some("shop"), &everything).await.is_err());
        assert_eq!(
            cluster
                .list_pods(None, &PodQuery::non_terminated_on("n1"))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
