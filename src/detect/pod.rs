//! Classification of the pods running on the drain target.

use std::collections::BTreeMap;

use futures::StreamExt;
use futures::stream;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use tracing::{debug, warn};

use crate::detect::owner::{self, namespace_of};
use crate::error::KblastError;
use crate::k8s::accessor::{ClusterAccessor, PodQuery};
use crate::quantity::Quantity;
use crate::report::{Ownership, PodClassification, PodRecord, PodResources, WorkloadKind};

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// List the target node's non-terminated pods and classify them by owner.
///
/// Failing to list the pods is fatal: there is no report without them.
pub async fn classify<A: ClusterAccessor + ?Sized>(
    cluster: &A,
    node: &str,
    concurrency: usize,
) -> Result<PodClassification, KblastError> {
    debug!("Starting detect drain node pods on {}", node);

    let mut pods = cluster
        .list_pods(None, &PodQuery::non_terminated_on(node))
        .await
        .map_err(|e| KblastError::primary(format!("list pods on node {}", node), e))?;
    sort_by_identity(&mut pods);

    let records: Vec<PodRecord> = stream::iter(&pods)
        .map(|pod| pod_record(cluster, pod))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let classification = partition(records);
    debug!(
        "Classified pods on {}: {} evicted, {} DaemonSet-owned",
        node,
        classification.evicted_count(),
        classification
            .daemon_set_pods
            .values()
            .map(Vec::len)
            .sum::<usize>()
    );
    Ok(classification)
}

/// Sort pods by (namespace, name) so repeated runs render identically.
pub fn sort_by_identity(pods: &mut [Pod]) {
    pods.sort_by(|a, b| {
        (a.metadata.namespace.as_deref(), a.metadata.name.as_deref())
            .cmp(&(b.metadata.namespace.as_deref(), b.metadata.name.as_deref()))
    });
}

async fn pod_record<A: ClusterAccessor + ?Sized>(cluster: &A, pod: &Pod) -> PodRecord {
    PodRecord {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: namespace_of(&pod.metadata).to_string(),
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        ownership: owner::resolve(cluster, pod).await,
        host_path: has_host_path(pod),
        resources: pod_resources(pod),
    }
}

/// Place each record in its owner bucket or the isolated list.
pub fn partition(records: Vec<PodRecord>) -> PodClassification {
    let mut classification = PodClassification::default();

    for record in records {
        match &record.ownership {
            Ownership::Owned(workload) => {
                let bucket = match workload.kind {
                    WorkloadKind::Deployment | WorkloadKind::ReplicaSet => {
                        &mut classification.replica_set_pods
                    }
                    WorkloadKind::StatefulSet => &mut classification.stateful_set_pods,
                    WorkloadKind::DaemonSet => &mut classification.daemon_set_pods,
                };
                bucket
                    .entry(workload.name.clone())
                    .or_default()
                    .push(record);
            }
            Ownership::Unrecognized { .. } => classification.unrecognized_pods.push(record),
            Ownership::Isolated => classification.isolated_pods.push(record),
        }
    }

    classification
}

/// True if any volume of the pod is a hostPath.
pub fn has_host_path(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .is_some_and(|volumes| volumes.iter().any(|v| v.host_path.is_some()))
}

/// Sum requests and limits over the pod's regular containers.
///
/// Init containers are not counted. Missing entries contribute zero.
pub fn pod_resources(pod: &Pod) -> PodResources {
    let containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    let pod_name = pod.metadata.name.as_deref().unwrap_or("unknown");

    let mut resources = PodResources::default();
    for container in containers {
        let Some(requirements) = container.resources.as_ref() else {
            continue;
        };
        let requests = requirements.requests.as_ref();
        let limits = requirements.limits.as_ref();

        resources.cpu_request += lookup(requests, CPU, pod_name);
        resources.cpu_limit += lookup(limits, CPU, pod_name);
        resources.memory_request += lookup(requests, MEMORY, pod_name);
        resources.memory_limit += lookup(limits, MEMORY, pod_name);
    }
    resources
}

fn lookup(
    resources: Option<&BTreeMap<String, K8sQuantity>>,
    name: &str,
    pod_name: &str,
) -> Quantity {
    let Some(value) = resources.and_then(|r| r.get(name)) else {
        return Quantity::zero();
    };
    Quantity::from_k8s(value).unwrap_or_else(|e| {
        warn!("Ignoring {} of pod {}: {}", name, pod_name, e);
        Quantity::zero()
    })
}
