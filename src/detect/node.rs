//! Per-node capacity and allocation.

use std::net::{Ipv4Addr, Ipv6Addr};

use futures::StreamExt;
use futures::stream;
use k8s_openapi::api::core::v1::{Node, Pod};
use tracing::{debug, warn};

use crate::detect::pod::pod_resources;
use crate::error::{CidrError, KblastError};
use crate::k8s::accessor::{ClusterAccessor, PodQuery};
use crate::quantity::Quantity;
use crate::report::{NodeRecord, PodResources};

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// Extended resources that mark a node as a GPU node.
const GPU_RESOURCES: &[&str] = &["nvidia.com/gpu", "amd.com/gpu", "gpu.intel.com/i915"];

/// Pod IPs available in an IPv4 CIDR, minus network and broadcast addresses.
pub fn pod_capacity(cidr: &str) -> Result<u64, CidrError> {
    if cidr.is_empty() {
        return Err(CidrError::Missing);
    }
    let invalid = || CidrError::Invalid(cidr.to_string());

    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    if addr.parse::<Ipv6Addr>().is_ok() {
        return Err(CidrError::Ipv6(cidr.to_string()));
    }
    addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let prefix: u32 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }

    Ok((1u64 << (32 - prefix)).saturating_sub(2))
}

/// Pod capacity of a node's CIDR; `None` (logged) when it cannot be derived.
pub fn capacity(cidr: Option<&str>) -> Option<u64> {
    match pod_capacity(cidr.unwrap_or_default()) {
        Ok(capacity) => Some(capacity),
        Err(e) => {
            warn!("Cannot derive pod capacity: {}", e);
            None
        }
    }
}

/// Sum of CPU and memory requests over `pods`.
pub fn allocated(pods: &[Pod]) -> (Quantity, Quantity) {
    let resources: Vec<PodResources> = pods.iter().map(pod_resources).collect();
    (
        resources.iter().map(|r| r.cpu_request).sum(),
        resources.iter().map(|r| r.memory_request).sum(),
    )
}

/// Build a record for every node in the cluster, sorted by name.
pub async fn node_records<A: ClusterAccessor + ?Sized>(
    cluster: &A,
    concurrency: usize,
) -> Result<Vec<NodeRecord>, KblastError> {
    let mut nodes = cluster
        .list_nodes()
        .await
        .map_err(|e| KblastError::primary("list nodes", e))?;
    nodes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    let records = stream::iter(&nodes)
        .map(|node| node_record(cluster, node))
        .buffered(concurrency.max(1))
        .collect()
        .await;
    Ok(records)
}

async fn node_record<A: ClusterAccessor + ?Sized>(cluster: &A, node: &Node) -> NodeRecord {
    let name = node.metadata.name.clone().unwrap_or_default();
    let spec = node.spec.as_ref();
    let node_info = node.status.as_ref().and_then(|s| s.node_info.as_ref());

    let pods = match cluster
        .list_pods(None, &PodQuery::non_terminated_on(&name))
        .await
    {
        Ok(pods) => Some(pods),
        Err(e) => {
            warn!("Failed to list pods on node {}: {}", name, e);
            None
        }
    };
    let (cpu_allocated, memory_allocated) = pods.as_deref().map(allocated).unzip();
    debug!(
        "Node {} runs {} pods",
        name,
        pods.as_ref().map_or(0, Vec::len)
    );

    NodeRecord {
        max_pods: capacity(spec.and_then(|s| s.pod_cidr.as_deref())),
        current_pods: pods.as_ref().map(Vec::len),
        gpu: has_gpu(node),
        schedulable: !spec.and_then(|s| s.unschedulable).unwrap_or(false),
        cpu_allocatable: allocatable(node, CPU),
        memory_allocatable: allocatable(node, MEMORY),
        cpu_allocated,
        memory_allocated,
        kubelet_version: node_info
            .map(|i| i.kubelet_version.clone())
            .unwrap_or_default(),
        kube_proxy_version: node_info
            .map(|i| i.kube_proxy_version.clone())
            .unwrap_or_default(),
        kernel_version: node_info
            .map(|i| i.kernel_version.clone())
            .unwrap_or_default(),
        name,
    }
}

/// Allocatable amount of `resource`. Missing is zero, malformed is `None`.
fn allocatable(node: &Node, resource: &str) -> Option<Quantity> {
    let value = node
        .status
        .as_ref()
        .and_then(|s| s.allocatable.as_ref())
        .and_then(|a| a.get(resource));
    let Some(value) = value else {
        return Some(Quantity::zero());
    };

    match Quantity::from_k8s(value) {
        Ok(quantity) => Some(quantity),
        Err(e) => {
            warn!(
                "Invalid allocatable {} on node {}: {}",
                resource,
                node.metadata.name.as_deref().unwrap_or("unknown"),
                e
            );
            None
        }
    }
}

fn has_gpu(node: &Node) -> bool {
    let Some(allocatable) = node.status.as_ref().and_then(|s| s.allocatable.as_ref()) else {
        return false;
    };
    GPU_RESOURCES.iter().any(|resource| {
        allocatable
            .get(*resource)
            .and_then(|q| Quantity::from_k8s(q).ok())
            .is_some_and(|q| !q.is_zero())
    })
}
