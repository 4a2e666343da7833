//! Ownership resolution for pods.
//!
//! Only the first owner reference is consulted, and ReplicaSet indirection
//! is followed at most one level (pod → ReplicaSet → Deployment).

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use tracing::{debug, warn};

use crate::k8s::accessor::ClusterAccessor;
use crate::report::{Ownership, WorkloadKind, WorkloadRef};

const REPLICA_SET: &str = "ReplicaSet";
const DEPLOYMENT: &str = "Deployment";
const STATEFUL_SET: &str = "StatefulSet";
const DAEMON_SET: &str = "DaemonSet";

/// Namespace of an object, defaulting like the API server does.
pub fn namespace_of(meta: &ObjectMeta) -> &str {
    meta.namespace.as_deref().unwrap_or("default")
}

fn first_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references.as_ref().and_then(|refs| refs.first())
}

/// Resolve the effective owning workload of `pod`.
///
/// Lookup failures degrade to the ReplicaSet itself and are never returned.
pub async fn resolve<A: ClusterAccessor + ?Sized>(cluster: &A, pod: &Pod) -> Ownership {
    let Some(owner) = first_owner(&pod.metadata) else {
        return Ownership::Isolated;
    };
    let namespace = namespace_of(&pod.metadata);

    match owner.kind.as_str() {
        REPLICA_SET => Ownership::Owned(resolve_replica_set(cluster, namespace, &owner.name).await),
        STATEFUL_SET => Ownership::Owned(WorkloadRef::new(&owner.name, WorkloadKind::StatefulSet)),
        DAEMON_SET => Ownership::Owned(WorkloadRef::new(&owner.name, WorkloadKind::DaemonSet)),
        other => {
            warn!(
                "Unknown workload kind {} for pod {}/{}",
                other,
                namespace,
                pod.metadata.name.as_deref().unwrap_or("unknown")
            );
            Ownership::Unrecognized {
                kind: other.to_string(),
                name: owner.name.clone(),
            }
        }
    }
}

async fn resolve_replica_set<A: ClusterAccessor + ?Sized>(
    cluster: &A,
    namespace: &str,
    rs_name: &str,
) -> WorkloadRef {
    let fallback = || WorkloadRef::new(rs_name, WorkloadKind::ReplicaSet);

    let replica_set = match cluster.get_replica_set(namespace, rs_name).await {
        Ok(rs) => rs,
        Err(e) => {
            warn!("Failed to get ReplicaSet {}/{}: {}", namespace, rs_name, e);
            return fallback();
        }
    };

    let deployment_name = match first_owner(&replica_set.metadata) {
        Some(owner) if owner.kind == DEPLOYMENT => owner.name.as_str(),
        Some(owner) => {
            debug!(
                "ReplicaSet {}/{} is owned by {} {}, not a Deployment",
                namespace, rs_name, owner.kind, owner.name
            );
            return fallback();
        }
        None => return fallback(),
    };

    match cluster.get_deployment(namespace, deployment_name).await {
        Ok(deployment) => WorkloadRef::new(
            deployment
                .metadata
                .name
                .as_deref()
                .unwrap_or(deployment_name),
            WorkloadKind::Deployment,
        ),
        Err(e) => {
            warn!(
                "Failed to get Deployment {}/{}: {}",
                namespace, deployment_name, e
            );
            fallback()
        }
    }
}
