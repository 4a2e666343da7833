//! [`ClusterAccessor`] backed by the Kubernetes API server.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::Api;
use kube::api::ListParams;
use tracing::debug;

use crate::error::AccessError;
use crate::k8s::accessor::{ClusterAccessor, PodQuery};

/// Live accessor over a `kube::Client`.
#[derive(Clone)]
pub struct KubeAccessor {
    client: kube::Client,
}

impl KubeAccessor {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterAccessor for KubeAccessor {
    async fn list_nodes(&self) -> Result<Vec<Node>, AccessError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, "Node", "", ""))?;
        debug!("Found {} nodes", list.items.len());
        Ok(list.items)
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        query: &PodQuery,
    ) -> Result<Vec<Pod>, AccessError> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut params = ListParams::default();
        if let Some(fields) = query.field_selector() {
            params = params.fields(&fields);
        }
        if let Some(labels) = query.label_selector() {
            params = params.labels(&labels);
        }

        let list = api
            .list(&params)
            .await
            .map_err(|e| map_kube_error(e, "Pod", namespace.unwrap_or(""), ""))?;
        debug!(
            "Found {} pods (namespace: {}, fields: {:?}, labels: {:?})",
            list.items.len(),
            namespace.unwrap_or("*"),
            params.field_selector,
            params.label_selector
        );
        Ok(list.items)
    }

    async fn get_replica_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReplicaSet, AccessError> {
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| map_kube_error(e, "ReplicaSet", namespace, name))
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, AccessError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| map_kube_error(e, "Deployment", namespace, name))
    }

    async fn list_disruption_budgets(&self) -> Result<Vec<PodDisruptionBudget>, AccessError> {
        let api: Api<PodDisruptionBudget> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, "PodDisruptionBudget", "", ""))?;
        debug!("Found {} PDBs in cluster", list.items.len());
        Ok(list.items)
    }
}

/// Map a kube error onto the accessor taxonomy.
///
/// 404 is `NotFound`; 401/403 and anything that never produced an API status
/// (transport, TLS, timeout, auth plugin) is `Connection`.
fn map_kube_error(
    err: kube::Error,
    kind: &'static str,
    namespace: &str,
    name: &str,
) -> AccessError {
    match err {
        kube::Error::Api(response) => match response.code {
            404 => AccessError::not_found(kind, namespace, name),
            401 | 403 => AccessError::Connection(response.message),
            _ => AccessError::Api(format!("{} ({})", response.message, response.code)),
        },
        other => AccessError::Connection(other.to_string()),
    }
}
