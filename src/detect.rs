//! Drain impact detection.
//!
//! Pod classification, node records and budget evaluation run concurrently
//! against the same read-only [`ClusterAccessor`] and are assembled into one
//! [`DrainReport`].

pub mod node;
pub mod owner;
pub mod pdb;
pub mod pod;
pub mod selector;

use tracing::{debug, info};

use crate::error::KblastError;
use crate::k8s::accessor::ClusterAccessor;
use crate::report::DrainReport;

/// Default number of in-flight API requests per component.
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
    pub concurrency: usize,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Build the drain impact report for `node`.
///
/// Fails on any mandatory query and when `node` does not exist. Partial
/// reports are never returned.
pub async fn run<A: ClusterAccessor + ?Sized>(
    cluster: &A,
    node: &str,
    options: &DetectOptions,
) -> Result<DrainReport, KblastError> {
    debug!(
        "Detecting drain impact of node {} (concurrency: {})",
        node, options.concurrency
    );

    let (pods, nodes, budgets) = tokio::try_join!(
        pod::classify(cluster, node, options.concurrency),
        node::node_records(cluster, options.concurrency),
        pdb::evaluate_all(cluster, options.concurrency),
    )?;

    if !nodes.iter().any(|n| n.name == node) {
        return Err(KblastError::NodeNotFound(node.to_string()));
    }

    let report = DrainReport::assemble(node, pods, nodes, budgets);
    info!(
        "Draining {} evicts {} pods, {} PDB(s) would block",
        node,
        report.pods.evicted_count(),
        report.blocking_budgets().count()
    );
    Ok(report)
}
