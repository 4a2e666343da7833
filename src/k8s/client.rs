//! Kubernetes client builder with kubeconfig context support.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::KblastError;

/// Build a Kubernetes client from kubeconfig.
///
/// Reads `kubeconfig` when given, otherwise the default kubeconfig lookup
/// (`KUBECONFIG`, `~/.kube/config`, in-cluster). Every request is bounded by
/// `timeout`.
pub async fn build_client(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
    timeout: Duration,
) -> Result<kube::Client, KblastError> {
    let options = kube::config::KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };
    let describe = |e: &dyn std::fmt::Display| match context {
        Some(ctx) => KblastError::Kubeconfig(format!("context '{}': {}", ctx, e)),
        None => KblastError::Kubeconfig(e.to_string()),
    };

    let mut config = match (kubeconfig, context) {
        (Some(path), _) => {
            debug!("Reading kubeconfig from {}", path.display());
            let kubeconfig =
                kube::config::Kubeconfig::read_from(path).map_err(|e| describe(&e))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| describe(&e))?
        }
        (None, Some(ctx)) => {
            debug!("Using kubeconfig context: {}", ctx);
            kube::Config::from_kubeconfig(&options)
                .await
                .map_err(|e| describe(&e))?
        }
        (None, None) => {
            debug!("Using default kubeconfig context");
            kube::Config::infer().await.map_err(|e| describe(&e))?
        }
    };

    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
    config.write_timeout = Some(timeout);

    kube::Client::try_from(config).map_err(|e| describe(&e))
}

/// Get the current context name from kubeconfig.
pub fn current_context(kubeconfig: Option<&Path>, context: Option<&str>) -> String {
    if let Some(ctx) = context {
        return ctx.to_string();
    }

    let config = match kubeconfig {
        Some(path) => kube::config::Kubeconfig::read_from(path).ok(),
        None => kube::config::Kubeconfig::read().ok(),
    };
    config
        .and_then(|kc| kc.current_context)
        .unwrap_or_else(|| "unknown".to_string())
}
