//! kblast - Node drain blast radius inspector for Kubernetes.
//!
//! Lists the workloads a drain of one node would evict, the pod capacity and
//! allocation of every node, and the PodDisruptionBudgets the drain touches.

mod config;
mod detect;
mod error;
mod k8s;
mod output;
mod quantity;
mod report;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use config::{Args, Config, OutputFormat};
use k8s::api::KubeAccessor;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::from_args(args);

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    debug!("Starting kblast - Node drain blast radius inspector");

    if let Err(e) = run(&config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(config: &Config) -> Result<()> {
    let kubeconfig = config.kubeconfig.as_deref();
    let context = config.context.as_deref();

    let client = k8s::client::build_client(kubeconfig, context, config.timeout).await?;
    let context_name = k8s::client::current_context(kubeconfig, context);
    debug!("Using context {}", context_name);

    let accessor = KubeAccessor::new(client);
    let report = detect::run(&accessor, &config.node, &config.detect).await?;

    let rendered = match config.output {
        OutputFormat::Table => {
            output::table::render(&report, &context_name, config.show_daemonsets)?
        }
        OutputFormat::Json => output::json::render(&report, &context_name, chrono::Utc::now())?,
    };
    println!("{}", rendered);

    Ok(())
}

/// Initialize tracing subscriber with the given log level.
///
/// `RUST_LOG` takes precedence when set. Logs go to stderr so they never mix
/// with the report on stdout.
fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
