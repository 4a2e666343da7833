//! CLI configuration and argument parsing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::detect::{DEFAULT_CONCURRENCY, DetectOptions};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Node drain blast radius inspector for Kubernetes.
///
/// Shows which workloads, disruption budgets and node capacity a drain of
/// NODE would touch, without changing anything in the cluster.
#[derive(Parser, Debug, Clone)]
#[command(name = "kblast")]
#[command(about = "Node drain blast radius inspector for Kubernetes")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// Node to inspect
    #[arg(value_name = "NODE")]
    pub node: String,

    /// Path to kubeconfig file [default: KUBECONFIG or ~/.kube/config]
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubernetes context to use
    #[arg(long, env = "KUBECONFIG_CONTEXT")]
    pub context: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Maximum in-flight API requests per component
    #[arg(
        long,
        default_value_t = DEFAULT_CONCURRENCY as u64,
        value_parser = clap::value_parser!(u64).range(1..=64)
    )]
    pub concurrency: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Also list DaemonSet pods (never evicted by a drain)
    #[arg(long, default_value = "false")]
    pub show_daemonsets: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "KBLAST_LOG_LEVEL")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// kubectl-style sections
    Table,
    /// Machine-readable report
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub node: String,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub timeout: Duration,
    pub detect: DetectOptions,
    pub output: OutputFormat,
    pub show_daemonsets: bool,
    pub log_level: String,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Self {
        // KUBECONFIG may hold a colon-separated list; let kube merge it then.
        let kubeconfig = args.kubeconfig.filter(|path| is_single_file(path));

        Self {
            node: args.node,
            kubeconfig,
            context: args.context.filter(|ctx| !ctx.is_empty()),
            timeout: Duration::from_secs(args.timeout),
            detect: DetectOptions {
                concurrency: usize::try_from(args.concurrency).unwrap_or(DEFAULT_CONCURRENCY),
            },
            output: args.output,
            show_daemonsets: args.show_daemonsets,
            log_level: args.log_level,
        }
    }
}

fn is_single_file(path: &Path) -> bool {
    !path.as_os_str().is_empty() && !path.to_string_lossy().contains(':')
}
