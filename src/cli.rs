use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "skiff",
    version,
    about = "A terminal dashboard for watching and operating Kubernetes resources."
)]
pub struct CliArgs {
    /// Refresh interval in milliseconds
    #[arg(long)]
    pub refresh_ms: Option<u64>,

    /// How long added or updated rows stay highlighted, in milliseconds
    #[arg(long)]
    pub flash_ms: Option<u64>,

    /// Kubeconfig context to connect with
    #[arg(long)]
    pub context: Option<String>,

    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Resource to show first (for example: po, dp, svc, no, pv)
    #[arg(long, default_value = "po")]
    pub kind: String,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
