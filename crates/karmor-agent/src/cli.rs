//! Command-line arguments: kebab-case long flags, `humantime::Duration`
//! for duration-shaped values.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "karmor", version, about = "Karmor runtime enforcement agent")]
pub struct Cli {
    /// Optional YAML config file; any flag passed on the command line
    /// overrides the same field read from this file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TCP port the `WatchLogs`/`WatchMessages`/`HealthCheck` RPC service
    /// listens on.
    #[arg(long = "grpc-port")]
    pub grpc_port: Option<u16>,

    /// Local sink: "stdout", "none", or a file path.
    #[arg(long = "log-path")]
    pub log_path: Option<String>,

    /// Enable matching against host (node-level) policies.
    #[arg(long = "enable-host-policy")]
    pub enable_host_policy: bool,

    /// Enable the auditd suppress-and-drop rule for EACCES opens.
    #[arg(long = "enable-auditd")]
    pub enable_auditd: bool,

    /// Cluster name attached to every emitted log/message.
    #[arg(long = "cluster-name")]
    pub cluster_name: Option<String>,

    /// How often the process-tree tracker reclaims exited nodes past their
    /// grace window.
    #[arg(long = "reclaim-interval")]
    pub reclaim_interval: Option<humantime::Duration>,
}
