use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Starts a server, runs a test runner against it and exits with the
/// runner's exit code.
#[derive(Debug, Parser)]
#[command(version, about, name = "tlsn-harness-launcher", long_about = None)]
pub struct Cli {
    /// Runner executable.
    pub runner: String,
    /// Arguments passed to the runner.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub runner_args: Vec<String>,
    /// Configuration file path (TOML).
    #[arg(long, env = "HARNESS_CONFIG")]
    pub config: Option<PathBuf>,
    /// Server executable. Defaults to `test/test`.
    #[arg(long, env = "HARNESS_SERVER")]
    pub server: Option<String>,
    /// Argument passed to the server, may be repeated.
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    pub server_args: Vec<String>,
    /// Wait until the server accepts TCP connections on this address before
    /// starting the runner.
    #[arg(long)]
    pub ready_tcp: Option<SocketAddr>,
    /// How long to wait for the server to become ready, in milliseconds.
    #[arg(long)]
    pub ready_timeout_ms: Option<u64>,
    /// Runner timeout in milliseconds. Unbounded if not set.
    #[arg(long, env = "HARNESS_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
    /// Time the server is given to stop after the soft stop signal, in
    /// milliseconds.
    #[arg(long)]
    pub shutdown_grace_ms: Option<u64>,
}
