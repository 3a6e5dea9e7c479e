use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use harness_launcher::{Cli, HarnessConfig, Launcher, TIMEOUT_EXIT_CODE};
use tracing::error;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = HarnessConfig::load(&cli).context("failed to load harness configuration")?;

    let mut launcher = Launcher::new(config);
    let status = match launcher.run().await {
        Ok(status) => status,
        Err(e) if e.is_timeout() => {
            error!("{e}");
            process::exit(TIMEOUT_EXIT_CODE);
        }
        Err(e) => return Err(e).context("harness failed"),
    };

    process::exit(status.code());
}
