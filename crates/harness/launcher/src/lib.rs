//! Launches a server and a test runner against it, then exits with the
//! runner's status after stopping the server.

pub mod cli;
pub mod config;
pub mod error;
pub mod launcher;
pub mod ready;
pub mod runner;
pub mod server;
pub mod status;

pub use cli::Cli;
pub use config::{CommandSpec, HarnessConfig, ReadyCheck};
pub use error::{HarnessError, Role};
pub use launcher::Launcher;
pub use status::{HarnessExitStatus, TIMEOUT_EXIT_CODE};

/// Runs the harness once with the given config.
pub async fn run(config: HarnessConfig) -> error::Result<HarnessExitStatus> {
    let mut launcher = Launcher::new(config);
    launcher.run().await
}
