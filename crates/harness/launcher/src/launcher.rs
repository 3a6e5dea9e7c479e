use tracing::info;

use crate::{
    config::HarnessConfig, error::Result, ready, runner::RunnerProcess, server::ServerProcess,
    status::HarnessExitStatus,
};

/// Runs a test runner against a server and reports the runner's result.
pub struct Launcher {
    config: HarnessConfig,
    server: ServerProcess,
    server_pid: Option<u32>,
}

impl Launcher {
    pub fn new(config: HarnessConfig) -> Self {
        let server = ServerProcess::new(config.server().clone());
        Self {
            config,
            server,
            server_pid: None,
        }
    }

    /// Returns the config.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Returns the pid of the server started by the last run.
    pub fn server_pid(&self) -> Option<u32> {
        self.server_pid
    }

    /// Starts the server, runs the runner to completion and shuts the server
    /// down.
    ///
    /// Once the server has started it is shut down on every path, including
    /// when the runner fails to start, the readiness check fails or the
    /// runner times out.
    pub async fn run(&mut self) -> Result<HarnessExitStatus> {
        self.server.start()?;
        self.server_pid = self.server.pid();

        let res = self.run_runner().await;

        self.server.shutdown(self.config.shutdown_grace()).await;

        if let Ok(status) = &res {
            info!("harness finished with {status}");
        }

        res
    }

    async fn run_runner(&self) -> Result<HarnessExitStatus> {
        if let Some(check) = self.config.ready() {
            ready::wait_ready(check, &self.server).await?;
        }

        let runner = RunnerProcess::start(self.config.runner())?;
        let status = runner.wait(self.config.runner_timeout()).await?;

        Ok(status.into())
    }
}
