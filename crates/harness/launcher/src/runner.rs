use std::{io, process::ExitStatus, sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    config::CommandSpec,
    error::{HarnessError, Result, Role},
};

/// The test executable whose result the harness reports.
pub struct RunnerProcess {
    handle: Arc<duct::Handle>,
}

impl RunnerProcess {
    /// Starts the runner.
    pub fn start(command: &CommandSpec) -> Result<Self> {
        let handle = command
            .to_expression()
            .unchecked()
            .start()
            .map_err(|source| HarnessError::Spawn {
                role: Role::Runner,
                program: command.program().to_string(),
                source,
            })?;

        info!(pid = ?handle.pids(), "started runner `{command}`");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Returns the pid of the runner.
    pub fn pid(&self) -> Option<u32> {
        self.handle.pids().first().copied()
    }

    /// Waits for the runner to exit.
    ///
    /// If `timeout` elapses first the runner is killed and
    /// [`HarnessError::Timeout`] is returned.
    pub async fn wait(self, timeout: Option<Duration>) -> Result<ExitStatus> {
        let handle = self.handle.clone();
        let mut wait =
            tokio::task::spawn_blocking(move || handle.wait().map(|output| output.status));

        let joined = match timeout {
            None => (&mut wait).await,
            Some(timeout) => match tokio::time::timeout(timeout, &mut wait).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("runner did not finish within {timeout:?}, killing it");
                    if let Err(e) = self.handle.kill() {
                        warn!("failed to kill runner: {e}");
                    }
                    _ = wait.await;
                    return Err(HarnessError::Timeout { timeout });
                }
            },
        };

        let status = joined
            .map_err(|e| HarnessError::Wait {
                source: io::Error::other(e),
            })?
            .map_err(|source| HarnessError::Wait { source })?;

        info!("runner finished: {status}");

        Ok(status)
    }
}
