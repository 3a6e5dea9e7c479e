use std::{io, process::ExitStatus, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::CommandSpec,
    error::{HarnessError, Result, Role},
};

const SHUTDOWN_POLL_DELAY: Duration = Duration::from_millis(50);

/// The long-lived server the runner is tested against.
pub struct ServerProcess {
    command: CommandSpec,
    handle: Option<duct::Handle>,
}

impl ServerProcess {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            handle: None,
        }
    }

    /// Starts the server.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let handle = self
            .command
            .to_expression()
            .unchecked()
            .start()
            .map_err(|source| HarnessError::Spawn {
                role: Role::Server,
                program: self.command.program().to_string(),
                source,
            })?;

        info!(pid = ?handle.pids(), "started server `{}`", self.command);

        self.handle = Some(handle);

        Ok(())
    }

    /// Returns the pid of the running server.
    pub fn pid(&self) -> Option<u32> {
        self.handle
            .as_ref()
            .and_then(|handle| handle.pids().first().copied())
    }

    /// Returns the exit status if the server has already exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        let handle = self.handle.as_ref()?;
        match handle.try_wait() {
            Ok(output) => output.map(|output| output.status),
            Err(e) => {
                warn!("failed to poll server status: {e}");
                None
            }
        }
    }

    /// Shuts down the server.
    ///
    /// Sends a soft stop signal and waits up to `grace` for the server to
    /// exit before killing it. Calling this on a server that is not running
    /// does nothing.
    pub async fn shutdown(&mut self, grace: Duration) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match handle.try_wait() {
            Ok(Some(output)) => {
                info!("server had already exited: {}", output.status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("failed to poll server status: {e}"),
        }

        if let Err(e) = terminate(&handle) {
            warn!("failed to signal server: {e}");
        }

        let deadline = Instant::now() + grace;
        loop {
            match handle.try_wait() {
                Ok(Some(output)) => {
                    info!("server stopped: {}", output.status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    tokio::time::sleep(SHUTDOWN_POLL_DELAY).await;
                }
                Ok(None) => {
                    warn!("server did not stop within {grace:?}, killing it");
                    break;
                }
                Err(e) => {
                    warn!("failed to poll server status: {e}");
                    break;
                }
            }
        }

        let res = tokio::task::spawn_blocking(move || {
            _ = handle.kill();
            _ = handle.wait();
        })
        .await;

        if let Err(e) = res {
            warn!("failed to reap server: {e}");
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.handle.as_ref().inspect(|handle| {
            _ = handle.kill();
            _ = handle.wait();
        });
    }
}

#[cfg(unix)]
fn terminate(handle: &duct::Handle) -> io::Result<()> {
    for pid in handle.pids() {
        // SAFETY: `kill` has no memory safety requirements. The pid belongs to
        // a child that has not been reaped yet.
        let res = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if res != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                debug!(pid, "server exited before it was signalled");
                continue;
            }
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(not(unix))]
fn terminate(handle: &duct::Handle) -> io::Result<()> {
    handle.kill()
}
