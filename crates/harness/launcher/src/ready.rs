use std::{net::SocketAddr, time::Duration};

use tokio::{net::TcpStream, time::Instant};
use tracing::{debug, info};

use crate::{
    config::ReadyCheck,
    error::{HarnessError, Result},
    server::ServerProcess,
};

const READY_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Waits until the server passes the readiness check.
pub async fn wait_ready(check: &ReadyCheck, server: &ServerProcess) -> Result<()> {
    match check {
        ReadyCheck::Delay { duration } => {
            tokio::time::sleep(*duration).await;
            ensure_running(server)
        }
        ReadyCheck::Tcp { addr, timeout } => wait_tcp(*addr, *timeout, server).await,
    }
}

async fn wait_tcp(addr: SocketAddr, timeout: Duration, server: &ServerProcess) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut retries = 0;
    loop {
        ensure_running(server)?;

        match tokio::time::timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => {
                info!(retries, "server is accepting connections on {addr}");
                return Ok(());
            }
            Ok(Err(e)) => debug!(retries, "server not ready on {addr}: {e}"),
            Err(_) => {}
        }

        if Instant::now() + READY_RETRY_DELAY > deadline {
            return Err(HarnessError::NotReady { addr, timeout });
        }

        tokio::time::sleep(READY_RETRY_DELAY).await;
        retries += 1;
    }
}

fn ensure_running(server: &ServerProcess) -> Result<()> {
    match server.exit_status() {
        Some(status) => Err(HarnessError::ServerExited { status }),
        None => Ok(()),
    }
}
