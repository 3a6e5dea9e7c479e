use std::{fmt, io, net::SocketAddr, path::PathBuf, process::ExitStatus, time::Duration};

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Which of the two child processes an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Runner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => write!(f, "server"),
            Role::Runner => write!(f, "runner"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("failed to spawn {role} `{program}`")]
    Spawn {
        role: Role,
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait on runner")]
    Wait {
        #[source]
        source: io::Error,
    },
    #[error("runner did not finish within {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("server did not accept connections on {addr} within {timeout:?}")]
    NotReady { addr: SocketAddr, timeout: Duration },
    #[error("server exited before becoming ready: {status}")]
    ServerExited { status: ExitStatus },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to load config file {}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: ConfigFileError,
    },
}

impl HarnessError {
    /// Returns `true` if the runner was stopped for exceeding its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
