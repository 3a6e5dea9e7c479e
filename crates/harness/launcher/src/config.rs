use std::{fmt, fs, net::SocketAddr, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    cli::Cli,
    error::{ConfigFileError, HarnessError, Result},
};

/// Server launched when neither the CLI nor the config file names one.
pub const DEFAULT_SERVER_PROGRAM: &str = "test/test";
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// An executable and the arguments it is launched with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns the program.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn to_expression(&self) -> duct::Expression {
        duct::cmd(self.program.as_str(), &self.args)
    }
}

impl TryFrom<Vec<String>> for CommandSpec {
    type Error = String;

    fn try_from(mut value: Vec<String>) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err("command must name a program".to_string());
        }

        let program = value.remove(0);
        Ok(Self {
            program,
            args: value,
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How the launcher decides the server is ready before starting the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyCheck {
    /// Poll a TCP connect until it succeeds.
    Tcp { addr: SocketAddr, timeout: Duration },
    /// Sleep a fixed amount of time.
    Delay { duration: Duration },
}

#[derive(Debug, Clone, bon::Builder)]
pub struct HarnessConfig {
    #[builder(default = CommandSpec::new(DEFAULT_SERVER_PROGRAM))]
    server: CommandSpec,
    runner: CommandSpec,
    ready: Option<ReadyCheck>,
    runner_timeout: Option<Duration>,
    #[builder(default = DEFAULT_SHUTDOWN_GRACE)]
    shutdown_grace: Duration,
}

impl HarnessConfig {
    /// Builds the configuration from the command line, reading the config
    /// file it points to if any.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = cli
            .config
            .as_deref()
            .map(FileConfig::from_path)
            .transpose()?;

        Self::resolve(cli, file)
    }

    /// Merges command line values over file values over defaults.
    pub fn resolve(cli: &Cli, file: Option<FileConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();

        let server = match &cli.server {
            Some(program) => {
                CommandSpec::new(program.clone()).args(cli.server_args.iter().cloned())
            }
            None if !cli.server_args.is_empty() => {
                return Err(HarnessError::Config(
                    "--server-arg requires --server".to_string(),
                ));
            }
            None => file
                .server
                .unwrap_or_else(|| CommandSpec::new(DEFAULT_SERVER_PROGRAM)),
        };

        let runner = CommandSpec::new(cli.runner.clone()).args(cli.runner_args.iter().cloned());

        let file_ready = file.ready.map(FileReadyCheck::into_check).transpose()?;
        let ready_timeout = cli.ready_timeout_ms.map(Duration::from_millis);
        let ready = match (cli.ready_tcp, file_ready) {
            (Some(addr), file_ready) => {
                let file_timeout = match file_ready {
                    Some(ReadyCheck::Tcp { timeout, .. }) => Some(timeout),
                    _ => None,
                };
                Some(ReadyCheck::Tcp {
                    addr,
                    timeout: ready_timeout
                        .or(file_timeout)
                        .unwrap_or(DEFAULT_READY_TIMEOUT),
                })
            }
            (None, Some(ReadyCheck::Tcp { addr, timeout })) => Some(ReadyCheck::Tcp {
                addr,
                timeout: ready_timeout.unwrap_or(timeout),
            }),
            (None, _) if ready_timeout.is_some() => {
                return Err(HarnessError::Config(
                    "--ready-timeout-ms requires a tcp ready check".to_string(),
                ));
            }
            (None, file_ready) => file_ready,
        };

        let runner_timeout = cli
            .timeout_ms
            .or(file.runner_timeout_ms)
            .map(Duration::from_millis);
        if runner_timeout == Some(Duration::ZERO) {
            return Err(HarnessError::Config(
                "runner timeout must be greater than zero".to_string(),
            ));
        }

        let shutdown_grace = cli
            .shutdown_grace_ms
            .or(file.shutdown_grace_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE);

        Ok(Self {
            server,
            runner,
            ready,
            runner_timeout,
            shutdown_grace,
        })
    }

    /// Returns the server command.
    pub fn server(&self) -> &CommandSpec {
        &self.server
    }

    /// Returns the runner command.
    pub fn runner(&self) -> &CommandSpec {
        &self.runner
    }

    /// Returns the readiness check.
    pub fn ready(&self) -> Option<&ReadyCheck> {
        self.ready.as_ref()
    }

    /// Returns the runner timeout.
    pub fn runner_timeout(&self) -> Option<Duration> {
        self.runner_timeout
    }

    /// Returns the time the server is given to stop after the soft stop
    /// signal before it is killed.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

/// Contents of a TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<CommandSpec>,
    pub ready: Option<FileReadyCheck>,
    pub runner_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let to_err = |source: ConfigFileError| HarnessError::ConfigFile {
            path: path.to_path_buf(),
            source,
        };

        let contents = fs::read_to_string(path).map_err(|e| to_err(e.into()))?;
        toml::from_str(&contents).map_err(|e| to_err(e.into()))
    }
}

/// The `[ready]` table of a config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileReadyCheck {
    pub tcp: Option<SocketAddr>,
    pub timeout_ms: Option<u64>,
    pub delay_ms: Option<u64>,
}

impl FileReadyCheck {
    fn into_check(self) -> Result<ReadyCheck> {
        match (self.tcp, self.delay_ms) {
            (Some(addr), None) => Ok(ReadyCheck::Tcp {
                addr,
                timeout: self
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_READY_TIMEOUT),
            }),
            (None, Some(delay_ms)) if self.timeout_ms.is_none() => Ok(ReadyCheck::Delay {
                duration: Duration::from_millis(delay_ms),
            }),
            (None, Some(_)) => Err(HarnessError::Config(
                "ready.timeout_ms only applies to ready.tcp".to_string(),
            )),
            (Some(_), Some(_)) => Err(HarnessError::Config(
                "ready must set only one of tcp or delay_ms".to_string(),
            )),
            (None, None) => Err(HarnessError::Config(
                "ready must set one of tcp or delay_ms".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tlsn-harness-launcher").chain(args.iter().copied()))
            .unwrap()
    }

    fn file(contents: &str) -> FileConfig {
        toml::from_str(contents).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::resolve(&cli(&["./runner"]), None).unwrap();

        assert_eq!(config.server(), &CommandSpec::new(DEFAULT_SERVER_PROGRAM));
        assert_eq!(config.runner(), &CommandSpec::new("./runner"));
        assert_eq!(config.ready(), None);
        assert_eq!(config.runner_timeout(), None);
        assert_eq!(config.shutdown_grace(), DEFAULT_SHUTDOWN_GRACE);
    }

    #[test]
    fn test_builder_defaults_match_resolve() {
        let config = HarnessConfig::builder()
            .runner(CommandSpec::new("./runner"))
            .build();

        assert_eq!(config.server(), &CommandSpec::new(DEFAULT_SERVER_PROGRAM));
        assert_eq!(config.shutdown_grace(), DEFAULT_SHUTDOWN_GRACE);
    }

    #[test]
    fn test_runner_args_are_forwarded() {
        let config =
            HarnessConfig::resolve(&cli(&["./runner", "--filter", "http", "-v"]), None).unwrap();

        assert_eq!(config.runner().arguments(), ["--filter", "http", "-v"]);
    }

    #[test]
    fn test_file_values() {
        let file = file(
            r#"
            server = ["bin/server", "--port", "8080"]
            runner_timeout_ms = 60000
            shutdown_grace_ms = 250

            [ready]
            tcp = "127.0.0.1:8080"
            timeout_ms = 2000
            "#,
        );

        let config = HarnessConfig::resolve(&cli(&["./runner"]), Some(file)).unwrap();

        assert_eq!(
            config.server(),
            &CommandSpec::new("bin/server").args(["--port", "8080"])
        );
        assert_eq!(config.runner_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.shutdown_grace(), Duration::from_millis(250));
        assert_eq!(
            config.ready(),
            Some(&ReadyCheck::Tcp {
                addr: "127.0.0.1:8080".parse().unwrap(),
                timeout: Duration::from_secs(2),
            })
        );
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = file(
            r#"
            server = ["bin/server"]
            runner_timeout_ms = 60000

            [ready]
            tcp = "127.0.0.1:8080"
            timeout_ms = 2000
            "#,
        );

        let cli = cli(&[
            "--server",
            "other/server",
            "--server-arg",
            "--quiet",
            "--timeout-ms",
            "1000",
            "--ready-timeout-ms",
            "500",
            "./runner",
        ]);
        let config = HarnessConfig::resolve(&cli, Some(file)).unwrap();

        assert_eq!(
            config.server(),
            &CommandSpec::new("other/server").arg("--quiet")
        );
        assert_eq!(config.runner_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(
            config.ready(),
            Some(&ReadyCheck::Tcp {
                addr: "127.0.0.1:8080".parse().unwrap(),
                timeout: Duration::from_millis(500),
            })
        );
    }

    #[test]
    fn test_delay_ready_check() {
        let file = file(
            r#"
            [ready]
            delay_ms = 300
            "#,
        );

        let config = HarnessConfig::resolve(&cli(&["./runner"]), Some(file)).unwrap();

        assert_eq!(
            config.ready(),
            Some(&ReadyCheck::Delay {
                duration: Duration::from_millis(300)
            })
        );
    }

    #[test]
    fn test_invalid_ready_table() {
        let both = file(
            r#"
            [ready]
            tcp = "127.0.0.1:8080"
            delay_ms = 300
            "#,
        );
        assert!(matches!(
            HarnessConfig::resolve(&cli(&["./runner"]), Some(both)),
            Err(HarnessError::Config(_))
        ));

        let neither = file("[ready]\n");
        assert!(matches!(
            HarnessConfig::resolve(&cli(&["./runner"]), Some(neither)),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_ready_timeout_without_tcp_check() {
        let args = cli(&["--ready-timeout-ms", "500", "./runner"]);
        assert!(matches!(
            HarnessConfig::resolve(&args, None),
            Err(HarnessError::Config(_))
        ));

        let delay = file(
            r#"
            [ready]
            delay_ms = 300
            "#,
        );
        assert!(matches!(
            HarnessConfig::resolve(&args, Some(delay)),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_server_args_without_server() {
        let cli = cli(&["--server-arg", "--quiet", "./runner"]);

        assert!(matches!(
            HarnessConfig::resolve(&cli, None),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let cli = cli(&["--timeout-ms", "0", "./runner"]);

        assert!(matches!(
            HarnessConfig::resolve(&cli, None),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_file_rejects_unknown_keys_and_empty_command() {
        assert!(toml::from_str::<FileConfig>("servr = [\"x\"]").is_err());
        assert!(toml::from_str::<FileConfig>("server = []").is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "server = [\"sleep\", \"30\"]").unwrap();

        let path = tmp.path().to_str().unwrap();
        let config = HarnessConfig::load(&cli(&["--config", path, "./runner"])).unwrap();

        assert_eq!(config.server(), &CommandSpec::new("sleep").arg("30"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = HarnessConfig::load(&cli(&["--config", "/does/not/exist.toml", "./runner"]))
            .unwrap_err();

        assert!(matches!(
            err,
            HarnessError::ConfigFile {
                source: ConfigFileError::Io(_),
                ..
            }
        ));
    }
}
