use std::{fmt, process::ExitStatus};

/// Exit code reported when the runner is stopped for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Offset added to the signal number when the runner is killed by a signal.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

/// Exit code used when the platform reports neither a code nor a signal.
const UNKNOWN_EXIT_CODE: i32 = 1;

/// The exit status the harness reports to its caller.
///
/// Mirrors the runner's exit code when it exits normally. A runner killed by
/// a signal is reported as `128 + signal`, so a segfault (SIGSEGV, 11) is
/// reported as 139.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessExitStatus(i32);

impl HarnessExitStatus {
    pub const SUCCESS: Self = Self(0);

    pub fn new(code: i32) -> Self {
        Self(code)
    }

    /// Returns the exit code.
    pub fn code(&self) -> i32 {
        self.0
    }

    /// Returns `true` if the runner succeeded.
    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl From<ExitStatus> for HarnessExitStatus {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;

            if let Some(signal) = status.signal() {
                return Self(SIGNAL_EXIT_OFFSET + signal);
            }
        }

        Self(UNKNOWN_EXIT_CODE)
    }
}

impl fmt::Display for HarnessExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code {}", self.0)
    }
}
