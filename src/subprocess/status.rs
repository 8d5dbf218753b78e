use std::fmt;
use std::os::unix::process::ExitStatusExt;

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Shell-style status: the exit code, or `128 + signo` for a signal
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Error(code) => *code,
            ExitStatus::Signal(signo) => 128 + signo,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match self {
            ExitStatus::Signal(signo) => Some(*signo),
            _ => None,
        }
    }

    pub(crate) fn from_std(status: std::process::ExitStatus) -> Self {
        if let Some(signo) = status.signal() {
            return ExitStatus::Signal(signo);
        }
        match status.code() {
            Some(0) => ExitStatus::Success,
            Some(code) => ExitStatus::Error(code),
            None => ExitStatus::Error(-1),
        }
    }
}

/// Symbolic name for a signal number, e.g. `SIGTERM`
pub fn signal_name(signo: i32) -> String {
    nix::sys::signal::Signal::try_from(signo)
        .map(|signal| signal.as_str().to_string())
        .unwrap_or_else(|_| format!("SIG{}", signo))
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Signal(signo) => write!(f, "{} ({})", self.code(), signal_name(*signo)),
            _ => write!(f, "{}", self.code()),
        }
    }
}
