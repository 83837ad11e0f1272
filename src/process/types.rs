//! Child process states, outcomes and errors.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::sync::watch;

use crate::lifecycle::signals::SupervisorSignal;

/// How the supervised process ended. Recorded exactly once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with status 0.
    Success,
    /// Exited non-zero, or died from a signal.
    Failed {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// Killed by the supervisor once the grace period ran out.
    ForceKilled,
    /// The OS wait itself failed.
    WaitFailed(String),
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return ExitOutcome::Success;
        }

        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        ExitOutcome::Failed {
            code: status.code(),
            signal,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ExitOutcome::Success => "success",
            ExitOutcome::Failed { .. } => "failed",
            ExitOutcome::ForceKilled => "force_killed",
            ExitOutcome::WaitFailed(_) => "wait_failed",
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Success => write!(f, "exited cleanly"),
            ExitOutcome::Failed {
                code: Some(code), ..
            } => write!(f, "exit status {}", code),
            ExitOutcome::Failed {
                signal: Some(signal),
                ..
            } => write!(f, "terminated by signal {}", signal),
            ExitOutcome::Failed { .. } => write!(f, "exited abnormally"),
            ExitOutcome::ForceKilled => write!(f, "killed after grace period"),
            ExitOutcome::WaitFailed(reason) => write!(f, "wait failed: {}", reason),
        }
    }
}

/// Lifecycle of the single supervised process.
///
/// ```text
/// NotStarted → Running → Exited | Killed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running { pid: Option<u32> },
    Exited(ExitOutcome),
    Killed,
}

/// Errors from process management operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("binary not found at {0}")]
    BinaryNotFound(PathBuf),

    #[error("failed to launch {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process already started")]
    AlreadyStarted,

    #[error("process not started")]
    NotStarted,

    #[error("process already exited ({0})")]
    AlreadyExited(ExitOutcome),

    #[error("failed to deliver {signal} to pid {pid}: {source}")]
    Signal {
        signal: SupervisorSignal,
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("signal forwarding is not supported on this platform")]
    Unsupported,

    #[error("pid {0} was not reaped after kill")]
    ReapTimeout(u32),
}

/// Read side of the single-slot exit channel.
///
/// The slot is written once by the task that owns the child. Any number of
/// clones may wait on it; they all observe the same outcome.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ExitOutcome>>,
}

impl ExitWatch {
    pub(crate) fn new(rx: watch::Receiver<Option<ExitOutcome>>) -> Self {
        Self { rx }
    }

    /// The recorded outcome, if the child is already gone.
    pub fn peek(&self) -> Option<ExitOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait until the outcome is recorded.
    pub async fn wait(&mut self) -> ExitOutcome {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };

        outcome.or_else(|| self.peek()).unwrap_or_else(|| {
            ExitOutcome::WaitFailed("exit watcher stopped without an outcome".into())
        })
    }
}
