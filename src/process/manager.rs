//! Supervised process lifecycle.
//!
//! # Responsibilities
//! - Launch `<binary> -config <path>` with inherited environment and stdio
//! - Own the child handle in one watcher task that waits on it exactly once
//! - Forward signals, race the grace period, force-kill on expiry
//!
//! # Design Decisions
//! - The watcher task is the only code touching `Child`; the manager talks to
//!   it through a kill request (oneshot) and the exit slot (watch)
//! - Kill is requested at most once; later calls just read the recorded outcome
//! - `kill_on_drop` so a crashing supervisor never leaves the child behind

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::schema::KILL_REAP_TIMEOUT;
use crate::config::SupervisorConfig;
use crate::lifecycle::signals::SupervisorSignal;
use crate::observability::metrics;
use crate::process::types::{ExitOutcome, ExitWatch, ProcessError, ProcessState};

struct RunningChild {
    pid: Option<u32>,
    exit: ExitWatch,
    kill_tx: Option<oneshot::Sender<()>>,
    _watcher: JoinHandle<()>,
}

/// Owner of the single supervised process.
pub struct ProcessManager {
    binary_path: PathBuf,
    config_path: PathBuf,
    grace_period: Duration,
    child: Option<RunningChild>,
}

impl ProcessManager {
    pub fn new(
        binary_path: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        grace_period: Duration,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            config_path: config_path.into(),
            grace_period,
            child: None,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(
            config.binary_path.clone(),
            config.config_path.clone(),
            config.grace_period,
        )
    }

    /// Launch the child. There is no retry: a missing binary is a deployment error.
    ///
    /// Must be called from within the Tokio runtime.
    pub fn start(&mut self) -> Result<Option<u32>, ProcessError> {
        if self.child.is_some() {
            return Err(ProcessError::AlreadyStarted);
        }
        if !self.binary_path.is_file() {
            return Err(ProcessError::BinaryNotFound(self.binary_path.clone()));
        }

        let child = Command::new(&self.binary_path)
            .arg("-config")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                path: self.binary_path.clone(),
                source,
            })?;

        let pid = child.id();
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_child(child, pid, kill_rx, exit_tx));

        tracing::info!(
            pid = ?pid,
            binary = %self.binary_path.display(),
            config = %self.config_path.display(),
            "Started supervised process"
        );

        self.child = Some(RunningChild {
            pid,
            exit: ExitWatch::new(exit_rx),
            kill_tx: Some(kill_tx),
            _watcher: watcher,
        });
        Ok(pid)
    }

    pub fn state(&self) -> ProcessState {
        match &self.child {
            None => ProcessState::NotStarted,
            Some(child) => match child.exit.peek() {
                None => ProcessState::Running { pid: child.pid },
                Some(ExitOutcome::ForceKilled) => ProcessState::Killed,
                Some(outcome) => ProcessState::Exited(outcome),
            },
        }
    }

    /// Subscribe to the child's exit.
    pub fn exit_watch(&self) -> Result<ExitWatch, ProcessError> {
        self.child
            .as_ref()
            .map(|child| child.exit.clone())
            .ok_or(ProcessError::NotStarted)
    }

    /// Forward `signal` to the child.
    pub fn signal(&self, signal: SupervisorSignal) -> Result<(), ProcessError> {
        let child = self.child.as_ref().ok_or(ProcessError::NotStarted)?;
        if let Some(outcome) = child.exit.peek() {
            return Err(ProcessError::AlreadyExited(outcome));
        }
        let pid = child
            .pid
            .ok_or_else(|| {
                ProcessError::AlreadyExited(ExitOutcome::WaitFailed("pid unavailable".into()))
            })?;

        deliver(pid, signal)?;
        tracing::debug!(pid, %signal, "Signal delivered");
        Ok(())
    }

    /// Give the child the grace period to exit, then kill it.
    ///
    /// Returns exactly one outcome. The grace timer is dropped together with
    /// the losing branch, whichever side wins.
    pub async fn graceful_shutdown(&mut self) -> Result<ExitOutcome, ProcessError> {
        let mut exit = self.exit_watch()?;

        match time::timeout(self.grace_period, exit.wait()).await {
            Ok(outcome) => {
                tracing::info!(%outcome, "Supervised process exited within grace period");
                Ok(outcome)
            }
            Err(_) => {
                tracing::warn!(
                    grace_period = ?self.grace_period,
                    "Grace period expired; killing supervised process"
                );
                self.kill().await
            }
        }
    }

    /// Forcefully terminate the child.
    ///
    /// Idempotent: once the child is gone this returns the recorded outcome.
    pub async fn kill(&mut self) -> Result<ExitOutcome, ProcessError> {
        let child = self.child.as_mut().ok_or(ProcessError::NotStarted)?;
        if let Some(outcome) = child.exit.peek() {
            return Ok(outcome);
        }

        if let Some(kill_tx) = child.kill_tx.take() {
            // Err means the watcher already recorded an exit; wait() below returns it.
            let _ = kill_tx.send(());
        }

        let mut exit = child.exit.clone();
        time::timeout(KILL_REAP_TIMEOUT, exit.wait())
            .await
            .map_err(|_| ProcessError::ReapTimeout(child.pid.unwrap_or_default()))
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

/// Sole owner of `Child`: waits once, or kills on request, and records the outcome.
async fn watch_child(
    mut child: Child,
    pid: Option<u32>,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
) {
    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ExitOutcome::from_status(status),
            Err(e) => ExitOutcome::WaitFailed(e.to_string()),
        },
        Ok(()) = kill_rx => match child.kill().await {
            Ok(()) => ExitOutcome::ForceKilled,
            Err(e) => ExitOutcome::WaitFailed(e.to_string()),
        },
    };

    tracing::info!(pid = ?pid, %outcome, "Supervised process finished");
    metrics::record_child_exit(outcome.label());
    exit_tx.send_replace(Some(outcome));
}

#[cfg(unix)]
fn deliver(pid: u32, signal: SupervisorSignal) -> Result<(), ProcessError> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| ProcessError::Signal {
        signal,
        pid,
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"),
    })?;

    kill(Pid::from_raw(raw), signal.as_nix()).map_err(|errno| ProcessError::Signal {
        signal,
        pid,
        source: errno.into(),
    })
}

#[cfg(not(unix))]
fn deliver(_pid: u32, _signal: SupervisorSignal) -> Result<(), ProcessError> {
    Err(ProcessError::Unsupported)
}
