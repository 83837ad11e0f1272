//! Top-level orchestration of signals, child exit and the control plane.
//!
//! # States
//! ```text
//! Starting → Serving → ShuttingDown → Terminated
//! ```
//!
//! # Transitions from Serving
//! - SIGHUP: logged, stays in Serving (reload is not implemented)
//! - SIGINT/SIGTERM: forward to child → wait or kill → stop server → exit 0
//! - child exits: stop server → exit 0 if clean, 1 otherwise
//! - control plane dies: terminate child → exit 2
//!
//! The first terminal transition ends `run`; later events are never read.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::SupervisorConfig;
use crate::http::server::{ServerFault, ServerManager};
use crate::lifecycle::signals::SupervisorSignal;
use crate::process::{ExitOutcome, ProcessManager};

/// Clean shutdown, signal-driven or after a clean child exit.
pub const EXIT_OK: u8 = 0;
/// The child exited with an error on its own.
pub const EXIT_CHILD_FAILED: u8 = 1;
/// Startup prerequisites failed, or the control plane died.
pub const EXIT_FATAL: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Serving,
    ShuttingDown,
    Terminated,
}

/// The orchestrator. Owns the process and server managers outright.
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    process: ProcessManager,
    server: ServerManager,
    state: SupervisorState,
    exit_code: Option<u8>,
}

impl Supervisor {
    pub fn new(
        config: Arc<SupervisorConfig>,
        process: ProcessManager,
        server: ServerManager,
    ) -> Self {
        Self {
            config,
            process,
            server,
            state: SupervisorState::Starting,
            exit_code: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn process(&self) -> &ProcessManager {
        &self.process
    }

    pub fn server(&self) -> &ServerManager {
        &self.server
    }

    /// Multiplex signals, child exit and server faults until one of them
    /// ends the run. Returns the process exit code.
    ///
    /// Calling `run` again after it returned yields the same code without
    /// repeating any shutdown work.
    pub async fn run(&mut self, signals: &mut mpsc::Receiver<SupervisorSignal>) -> u8 {
        if let Some(code) = self.exit_code {
            tracing::warn!(code, "Supervisor already terminated");
            return code;
        }

        let mut child_exit = match self.process.exit_watch() {
            Ok(watch) => watch,
            Err(e) => {
                tracing::error!(error = %e, "Supervised process was never started");
                return self.terminate(EXIT_FATAL).await;
            }
        };
        let mut server_fault = if self.server.is_running() {
            self.server.take_fault()
        } else {
            ServerFault::never()
        };

        self.state = SupervisorState::Serving;
        tracing::info!(
            grace_period = ?self.process.grace_period(),
            shutdown_timeout = ?self.config.shutdown_timeout,
            "Supervisor running"
        );

        loop {
            tokio::select! {
                Some(signal) = signals.recv() => {
                    if signal.is_termination() {
                        return self.shutdown_on_signal(signal).await;
                    }
                    tracing::info!(%signal, "Configuration reload not implemented; ignoring");
                }
                outcome = child_exit.wait() => {
                    return self.on_child_exit(outcome).await;
                }
                fault = server_fault.wait() => {
                    tracing::error!(
                        error = %fault,
                        "Control plane failed; stopping supervised process"
                    );
                    self.stop_child(SupervisorSignal::Terminate).await;
                    return self.terminate(EXIT_FATAL).await;
                }
            }
        }
    }

    async fn shutdown_on_signal(&mut self, signal: SupervisorSignal) -> u8 {
        tracing::info!(%signal, "Termination requested; forwarding to supervised process");
        self.stop_child(signal).await;
        self.terminate(EXIT_OK).await
    }

    async fn on_child_exit(&mut self, outcome: ExitOutcome) -> u8 {
        self.state = SupervisorState::ShuttingDown;
        let code = if outcome.is_success() {
            tracing::info!("Supervised process exited cleanly");
            EXIT_OK
        } else {
            tracing::error!(%outcome, "Supervised process exited with error");
            EXIT_CHILD_FAILED
        };
        self.terminate(code).await
    }

    /// Signal the child, then wait out the grace period or kill it.
    /// Failures are logged and never abort the sequence.
    async fn stop_child(&mut self, signal: SupervisorSignal) {
        self.state = SupervisorState::ShuttingDown;

        if let Err(e) = self.process.signal(signal) {
            tracing::warn!(error = %e, %signal, "Failed to signal supervised process");
        }

        match self.process.graceful_shutdown().await {
            Ok(outcome) => tracing::info!(%outcome, "Supervised process stopped"),
            Err(e) => tracing::warn!(error = %e, "Supervised process did not shut down cleanly"),
        }
    }

    async fn terminate(&mut self, code: u8) -> u8 {
        self.state = SupervisorState::ShuttingDown;

        if let Err(e) = self.server.shutdown(self.config.shutdown_timeout).await {
            tracing::warn!(error = %e, "Failed to shut down HTTP server");
        }

        self.state = SupervisorState::Terminated;
        self.exit_code = Some(code);
        tracing::info!(code, "Supervisor terminated");
        code
    }
}
