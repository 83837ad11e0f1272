//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGHUP, SIGINT and SIGTERM
//! - Translate them into `SupervisorSignal` events on one channel
//!
//! # Design Decisions
//! - Handlers are installed synchronously so a failure is a startup error
//! - Exactly one forwarding task feeds the orchestrator's channel
//! - The task ends on its own once the orchestrator drops the receiver

use std::fmt;
use tokio::sync::mpsc;

/// Capacity of the signal channel; bursts beyond this wait for the orchestrator.
const SIGNAL_BUFFER: usize = 8;

/// Signals the orchestrator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorSignal {
    /// Reload request. Acknowledged but not acted on.
    Hangup,
    Interrupt,
    Terminate,
}

impl SupervisorSignal {
    /// Whether this signal starts the shutdown sequence.
    pub fn is_termination(self) -> bool {
        matches!(self, SupervisorSignal::Interrupt | SupervisorSignal::Terminate)
    }

    #[cfg(unix)]
    pub fn as_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            SupervisorSignal::Hangup => Signal::SIGHUP,
            SupervisorSignal::Interrupt => Signal::SIGINT,
            SupervisorSignal::Terminate => Signal::SIGTERM,
        }
    }
}

impl fmt::Display for SupervisorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorSignal::Hangup => "SIGHUP",
            SupervisorSignal::Interrupt => "SIGINT",
            SupervisorSignal::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// Install signal handlers and return the event stream.
///
/// Must be called from within the Tokio runtime.
#[cfg(unix)]
pub fn listen() -> std::io::Result<mpsc::Receiver<SupervisorSignal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = sighup.recv() => SupervisorSignal::Hangup,
                Some(()) = sigint.recv() => SupervisorSignal::Interrupt,
                Some(()) = sigterm.recv() => SupervisorSignal::Terminate,
                else => break,
            };

            tracing::info!(signal = %received, "Signal received");
            if tx.send(received).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

#[cfg(not(unix))]
pub fn listen() -> std::io::Result<mpsc::Receiver<SupervisorSignal>> {
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received");
            if tx.send(SupervisorSignal::Interrupt).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
