//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Template → Signals → HTTP server → Child
//!
//! Run (supervisor.rs):
//!     select { signal, child exit, server fault } → one terminal transition
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Graceful shutdown of child, then control plane
//!     SIGHUP → Logged; reload not implemented
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, and nothing is left half-running
//! - Ordered shutdown: signal child, wait or kill, stop server, exit
//! - Every wait on the shutdown path is bounded by configuration

pub mod signals;
pub mod startup;
pub mod supervisor;

pub use signals::SupervisorSignal;
pub use startup::{bootstrap, run, StartupError};
pub use supervisor::{Supervisor, SupervisorState, EXIT_CHILD_FAILED, EXIT_FATAL, EXIT_OK};
