//! Supervised process subsystem.
//!
//! # Data Flow
//! ```text
//! start()  → spawn child → watcher task owns Child
//!                              ├─ child.wait()  ─┐
//!                              └─ kill request ──┴→ ExitOutcome → exit slot (watch)
//! signal() → kill(pid, sig)
//! graceful_shutdown() → timeout(grace, exit slot) → kill() on expiry
//! ```
//!
//! # Design Decisions
//! - Exactly one task waits on the child; everyone else reads the exit slot
//! - The orchestrator serializes every call, so the manager needs no locks

pub mod manager;
pub mod types;

pub use manager::ProcessManager;
pub use types::{ExitOutcome, ExitWatch, ProcessError, ProcessState};
