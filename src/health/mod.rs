//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET / on the control plane
//!     → probe.rs (bounded TCP connect to the child's management endpoint)
//!     → connection accepted: healthy, socket closed immediately
//!     → refused / timed out: unhealthy, reported once
//! ```
//!
//! # Design Decisions
//! - Liveness only: no payload is exchanged with the child
//! - No internal retries; whoever polls the endpoint owns retry policy
//! - Every probe is bounded by the configured connect timeout

pub mod probe;

pub use probe::{HealthChecker, ProbeError};
