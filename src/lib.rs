//! Proxy Supervisor Library
//!
//! Supervises one long-running proxy process inside a container and exposes
//! a small HTTP control plane for health probing.
//!
//! # Architecture Overview
//!
//! ```text
//!   OS signals ──▶ lifecycle::signals ──┐
//!                                       ▼
//!   child exit ──▶ process::manager ──▶ lifecycle::supervisor ──▶ exit code
//!                                       ▲
//!   HTTP ──▶ http::server ──────────────┘ (fault only)
//!              │
//!              ├─ security (headers, rate limit)
//!              └─ health::probe ──▶ child management endpoint (TCP connect)
//! ```

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod process;
pub mod security;

pub use config::SupervisorConfig;
pub use lifecycle::{Supervisor, SupervisorSignal};
pub use process::ProcessManager;
