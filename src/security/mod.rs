//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (hardening headers attached to whatever comes back)
//!     → rate_limit.rs (per-client sliding window, 429 on excess)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Rate limiting precedes routing, so unknown paths also spend budget
//! - Rejections are terse plain text; nothing internal leaks to clients

pub mod headers;
pub mod rate_limit;

pub use headers::{with_security_headers, SECURITY_HEADERS};
pub use rate_limit::{
    client_key, rate_limit_middleware, Clock, ManualClock, RateLimiter, SystemClock,
};
