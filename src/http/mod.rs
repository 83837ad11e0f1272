//! HTTP control plane subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (127.0.0.1 or 0.0.0.0, HEALTH_ADDR)
//!     → server.rs (Axum setup, request id, tracing, security headers)
//!     → rate limiting (per client key)
//!     → handlers.rs (GET / health probe, 404 fallback)
//!     → response.rs (JSON envelope)
//! ```

pub mod handlers;
pub mod response;
pub mod server;

pub use response::{ApiResponse, HealthStatus};
pub use server::{build_router, ServerError, ServerFault, ServerManager};
