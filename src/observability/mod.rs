//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, stdout)
//!     → metrics.rs (counters for probes, rejections, child exits)
//!
//! Consumers:
//!     → Container log collection (stdout/stderr, shared with the child)
//!     → Prometheus scrape (only when METRICS_ADDR is set)
//! ```
//!
//! # Design Decisions
//! - Structured key/value fields rather than formatted strings
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
