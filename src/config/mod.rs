//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! process environment
//!     → loader.rs (read variables, apply defaults, parse durations)
//!     → SupervisorConfig (immutable)
//!     → validation.rs (binary must exist; fatal otherwise)
//!     → template.rs (substitute client identity into the child's config)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; SIGHUP does not reload it
//! - Every field has a default so an empty environment is valid
//! - Malformed values degrade to defaults with a warning, never a hard failure

pub mod loader;
pub mod schema;
pub mod template;
pub mod validation;

pub use loader::{load_from_env, load_with, parse_duration, ConfigError};
pub use schema::{ClientIdentity, ObservabilityConfig, RateLimitConfig, SupervisorConfig};
pub use template::{apply_client_template, TemplateOutcome};
pub use validation::validate_prerequisites;
