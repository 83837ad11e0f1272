//! Startup prerequisite checks.
//!
//! A missing binary is a broken deployment, not a transient condition, so
//! these checks run once before anything is started and are never retried.

use crate::config::loader::ConfigError;
use crate::config::schema::SupervisorConfig;

/// Verify that the supervised binary exists and is a regular file.
pub fn validate_prerequisites(config: &SupervisorConfig) -> Result<(), ConfigError> {
    let path = &config.binary_path;
    let meta = std::fs::metadata(path).map_err(|source| ConfigError::BinaryNotFound {
        path: path.clone(),
        source,
    })?;

    if !meta.is_file() {
        return Err(ConfigError::NotAFile(path.clone()));
    }

    Ok(())
}
