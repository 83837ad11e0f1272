//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate prerequisites before anything is started
//! - Initialize subsystems in dependency order
//! - Tear down whatever already started if a later step fails

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{apply_client_template, validate_prerequisites, ConfigError, SupervisorConfig};
use crate::health::HealthChecker;
use crate::http::server::{build_router, ServerError, ServerManager};
use crate::lifecycle::signals::{self, SupervisorSignal};
use crate::lifecycle::supervisor::{Supervisor, EXIT_FATAL};
use crate::observability::metrics;
use crate::process::{ProcessError, ProcessManager};
use crate::security::RateLimiter;

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("prerequisites validation failed: {0}")]
    Prerequisites(#[from] ConfigError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("control plane failed to start: {0}")]
    Server(#[from] ServerError),

    #[error("failed to start supervised process: {0}")]
    Process(#[from] ProcessError),
}

/// Start everything and run the supervisor to completion.
pub async fn run(config: SupervisorConfig) -> u8 {
    match bootstrap(config).await {
        Ok((mut supervisor, mut signals)) => supervisor.run(&mut signals).await,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            EXIT_FATAL
        }
    }
}

/// Bring the system up to the point where the orchestrator can take over.
pub async fn bootstrap(
    config: SupervisorConfig,
) -> Result<(Supervisor, mpsc::Receiver<SupervisorSignal>), StartupError> {
    validate_prerequisites(&config)?;
    apply_client_template(&config.config_path, &config.client);

    let config = Arc::new(config);

    if let Some(raw) = &config.observability.metrics_addr {
        match raw.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => {
                tracing::error!(metrics_addr = %raw, error = %e, "Failed to parse metrics address")
            }
        }
    }

    let signals = signals::listen().map_err(StartupError::Signals)?;

    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let router = build_router(HealthChecker::from_config(&config), limiter);
    let mut server = ServerManager::new(config.health_addr.clone(), router);
    server.start().await?;

    let mut process = ProcessManager::from_config(&config);
    if let Err(e) = process.start() {
        if let Err(shutdown_err) = server.shutdown(config.shutdown_timeout).await {
            tracing::warn!(error = %shutdown_err, "Failed to shut down HTTP server");
        }
        return Err(e.into());
    }

    Ok((Supervisor::new(config, process, server), signals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_missing_binary_fails_before_serving() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = SupervisorConfig {
            binary_path: PathBuf::from("/nonexistent/xray"),
            health_addr: addr.to_string(),
            ..SupervisorConfig::default()
        };

        let err = bootstrap(config).await.err().unwrap();
        assert!(matches!(err, StartupError::Prerequisites(_)));
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_run_maps_startup_failure_to_fatal() {
        let config = SupervisorConfig {
            binary_path: PathBuf::from("/nonexistent/xray"),
            ..SupervisorConfig::default()
        };
        assert_eq!(run(config).await, EXIT_FATAL);
    }
}
