//! Management endpoint liveness probe.

use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;

use crate::config::SupervisorConfig;
use crate::observability::metrics;

/// Why a probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The connection was refused or could not be routed.
    #[error("management endpoint {addr} unreachable: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// No answer within the connect timeout.
    #[error("management probe to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },
}

/// Connect-only probe against the supervised process.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    addr: String,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.mgmt_addr.clone(), config.connect_timeout)
    }

    /// Attempt one connection; the socket is closed as soon as it opens.
    pub async fn check(&self) -> Result<(), ProbeError> {
        let result = match time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Ok(())
            }
            Ok(Err(source)) => Err(ProbeError::Unreachable {
                addr: self.addr.clone(),
                source,
            }),
            Err(_) => Err(ProbeError::Timeout {
                addr: self.addr.clone(),
                timeout: self.timeout,
            }),
        };

        metrics::record_health_probe(result.is_ok());
        if let Err(e) = &result {
            tracing::debug!(error = %e, "Health probe failed");
        }
        result
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}
