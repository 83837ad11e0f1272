//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the supervisor.
//! Every field has a documented default so a bare container starts cleanly.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BINARY_PATH: &str = "/usr/local/bin/xray";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/xray/config.json";
pub const DEFAULT_HEALTH_ADDR: &str = ":8080";
pub const DEFAULT_MGMT_ADDR: &str = "127.0.0.1:10085";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(12);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for the OS to reap the child after SIGKILL.
pub const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for closing control-plane connections left after the shutdown timeout.
pub const FORCE_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CLIENT_UUID: &str = "00000000-0000-0000-0000-000000000000";
pub const DEFAULT_CLIENT_EMAIL: &str = "default@example.com";

/// Root configuration for the supervisor.
///
/// Built once at startup and shared read-only (`Arc<SupervisorConfig>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorConfig {
    /// Path to the supervised proxy binary.
    pub binary_path: PathBuf,

    /// Config file handed to the child as `-config <path>`.
    pub config_path: PathBuf,

    /// Bind address of the HTTP control plane (e.g. "0.0.0.0:8080").
    pub health_addr: String,

    /// Loopback address of the child's management endpoint.
    pub mgmt_addr: String,

    /// Upper bound for a single management probe.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Time the child gets to exit on its own after being signalled.
    #[serde(with = "duration_ms")]
    pub grace_period: Duration,

    /// Time in-flight control-plane requests get to drain.
    #[serde(with = "duration_ms")]
    pub shutdown_timeout: Duration,

    /// Client identity substituted into the child's config file.
    pub client: ClientIdentity,

    /// Control-plane admission control.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from(DEFAULT_BINARY_PATH),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            health_addr: normalize_listen_addr(DEFAULT_HEALTH_ADDR),
            mgmt_addr: DEFAULT_MGMT_ADDR.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            client: ClientIdentity::default(),
            rate_limit: RateLimitConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Worst-case time between a termination signal and process exit.
    ///
    /// A child that outlives the grace period is killed, and reaping it may
    /// take up to [`KILL_REAP_TIMEOUT`] on top of the configured waits.
    /// Connections still open after the shutdown timeout are closed within
    /// [`FORCE_CLOSE_TIMEOUT`].
    pub fn shutdown_budget(&self) -> Duration {
        self.grace_period + KILL_REAP_TIMEOUT + self.shutdown_timeout + FORCE_CLOSE_TIMEOUT
    }
}

/// Identity fields used only for config templating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientIdentity {
    pub uuid: String,
    pub email: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            uuid: DEFAULT_CLIENT_UUID.to_string(),
            email: DEFAULT_CLIENT_EMAIL.to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitConfig {
    /// Requests admitted per client within one window.
    pub max_requests: usize,

    /// Length of the trailing admission window.
    #[serde(with = "duration_ms")]
    pub window: Duration,

    /// Upper bound on distinct client keys held in memory.
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            max_tracked_clients: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ObservabilityConfig {
    /// Prometheus scrape address; metrics export is off when unset.
    pub metrics_addr: Option<String>,
}

/// Expand Go-style ":port" listen addresses to an explicit wildcard host.
pub fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
