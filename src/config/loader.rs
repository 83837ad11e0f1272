//! Configuration loading from the process environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::{
    normalize_listen_addr, ClientIdentity, ObservabilityConfig, RateLimitConfig, SupervisorConfig,
    DEFAULT_BINARY_PATH, DEFAULT_CLIENT_EMAIL, DEFAULT_CLIENT_UUID, DEFAULT_CONFIG_PATH,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_GRACE_PERIOD, DEFAULT_HEALTH_ADDR, DEFAULT_MGMT_ADDR,
    DEFAULT_SHUTDOWN_TIMEOUT,
};

pub const ENV_BINARY_PATH: &str = "XRAY_BIN";
pub const ENV_CONFIG_PATH: &str = "XRAY_CONFIG";
pub const ENV_HEALTH_ADDR: &str = "HEALTH_ADDR";
pub const ENV_MGMT_ADDR: &str = "XRAY_MGMT_SOCKET";
pub const ENV_CONNECT_TIMEOUT: &str = "CONNECT_TIMEOUT";
pub const ENV_GRACE_PERIOD: &str = "GRACE_PERIOD";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "SHUTDOWN_TIMEOUT";
pub const ENV_CLIENT_UUID: &str = "XRAY_CLIENT_UUID";
pub const ENV_CLIENT_EMAIL: &str = "XRAY_CLIENT_EMAIL";
pub const ENV_RATE_LIMIT_REQUESTS: &str = "RATE_LIMIT_REQUESTS";
pub const ENV_RATE_LIMIT_WINDOW: &str = "RATE_LIMIT_WINDOW";
pub const ENV_RATE_LIMIT_MAX_CLIENTS: &str = "RATE_LIMIT_MAX_CLIENTS";
pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

/// Error type for configuration and prerequisite checks.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The supervised binary is missing or unreadable.
    #[error("binary not found at {path}: {source}")]
    BinaryNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The binary path exists but is not a regular file.
    #[error("binary path {0} is not a regular file")]
    NotAFile(PathBuf),
}

/// Load configuration from the real process environment.
pub fn load_from_env() -> SupervisorConfig {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
///
/// Empty values count as unset. Malformed durations and integers fall back
/// to their defaults with a warning; loading itself never fails.
pub fn load_with<F>(lookup: F) -> SupervisorConfig
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let string_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

    let rate_defaults = RateLimitConfig::default();

    let config = SupervisorConfig {
        binary_path: PathBuf::from(string_or(ENV_BINARY_PATH, DEFAULT_BINARY_PATH)),
        config_path: PathBuf::from(string_or(ENV_CONFIG_PATH, DEFAULT_CONFIG_PATH)),
        health_addr: normalize_listen_addr(&string_or(ENV_HEALTH_ADDR, DEFAULT_HEALTH_ADDR)),
        mgmt_addr: string_or(ENV_MGMT_ADDR, DEFAULT_MGMT_ADDR),
        connect_timeout: duration_or(
            get(ENV_CONNECT_TIMEOUT),
            ENV_CONNECT_TIMEOUT,
            DEFAULT_CONNECT_TIMEOUT,
        ),
        grace_period: duration_or(get(ENV_GRACE_PERIOD), ENV_GRACE_PERIOD, DEFAULT_GRACE_PERIOD),
        shutdown_timeout: duration_or(
            get(ENV_SHUTDOWN_TIMEOUT),
            ENV_SHUTDOWN_TIMEOUT,
            DEFAULT_SHUTDOWN_TIMEOUT,
        ),
        client: ClientIdentity {
            uuid: string_or(ENV_CLIENT_UUID, DEFAULT_CLIENT_UUID),
            email: string_or(ENV_CLIENT_EMAIL, DEFAULT_CLIENT_EMAIL),
        },
        rate_limit: RateLimitConfig {
            max_requests: count_or(
                get(ENV_RATE_LIMIT_REQUESTS),
                ENV_RATE_LIMIT_REQUESTS,
                rate_defaults.max_requests,
            ),
            window: duration_or(
                get(ENV_RATE_LIMIT_WINDOW),
                ENV_RATE_LIMIT_WINDOW,
                rate_defaults.window,
            ),
            max_tracked_clients: count_or(
                get(ENV_RATE_LIMIT_MAX_CLIENTS),
                ENV_RATE_LIMIT_MAX_CLIENTS,
                rate_defaults.max_tracked_clients,
            ),
        },
        observability: ObservabilityConfig {
            metrics_addr: get(ENV_METRICS_ADDR),
        },
    };

    tracing::info!(
        binary = %config.binary_path.display(),
        health_addr = %config.health_addr,
        mgmt_addr = %config.mgmt_addr,
        grace_period = ?config.grace_period,
        shutdown_timeout = ?config.shutdown_timeout,
        "Configuration loaded"
    );

    config
}

fn duration_or(value: Option<String>, key: &str, default: Duration) -> Duration {
    match value {
        None => default,
        Some(raw) => match parse_duration(&raw) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    error = %e,
                    default = ?default,
                    "Invalid duration, using default"
                );
                default
            }
        },
    }
}

fn count_or(value: Option<String>, key: &str, default: usize) -> usize {
    match value {
        None => default,
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                tracing::warn!(key, value = %raw, default, "Invalid count, using default");
                default
            }
        },
    }
}

/// Parse a Go-style duration such as `500ms`, `2s` or `1m30s`.
///
/// A bare integer is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {s:?}"))?;
        if num_end == 0 {
            return Err(format!("invalid duration {s:?}"));
        }
        let amount = &rest[..num_end];
        let after = &rest[num_end..];
        let unit_end = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let unit = &after[..unit_end];

        let nanos_per_unit: u64 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(format!("unknown unit {unit:?} in duration {s:?}")),
        };

        let span = if amount.contains('.') {
            let value: f64 = amount
                .parse()
                .map_err(|_| format!("invalid number {amount:?} in duration {s:?}"))?;
            Duration::try_from_secs_f64(value * nanos_per_unit as f64 / 1e9)
                .map_err(|_| format!("duration {s:?} out of range"))?
        } else {
            let value: u64 = amount
                .parse()
                .map_err(|_| format!("invalid number {amount:?} in duration {s:?}"))?;
            value
                .checked_mul(nanos_per_unit)
                .map(Duration::from_nanos)
                .ok_or_else(|| format!("duration {s:?} out of range"))?
        };

        total = total
            .checked_add(span)
            .ok_or_else(|| format!("duration {s:?} out of range"))?;
        rest = &after[unit_end..];
    }

    Ok(total)
}
