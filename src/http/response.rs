//! JSON response envelope for the control plane.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Standard envelope: `{success, message?, data?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            error: None,
        }
    }
}

/// Payload of a successful health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// RFC 3339, UTC, second precision.
    pub timestamp: String,
}

impl HealthStatus {
    pub fn healthy_now() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_empty_fields() {
        let envelope = ApiResponse::ok("ok", HealthStatus::healthy_now());
        let body = serde_json::to_value(envelope).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "ok");
        assert_eq!(body["data"]["status"], "healthy");
        assert!(body.get("error").is_none());
    }

    #[test]
    fn test_envelope_parses_without_optional_fields() {
        let parsed: ApiResponse<HealthStatus> =
            serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!parsed.success);
        assert!(parsed.data.is_none());
        assert!(parsed.message.is_none());

        let full = ApiResponse::ok("ok", HealthStatus::healthy_now());
        let round: ApiResponse<HealthStatus> =
            serde_json::from_value(serde_json::to_value(&full).unwrap()).unwrap();
        assert_eq!(round, full);
    }

    #[test]
    fn test_timestamp_is_rfc3339_utc() {
        let status = HealthStatus::healthy_now();
        assert!(status.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&status.timestamp).is_ok());
    }
}
