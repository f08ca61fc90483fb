//! The stable response envelope of the ember HTTP surface.
//!
//! Every endpoint wraps its payload in `ApiResponse`; failures always render
//! as `ApiErrorResponse` with a stable code and a message that never carries
//! user data or internal identifiers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    /// Attaches a human-readable note, e.g. why a candidate list came back
    /// empty without being an error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

// ---------------------------------------------------------------------------
// Health probing
// ---------------------------------------------------------------------------

/// One probed subsystem. The matching engine reports `database` (the
/// candidate path is dead without it) and `rabbitmq` (event fan-out is
/// best-effort, so a broken channel only degrades).
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthCheck {
    pub fn passing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
        }
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub checks: Vec<HealthCheck>,
}

impl HealthResponse {
    /// Overall status is the worst individual check.
    pub fn from_checks(
        service: impl Into<String>,
        version: impl Into<String>,
        checks: Vec<HealthCheck>,
    ) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self {
            status,
            service: service.into(),
            version: version.into(),
            checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_health_is_the_worst_check() {
        let all_good = HealthResponse::from_checks(
            "svc",
            "0.1.0",
            vec![HealthCheck::passing("database"), HealthCheck::passing("rabbitmq")],
        );
        assert_eq!(all_good.status, HealthStatus::Healthy);

        let broker_down = HealthResponse::from_checks(
            "svc",
            "0.1.0",
            vec![
                HealthCheck::passing("database"),
                HealthCheck::degraded("rabbitmq", "channel disconnected"),
            ],
        );
        assert_eq!(broker_down.status, HealthStatus::Degraded);

        let db_down = HealthResponse::from_checks(
            "svc",
            "0.1.0",
            vec![
                HealthCheck::failing("database", "pool timed out"),
                HealthCheck::degraded("rabbitmq", "channel disconnected"),
            ],
        );
        assert_eq!(db_down.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn no_checks_reads_as_healthy() {
        let response = HealthResponse::from_checks("svc", "0.1.0", vec![]);
        assert_eq!(response.status, HealthStatus::Healthy);
    }
}
