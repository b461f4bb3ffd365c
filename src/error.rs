// API Client Error Types
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Where a failed call originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    // status 0: DNS, connection refused, timeout, cancellation
    Transport,

    // 4xx: caller-correctable
    Client,

    // 5xx: potentially transient
    Server,
}

/// Typed failure returned for every unsuccessful call.
///
/// HTTP-level failures never surface as panics or `Err` from the client
/// itself; they arrive as the `Err` side of an [`ApiResult`](crate::response::ApiResult).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub status: u16,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiFailure {
    /// Status used for failures that never produced an HTTP response
    pub const TRANSPORT_STATUS: u16 = 0;

    pub fn new(status: u16, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status,
            message: message.into(),
            details,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(Self::TRANSPORT_STATUS, message, None)
    }

    pub fn cancelled() -> Self {
        Self::transport("request cancelled")
    }

    /// Failure carrying only the canonical reason phrase for `status`
    pub fn from_status(status: u16) -> Self {
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown Status");
        Self::new(status, reason, None)
    }

    pub fn kind(&self) -> FailureKind {
        match self.status {
            0..=399 => FailureKind::Transport,
            400..=499 => FailureKind::Client,
            _ => FailureKind::Server,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == FailureKind::Transport
    }

    pub fn is_client_error(&self) -> bool {
        self.kind() == FailureKind::Client
    }

    pub fn is_server_error(&self) -> bool {
        self.kind() == FailureKind::Server
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Whether a caller's retry policy may reasonably try again
    pub fn is_transient(&self) -> bool {
        match self.kind() {
            FailureKind::Transport | FailureKind::Server => true,
            FailureKind::Client => false,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self.status {
            0 => "TRANSPORT_ERROR",
            400 => "BAD_REQUEST",
            401 => "UNAUTHORIZED",
            403 => "FORBIDDEN",
            404 => "NOT_FOUND",
            409 => "CONFLICT",
            422 => "UNPROCESSABLE_ENTITY",
            429 => "TOO_MANY_REQUESTS",
            500 => "INTERNAL_SERVER_ERROR",
            502 => "BAD_GATEWAY",
            503 => "SERVICE_UNAVAILABLE",
            504 => "GATEWAY_TIMEOUT",
            _ => match self.kind() {
                FailureKind::Client => "CLIENT_ERROR",
                FailureKind::Server => "SERVER_ERROR",
                FailureKind::Transport => "TRANSPORT_ERROR",
            },
        }
    }

    /// Convert to JSON for CLI output
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "success": false,
            "status": self.status,
            "error": self.message,
            "error_code": self.error_code(),
        });

        if let Some(details) = &self.details {
            response["details"] = details.clone();
        }

        response
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            FailureKind::Transport => write!(f, "transport error: {}", self.message),
            _ => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}

impl std::error::Error for ApiFailure {}

/// Programmer errors detected while composing a request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Request path must not be empty")]
    EmptyPath,

    #[error("Tenant slug must not be empty")]
    EmptyTenant,

    #[error("An explicit method is required when a body is present")]
    MethodRequired,

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to initialize HTTP client: {0}")]
    HttpClient(String),

    #[error("Request body could not be encoded: {0}")]
    InvalidBody(String),
}

/// Failures from the auth provider.
///
/// `Clone` because one refresh result is handed to every caller awaiting it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Auth provider unreachable: {0}")]
    Unreachable(String),

    #[error("Auth provider rejected refresh ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    #[error("No credentials configured")]
    NoCredentials,

    #[error("Token source misconfigured: {0}")]
    Misconfigured(String),
}

impl From<ApiFailure> for TokenError {
    fn from(failure: ApiFailure) -> Self {
        match failure.kind() {
            FailureKind::Transport => TokenError::Unreachable(failure.message),
            _ => TokenError::Rejected {
                status: failure.status,
                message: failure.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_boundaries() {
        assert_eq!(ApiFailure::transport("refused").kind(), FailureKind::Transport);
        assert_eq!(ApiFailure::from_status(400).kind(), FailureKind::Client);
        assert_eq!(ApiFailure::from_status(499).kind(), FailureKind::Client);
        assert_eq!(ApiFailure::from_status(500).kind(), FailureKind::Server);
        assert_eq!(ApiFailure::from_status(503).kind(), FailureKind::Server);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiFailure::transport("timeout").is_transient());
        assert!(ApiFailure::from_status(502).is_transient());
        assert!(!ApiFailure::from_status(404).is_transient());
        assert!(!ApiFailure::from_status(401).is_transient());
    }

    #[test]
    fn test_from_status_uses_reason_phrase() {
        let failure = ApiFailure::from_status(404);
        assert_eq!(failure.message, "Not Found");
        assert_eq!(failure.error_code(), "NOT_FOUND");
        assert_eq!(ApiFailure::from_status(418).error_code(), "CLIENT_ERROR");
    }

    #[test]
    fn test_to_json_includes_details() {
        let failure = ApiFailure::new(422, "Invalid booking", Some(json!({"seat": "taken"})));
        let body = failure.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], 422);
        assert_eq!(body["details"]["seat"], "taken");
    }

    #[test]
    fn test_token_error_from_failure() {
        let err: TokenError = ApiFailure::transport("connection refused").into();
        assert!(matches!(err, TokenError::Unreachable(_)));

        let err: TokenError = ApiFailure::from_status(403).into();
        assert_eq!(
            err,
            TokenError::Rejected {
                status: 403,
                message: "Forbidden".to_string()
            }
        );
    }
}
