use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the dispatcher and the authority exchanges.
///
/// `Clone` so that one refresh outcome can be handed to every request
/// waiting on it.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Invalid login id or password")]
    InvalidCredentials,

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("Conflict ({code}): {message}")]
    Conflict { code: String, message: String },

    #[error("Refresh token rejected - sign in again")]
    InvalidRefreshToken,

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request timed out")]
    NetworkTimeout,

    #[error("Network error: {0}")]
    NetworkError(Arc<reqwest::Error>),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Field-level rejection reported by the authority's validation layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    pub field: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error envelope: `{success: false, code, message, errors}`
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<Vec<FieldError>>,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .message
            .clone()
            .unwrap_or_else(|| Self::truncate_body(body));

        match status.as_u16() {
            400 | 422 => ApiError::Validation {
                message,
                fields: parsed.errors.unwrap_or_default(),
            },
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict {
                code: parsed.code.unwrap_or_else(|| "CONFLICT".to_string()),
                message,
            },
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// Whether the authority rejected the credential attached to the request
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Whether the error ended the local session
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, ApiError::InvalidRefreshToken)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::NetworkTimeout
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::NetworkError(Arc::new(err))
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_unauthorized() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"code":"A004"}"#);
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_from_status_validation_with_fields() {
        let body = r#"{
            "success": false,
            "code": "C001",
            "message": "Invalid input",
            "errors": [{"field": "loginId", "value": "ab", "reason": "must be 4-20 characters"}]
        }"#;

        match ApiError::from_status(StatusCode::BAD_REQUEST, body) {
            ApiError::Validation { message, fields } => {
                assert_eq!(message, "Invalid input");
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "loginId");
                assert_eq!(fields[0].reason.as_deref(), Some("must be 4-20 characters"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_status_conflict_keeps_code() {
        let body = r#"{"success": false, "code": "U002", "message": "Login id already in use"}"#;

        match ApiError::from_status(StatusCode::CONFLICT, body) {
            ApiError::Conflict { code, message } => {
                assert_eq!(code, "U002");
                assert_eq!(message, "Login id already in use");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_from_status_plain_text_body() {
        match ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down") {
            ApiError::ServerError(message) => assert_eq!(message, "upstream down"),
            other => panic!("expected server error, got {:?}", other),
        }
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 520 total bytes"));

        assert_eq!(ApiError::truncate_body("short"), "short");
    }
}
