use serde::Deserialize;
use thiserror::Error;

use crate::utils::truncate_string;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Validation failure: bad captcha, malformed fields, wrong credentials.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflicting data, e.g. username or email already registered.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out")]
    Timeout,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape used by the backend: `{"message": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    /// Pull the backend's `message` out of an error body, or fall back to
    /// the (truncated) raw body.
    fn extract_message(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => parsed.message,
            Err(_) => truncate_string(body.trim(), MAX_ERROR_BODY_LENGTH),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        match status.as_u16() {
            400 | 422 => ApiError::BadRequest(message),
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            code => ApiError::Status { status: code, message },
        }
    }

    /// True when the backend rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// True for failures that never reached a backend verdict.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::NetworkError(_) | ApiError::Timeout | ApiError::InvalidResponse(_)
        )
    }

    /// Message suitable for showing to the user. Prefers the backend's own
    /// message and falls back to a per-status default.
    pub fn user_message(&self) -> String {
        fn or_default(message: &str, default: &str) -> String {
            if message.is_empty() {
                default.to_string()
            } else {
                message.to_string()
            }
        }

        match self {
            ApiError::BadRequest(m) => or_default(m, "Invalid request parameters"),
            ApiError::Unauthorized(m) => or_default(m, "Session expired, please log in again"),
            ApiError::AccessDenied(m) => or_default(m, "Access denied"),
            ApiError::NotFound(m) => or_default(m, "Not found"),
            ApiError::Conflict(m) => {
                or_default(m, "Data conflict (username or email may already exist)")
            }
            ApiError::RateLimited => "Too many requests, please wait and try again".to_string(),
            ApiError::ServerError(m) => or_default(m, "Server error"),
            ApiError::Status { status, message } => {
                or_default(message, &format!("Request failed ({})", status))
            }
            ApiError::NetworkError(_) => "Network error, unable to reach the server".to_string(),
            ApiError::InvalidResponse(_) => "Unexpected response from the server".to_string(),
            ApiError::Timeout => "Connection timed out. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_extracts_backend_message() {
        let err = ApiError::from_status(StatusCode::CONFLICT, r#"{"message":"username taken"}"#);
        assert!(matches!(err, ApiError::Conflict(ref m) if m == "username taken"));
        assert_eq!(err.user_message(), "username taken");
    }

    #[test]
    fn test_from_status_maps_codes() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "{}"),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, ""),
            ApiError::Status { status: 418, .. }
        ));
    }

    #[test]
    fn test_user_message_defaults_when_backend_silent() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.user_message(), "Session expired, please log in again");

        let err = ApiError::from_status(StatusCode::IM_A_TEAPOT, "");
        assert_eq!(err.user_message(), "Request failed (418)");
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            ApiError::ServerError(m) => assert_eq!(m.chars().count(), MAX_ERROR_BODY_LENGTH),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
