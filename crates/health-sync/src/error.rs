//! Error types for the health sync crate.

use migraineme_core::sync::{classify_http_status, SyncRetryClass};
use thiserror::Error;

/// Result type alias for health sync operations.
pub type Result<T> = std::result::Result<T, HealthSyncError>;

/// Errors that can occur while moving records between the health source and the backend.
#[derive(Debug, Error)]
pub enum HealthSyncError {
    /// HTTP transport error (connect failure, timeout, reset)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the backend or the health source
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Request that can never succeed as built (malformed payload, bad header value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or rejected session
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Local outbox or checkpoint failure
    #[error("Storage error: {0}")]
    Storage(#[from] migraineme_core::Error),
}

impl HealthSyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => SyncRetryClass::Retryable,
            Self::Json(_) => SyncRetryClass::Permanent,
            Self::InvalidRequest(_) => SyncRetryClass::Permanent,
            Self::Auth(_) => SyncRetryClass::ReauthRequired,
            Self::Storage(_) => SyncRetryClass::Retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = HealthSyncError::api(401, "JWT expired");
        assert_eq!(err.retry_class(), SyncRetryClass::ReauthRequired);
        assert_eq!(
            HealthSyncError::auth("no session").retry_class(),
            SyncRetryClass::ReauthRequired
        );
    }

    #[test]
    fn client_errors_are_permanent_and_server_errors_retry() {
        assert_eq!(
            HealthSyncError::api(422, "invalid input").retry_class(),
            SyncRetryClass::Permanent
        );
        assert_eq!(
            HealthSyncError::api(502, "bad gateway").retry_class(),
            SyncRetryClass::Retryable
        );
        assert_eq!(
            HealthSyncError::invalid_request("payload").retry_class(),
            SyncRetryClass::Permanent
        );
    }
}
