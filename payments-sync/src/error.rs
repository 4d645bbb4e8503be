//! Error taxonomy for ingestion and reconciliation.

use reqwest::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure or non-2xx response from the remote API.
    #[error("Transport error: {message}")]
    Transport { message: String, transient: bool },

    /// The remote API rejected our credentials.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Unique `id` violated by a concurrent insert.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecord),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Report error: {0}")]
    Report(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A record lacking the nested structure a key extractor expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed record {record_id}: {reason}")]
pub struct MalformedRecord {
    pub record_id: String,
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(record_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            reason: reason.into(),
        }
    }
}

impl SyncError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transport { transient: true, .. })
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return SyncError::Auth(format!("API returned {}: {}", status, body));
        }
        SyncError::Transport {
            message: format!("API returned {}: {}", status, body),
            transient: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SyncError::Decode(err.to_string());
        }
        SyncError::Transport {
            transient: err.is_timeout() || err.is_connect() || err.is_request(),
            message: err.to_string(),
        }
    }
}

impl From<mongodb::error::Error> for SyncError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        let duplicate = match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
            ErrorKind::Command(command_error) => command_error.code == 11000,
            _ => false,
        };

        if duplicate {
            SyncError::DuplicateKey(err.to_string())
        } else {
            SyncError::Store(err.to_string())
        }
    }
}

impl From<mongodb::bson::ser::Error> for SyncError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Transport { message, .. } => AppError::Upstream(message),
            SyncError::Auth(message) => AppError::Upstream(message),
            SyncError::Decode(message) => AppError::Upstream(message),
            SyncError::DuplicateKey(message) => AppError::Conflict(anyhow::anyhow!(message)),
            SyncError::MalformedRecord(malformed) => AppError::BadRequest(anyhow::Error::new(malformed)),
            SyncError::Store(message) => AppError::Database(anyhow::anyhow!(message)),
            SyncError::Report(err) => AppError::Internal(anyhow::Error::new(err)),
            SyncError::Config(message) => AppError::Config(anyhow::anyhow!(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(SyncError::from_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(SyncError::from_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(!SyncError::from_status(StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[test]
    fn rejected_credentials_map_to_auth() {
        let err = SyncError::from_status(StatusCode::UNAUTHORIZED, "bad token");
        assert!(matches!(err, SyncError::Auth(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn app_error_mapping_keeps_status_semantics() {
        let app: AppError = SyncError::DuplicateKey("T1".to_string()).into();
        assert_eq!(app.status(), axum::http::StatusCode::CONFLICT);

        let app: AppError = SyncError::Auth("nope".to_string()).into();
        assert_eq!(app.status(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
