use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to HTTP callers and to the CLI exit path.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    /// Another run holds a resource the request needs.
    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    /// A remote dependency failed or answered with something unusable.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Database(anyhow::Error::new(err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::Upstream(_) => "upstream_failure",
            AppError::Database(_) => "database_error",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Client-caused errors echo their message; server-side ones keep the
        // cause in `details` and log it.
        let (error, details) = match self {
            AppError::BadRequest(err) | AppError::Conflict(err) => (err.to_string(), None),
            AppError::Upstream(msg) => ("Upstream failure".to_string(), Some(msg)),
            AppError::Database(err) => ("Database error".to_string(), Some(err.to_string())),
            AppError::Config(err) => ("Configuration error".to_string(), Some(err.to_string())),
            AppError::Internal(err) => ("Internal server error".to_string(), Some(format!("{:#}", err))),
        };

        if status.is_server_error() {
            tracing::error!(code, details = details.as_deref().unwrap_or_default(), "{}", error);
        }

        (status, Json(ErrorBody { code, error, details })).into_response()
    }
}
