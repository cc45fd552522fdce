use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::handoff::HandoffFailure;

/// Failures raised by the NAV gateways and the payload builders.
///
/// `Transport` and `UnexpectedResponse` together form the remote-protocol
/// family: the first means the ERP rejected or never answered the call, the
/// second means it answered but not in the agreed shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    #[error("NAV transport failure: {0}")]
    Transport(String),

    #[error("unexpected NAV response: {0}")]
    UnexpectedResponse(String),

    #[error("Undefined contract type: {0}")]
    InvalidRequestType(u8),

    #[error("invalid credit request state: {0}")]
    InvalidRequestState(String),

    #[error("invalid NAV filter: {0}")]
    InvalidFilter(String),

    #[error("failed to encode NAV request: {0}")]
    Encoding(String),
}

impl NavError {
    /// True for failures that came back from (or never reached) the ERP.
    pub fn is_remote_protocol(&self) -> bool {
        matches!(
            self,
            NavError::Transport(_) | NavError::UnexpectedResponse(_)
        )
    }

    /// Stable code attached to every logged NAV failure.
    pub fn code(&self) -> &'static str {
        match self {
            NavError::Transport(_) => "REMOTE_PROTOCOL",
            NavError::UnexpectedResponse(_) => "REMOTE_PROTOCOL_UNEXPECTED_SHAPE",
            NavError::InvalidRequestType(_) => "INVALID_REQUEST_TYPE",
            NavError::InvalidRequestState(_) => "INVALID_REQUEST_STATE",
            NavError::InvalidFilter(_) => "INVALID_FILTER",
            NavError::Encoding(_) => "ENCODING",
        }
    }

    /// Logs the failure at the severity its kind calls for.
    pub fn log(&self, operation: &str) {
        match self {
            NavError::Transport(msg) => tracing::error!(
                alert = true,
                code = self.code(),
                operation,
                "NAV call failed: {}",
                msg
            ),
            NavError::UnexpectedResponse(msg) => tracing::error!(
                code = self.code(),
                operation,
                "NAV answered with unexpected shape: {}",
                msg
            ),
            other => tracing::warn!(
                code = other.code(),
                operation,
                "NAV call not issued: {}",
                other
            ),
        }
    }
}

/// Credit request status violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("unknown credit request status '{0}'")]
    UnknownStatus(String),

    #[error("transition from '{from}' to '{to}' is not allowed")]
    IllegalTransition { from: &'static str, to: &'static str },
}

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// The request conflicts with the current state of the record.
    Conflict(String),
    /// Error interacting with NAV outside of a handoff.
    ExternalApiError(String),
    /// A handoff ended in failure; carries the caller-facing message.
    HandoffFailed(String),
    /// Internal server error.
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::HandoffFailed(msg) => write!(f, "Handoff failed: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and JSON body.
    ///
    /// Handoff failures always answer 500 with the orchestrator's message,
    /// whatever the underlying kind was.
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "External service error".to_string(),
                )
            }
            AppError::HandoffFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<NavError> for AppError {
    fn from(err: NavError) -> Self {
        match err {
            NavError::InvalidRequestState(msg) => AppError::Conflict(msg),
            NavError::InvalidRequestType(_) | NavError::InvalidFilter(_) => {
                AppError::BadRequest(err.to_string())
            }
            other => AppError::ExternalApiError(other.to_string()),
        }
    }
}

impl From<StatusError> for AppError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::UnknownStatus(_) => AppError::BadRequest(err.to_string()),
            StatusError::IllegalTransition { .. } => AppError::Conflict(err.to_string()),
        }
    }
}

impl From<HandoffFailure> for AppError {
    fn from(failure: HandoffFailure) -> Self {
        AppError::HandoffFailed(failure.message().to_string())
    }
}
