//! Error types for request handling.

use axum::http::{HeaderValue, StatusCode, header};
use relay_auth::AuthError;
use relay_core::{Message, MessageType};
use relay_session::SessionError;
use serde_json::json;
use thiserror::Error;

use crate::RelayResponse;

/// Failure raised by a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("Handler panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Create a handler failure from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Request handling error.
///
/// Every variant becomes a structured response; none of them is fatal to
/// the server.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Missing authentication token")]
    MissingToken,
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("No handler registered for message type: {0}")]
    NoHandler(MessageType),
    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl RelayError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NoHandler(_) => StatusCode::NOT_FOUND,
            Self::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Session(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::Authentication(AuthError::TokenNotFound) => "token_not_found",
            Self::Authentication(AuthError::TokenExpired(_)) => "token_expired",
            Self::Validation(_) => "validation_error",
            Self::NoHandler(_) => "no_handler",
            Self::Handler(_) => "handler_error",
            Self::Session(_) => "session_limit",
        }
    }

    /// Render as a response.
    ///
    /// A missing handler answers with an assistant message explaining it;
    /// everything else uses `{"error", "code"}`.
    #[must_use]
    pub fn into_response(self) -> RelayResponse {
        let status = self.status();
        let body = match &self {
            Self::NoHandler(_) => Message::assistant(self.to_string()).to_json(),
            _ => json!({ "error": self.to_string(), "code": self.code() }),
        };
        let mut response = RelayResponse::json(status, body);
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
