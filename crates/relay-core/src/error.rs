//! Core error type.

use thiserror::Error;

/// Errors raised while building core values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Invalid role: {0:?}")]
    InvalidRole(String),
    #[error("Invalid message type: {0:?}")]
    InvalidMessageType(String),
    #[error("Progress total must be a positive finite number, got {0}")]
    InvalidTotal(f64),
}
