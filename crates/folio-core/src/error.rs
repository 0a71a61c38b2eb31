use thiserror::Error;

use crate::document::DocumentKind;
use crate::status::Status;

/// A lifecycle rule rejected an operation. The document is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("{kind} in status {status} does not accept {operation}")]
    NotActionable {
        kind: DocumentKind,
        status: Status,
        operation: &'static str,
    },

    #[error("document is already signed")]
    AlreadySigned,

    #[error("payment session already recorded: {0}")]
    DuplicateSession(String),

    #[error("unknown payment session: {0}")]
    UnknownSession(String),
}

/// Input to a protocol failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}
