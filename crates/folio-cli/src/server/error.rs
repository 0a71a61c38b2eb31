//! HTTP error mapping.
//!
//! Clients only ever see [`DeskError::user_message`]; the full error goes to
//! the log.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use folio_engine::DeskError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Desk(#[from] DeskError),

    #[error("missing or invalid admin token")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Desk(e) => match e {
                DeskError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                DeskError::DocumentNotActionable(_) => (StatusCode::CONFLICT, "NOT_ACTIONABLE"),
                DeskError::AlreadySigned => (StatusCode::CONFLICT, "ALREADY_SIGNED"),
                DeskError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION")
                }
                DeskError::AmountMismatch { .. } => (StatusCode::CONFLICT, "AMOUNT_MISMATCH"),
                DeskError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                DeskError::TermsNotAccepted => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "TERMS_NOT_ACCEPTED")
                }
                DeskError::InvalidWebhook(_) => (StatusCode::BAD_REQUEST, "INVALID_WEBHOOK"),
                DeskError::Gateway(_) | DeskError::SessionCreationFailed(_) => {
                    (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR")
                }
                DeskError::NotificationFailed(_) => {
                    (StatusCode::BAD_GATEWAY, "NOTIFICATION_FAILED")
                }
                DeskError::Config(_)
                | DeskError::Credential(_)
                | DeskError::Render(_)
                | DeskError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        } else {
            tracing::debug!(error = %self, code, "request rejected");
        }
        let error = match &self {
            Self::Desk(e) => e.user_message(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error, code })).into_response()
    }
}
