use folio_connect::{GatewayError, WebhookError};
use folio_core::{
    ConfigError, CredentialError, LifecycleError, Money, RenderError, Status, ValidationError,
};
use folio_store::StoreError;
use thiserror::Error;

/// Everything a protocol can report to its caller.
#[derive(Debug, Error)]
pub enum DeskError {
    #[error("not found")]
    NotFound,

    #[error("document not actionable: {0}")]
    DocumentNotActionable(String),

    #[error("document is already signed")]
    AlreadySigned,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("terms were not accepted")]
    TermsNotAccepted,

    #[error("amount mismatch: expected {expected}, captured {captured}")]
    AmountMismatch { expected: Money, captured: Money },

    #[error("payment gateway error: {0}")]
    Gateway(#[source] GatewayError),

    #[error("payment session creation failed: {0}")]
    SessionCreationFailed(#[source] GatewayError),

    #[error("notification failed: {0}")]
    NotificationFailed(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("invalid webhook: {0}")]
    InvalidWebhook(#[from] WebhookError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("storage error: {0}")]
    Store(#[source] StoreError),
}

impl DeskError {
    /// Text that is safe to show an external party. Internal detail
    /// (gateway bodies, SQL errors) never appears here.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound => "This link is invalid or has been replaced.".into(),
            Self::DocumentNotActionable(_) => {
                "This document can no longer be signed or paid.".into()
            }
            Self::AlreadySigned => "This document has already been signed.".into(),
            Self::Validation(e) => e.to_string(),
            Self::TermsNotAccepted => "Please accept the terms before paying.".into(),
            Self::AmountMismatch { .. } => {
                "The payment did not match the invoice total. We have been notified and will be in touch.".into()
            }
            Self::Gateway(_) | Self::SessionCreationFailed(_) => {
                "The payment provider is unavailable right now. Please try again.".into()
            }
            Self::NotificationFailed(_) => "We could not send the email. Please try again.".into(),
            Self::InvalidTransition { .. } => {
                "That action is not allowed in the document's current state.".into()
            }
            Self::InvalidWebhook(_) => "Invalid webhook.".into(),
            Self::Config(_) | Self::Credential(_) | Self::Render(_) | Self::Store(_) => {
                "Something went wrong. Please try again.".into()
            }
        }
    }
}

impl From<LifecycleError> for DeskError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            LifecycleError::NotActionable { .. } => Self::DocumentNotActionable(e.to_string()),
            LifecycleError::AlreadySigned => Self::AlreadySigned,
            LifecycleError::UnknownSession(_) => Self::NotFound,
            LifecycleError::DuplicateSession(_) => Self::Store(StoreError::Lifecycle(e)),
        }
    }
}

impl From<StoreError> for DeskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::Lifecycle(inner) => inner.into(),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::DocumentKind;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let e: DeskError = StoreError::NotFound("x".into()).into();
        assert!(matches!(e, DeskError::NotFound));

        let e: DeskError = StoreError::Lifecycle(LifecycleError::AlreadySigned).into();
        assert!(matches!(e, DeskError::AlreadySigned));

        let e: DeskError = StoreError::Lifecycle(LifecycleError::NotActionable {
            kind: DocumentKind::Contract,
            status: Status::Cancelled,
            operation: "signature",
        })
        .into();
        assert!(matches!(e, DeskError::DocumentNotActionable(_)));
    }

    #[test]
    fn user_messages_hide_internal_detail() {
        let e = DeskError::Gateway(GatewayError::Server {
            status: 500,
            body: "sk_live_secret stack trace".into(),
        });
        assert!(!e.user_message().contains("sk_live"));
        let e = DeskError::Store(StoreError::Other("SELECT * FROM documents".into()));
        assert!(!e.user_message().contains("SELECT"));
    }
}
