//! Payment gateway boundary.

use async_trait::async_trait;
use folio_core::{Currency, DocumentId, Money};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    #[error("gateway did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("gateway returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// What the broker asks the gateway to charge. One line for the invoice
/// total; the gateway never sees individual line items.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub document_id: DocumentId,
    pub reference: String,
    pub description: String,
    pub customer_email: String,
    pub amount: Money,
    pub currency: Currency,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// The gateway's authoritative view of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not paid yet; the party may still complete it.
    Open,
    Paid { amount: Money, currency: String },
    Failed { reason: String },
    Expired,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn session_state(&self, session_id: &str) -> Result<SessionState, GatewayError>;
}

/// Stand-in when no gateway credentials are configured. Every call fails,
/// so invoices can be drafted and sent but not paid.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_checkout(
        &self,
        _request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        Err(GatewayError::Unavailable("no payment gateway configured".into()))
    }

    async fn session_state(&self, _session_id: &str) -> Result<SessionState, GatewayError> {
        Err(GatewayError::Unavailable("no payment gateway configured".into()))
    }
}
