//! Payment Session Broker.
//!
//! Sessions are created against the invoice total and settled only from the
//! gateway's own report of the session, never from anything the browser
//! sends back. Settlement is a compare-and-set in the store, so repeated or
//! racing confirmations apply once and send one receipt.

use std::sync::Arc;

use folio_connect::{
    CheckoutRequest, CheckoutSession, PaymentGateway, SessionState, WebhookVerifier,
};
use folio_core::{
    AccessCredential, DeskConfig, Document, DocumentId, GatewayOutcome, PaymentFailure,
    PaymentRecord, PaymentStatus,
};
use folio_store::DocumentStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::access::AccessResolver;
use crate::clock::Clock;
use crate::error::DeskError;
use crate::notify::{NotificationDispatcher, Template};

/// Webhook outcome reported back to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub event_id: String,
    /// Status of the session after handling, when the event concerned one
    /// of ours.
    pub payment: Option<PaymentStatus>,
}

#[derive(Clone)]
pub struct PaymentBroker {
    access: AccessResolver,
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    config: Arc<DeskConfig>,
    verifier: Arc<WebhookVerifier>,
}

impl PaymentBroker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        access: AccessResolver,
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        config: Arc<DeskConfig>,
        verifier: Arc<WebhookVerifier>,
    ) -> Self {
        Self {
            access,
            store,
            gateway,
            notifications,
            clock,
            config,
            verifier,
        }
    }

    /// Open a checkout session for an invoice.
    pub async fn create_session(
        &self,
        id: &DocumentId,
        terms_accepted: bool,
    ) -> Result<CheckoutSession, DeskError> {
        let cancel_url = self.config.public_url("payments/cancelled");
        self.open_session(id, terms_accepted, cancel_url).await
    }

    /// Open a checkout session on behalf of the credential holder. A
    /// cancelled checkout returns the party to their document.
    pub async fn checkout(
        &self,
        credential: &str,
        terms_accepted: bool,
    ) -> Result<CheckoutSession, DeskError> {
        let doc = self.access.authorize(credential).await?;
        let doc = self.access.expire_if_due(doc).await?;
        let cancel_url = AccessCredential::parse(credential)
            .map(|c| self.config.payment_cancel_url(&c))
            .map_err(|_| DeskError::NotFound)?;
        self.open_session(&doc.id, terms_accepted, cancel_url).await
    }

    async fn open_session(
        &self,
        id: &DocumentId,
        terms_accepted: bool,
        cancel_url: String,
    ) -> Result<CheckoutSession, DeskError> {
        if !terms_accepted {
            return Err(DeskError::TermsNotAccepted);
        }
        let doc = self.store.get(id).await?;
        ensure_payable(&doc)?;
        let total = doc.totals().total;

        let request = CheckoutRequest {
            document_id: doc.id.clone(),
            reference: doc.reference.clone(),
            description: format!("{} {}: {}", doc.kind.label(), doc.reference, doc.title),
            customer_email: doc.party.email.clone(),
            amount: total,
            currency: doc.currency,
            success_url: self.config.payment_success_url(),
            cancel_url,
        };
        let session = self.gateway.create_checkout(&request).await.map_err(|e| {
            warn!(document_id = %doc.id, error = %e, "checkout session creation failed");
            DeskError::SessionCreationFailed(e)
        })?;

        let record = PaymentRecord::pending(&session.id, total, doc.currency, self.clock.now());
        self.store.open_payment(&doc.id, record).await?;
        info!(
            document_id = %doc.id,
            session_id = %session.id,
            amount = %total,
            "payment session opened"
        );
        Ok(session)
    }

    /// Settle a session from the gateway's authoritative state.
    ///
    /// A session that is still open comes back `pending` and can be
    /// confirmed again later. A capture that does not match the invoice
    /// total settles the record as failed and returns `AmountMismatch`.
    pub async fn confirm(&self, session_id: &str) -> Result<PaymentRecord, DeskError> {
        let id = self
            .store
            .find_payment(session_id)
            .await?
            .ok_or(DeskError::NotFound)?;
        let doc = self.store.get(&id).await?;
        if let Some(record) = doc.payment(session_id).filter(|r| r.is_settled()) {
            return settled(record.clone());
        }

        let state = self
            .gateway
            .session_state(session_id)
            .await
            .map_err(DeskError::Gateway)?;
        let outcome = match state {
            SessionState::Open => {
                info!(document_id = %id, session_id, "payment session still open");
                return doc
                    .payment(session_id)
                    .cloned()
                    .ok_or(DeskError::NotFound);
            }
            SessionState::Paid { amount, currency } => GatewayOutcome::Paid { amount, currency },
            SessionState::Failed { reason } => GatewayOutcome::Failed { reason },
            SessionState::Expired => GatewayOutcome::Failed {
                reason: "checkout session expired".into(),
            },
        };

        let settlement = self
            .store
            .settle_payment(session_id, outcome, self.clock.now())
            .await?;
        let payment = settlement.payment;
        if !settlement.applied {
            return settled(payment);
        }

        match (&payment.status, &payment.failure) {
            (PaymentStatus::Paid, _) => {
                info!(
                    document_id = %id,
                    session_id,
                    status = %settlement.document.status,
                    "payment settled"
                );
                let recipients = self
                    .notifications
                    .confirmation_recipients(&settlement.document);
                if let Err(e) = self
                    .notifications
                    .send_batch(&id, &Template::PaymentReceipt, &recipients)
                    .await
                {
                    warn!(document_id = %id, error = %e, "could not log payment receipt");
                }
            }
            (_, Some(failure @ PaymentFailure::DocumentNotActionable { .. })) => warn!(
                document_id = %id,
                session_id,
                %failure,
                "funds captured on a closed document; refund required"
            ),
            (_, failure) => warn!(
                document_id = %id,
                session_id,
                failure = ?failure,
                "payment settled as failed"
            ),
        }
        settled(payment)
    }

    /// Verify a gateway webhook and confirm the session it names.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookAck, DeskError> {
        let event = self
            .verifier
            .verify(signature_header, payload, self.clock.now())
            .inspect_err(|e| warn!(error = %e, "webhook rejected"))?;
        let mut ack = WebhookAck {
            event_id: event.id.clone(),
            payment: None,
        };
        let Some(session_id) = event
            .session_id
            .filter(|_| event.kind.starts_with("checkout.session."))
        else {
            info!(event_id = %event.id, kind = %event.kind, "webhook event ignored");
            return Ok(ack);
        };
        if self.store.find_payment(&session_id).await?.is_none() {
            warn!(event_id = %event.id, session_id, "webhook for unknown session");
            return Ok(ack);
        }
        ack.payment = match self.confirm(&session_id).await {
            Ok(record) => Some(record.status),
            Err(DeskError::AmountMismatch { .. }) => Some(PaymentStatus::Failed),
            Err(e) => return Err(e),
        };
        Ok(ack)
    }
}

fn ensure_payable(doc: &Document) -> Result<(), DeskError> {
    let reason = if !doc.kind.accepts_payment() {
        Some(format!("{} cannot be paid", doc.kind))
    } else if !doc.status.awaits_party() {
        Some(format!("invoice is {}", doc.status))
    } else if !doc.totals().total.is_positive() {
        Some("invoice total is zero".to_string())
    } else if doc.paid_payment().is_some() {
        Some("invoice is already paid".to_string())
    } else {
        None
    };
    match reason {
        Some(reason) => Err(DeskError::DocumentNotActionable(reason)),
        None => Ok(()),
    }
}

fn settled(record: PaymentRecord) -> Result<PaymentRecord, DeskError> {
    match record.failure {
        Some(PaymentFailure::AmountMismatch { expected, captured }) => {
            Err(DeskError::AmountMismatch { expected, captured })
        }
        _ => Ok(record),
    }
}
