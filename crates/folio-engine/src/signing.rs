//! Signature Capture.
//!
//! A signature is a typed name plus explicit consent, bound to whoever holds
//! the credential. The at-most-once check and the insert happen in one store
//! call, so of two racing signers exactly one wins.

use std::sync::Arc;

use folio_core::{SignatureRecord, ValidationError};
use folio_store::DocumentStore;
use serde::Deserialize;
use tracing::{info, warn};

use crate::access::AccessResolver;
use crate::clock::Clock;
use crate::error::DeskError;
use crate::notify::{NotificationDispatcher, Template};

const MAX_SIGNER_NAME: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct SignRequest {
    pub signer_name: String,
    #[serde(default)]
    pub consent: bool,
    /// Filled in by the transport, never by the party.
    #[serde(skip)]
    pub signer_ip: Option<String>,
}

#[derive(Clone)]
pub struct SignatureCapture {
    access: AccessResolver,
    store: Arc<dyn DocumentStore>,
    notifications: NotificationDispatcher,
    clock: Arc<dyn Clock>,
}

impl SignatureCapture {
    pub fn new(
        access: AccessResolver,
        store: Arc<dyn DocumentStore>,
        notifications: NotificationDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            access,
            store,
            notifications,
            clock,
        }
    }

    pub async fn sign(
        &self,
        credential: &str,
        request: SignRequest,
    ) -> Result<SignatureRecord, DeskError> {
        let doc = self.access.authorize(credential).await?;

        let signer_name = request.signer_name.trim();
        if signer_name.is_empty() {
            return Err(ValidationError::new("signer_name", "please type your full name").into());
        }
        if signer_name.chars().count() > MAX_SIGNER_NAME {
            return Err(ValidationError::new("signer_name", "name is too long").into());
        }
        if !request.consent {
            return Err(ValidationError::new("consent", "consent must be given to sign").into());
        }

        // Kind, terminal status, prior signature and awaiting status are
        // checked in that order by the store's check-and-insert.
        let doc = self.access.expire_if_due(doc).await?;
        let record = SignatureRecord {
            signer_name: signer_name.to_string(),
            accepted_at: self.clock.now(),
            consent_given: true,
            signer_ip: request.signer_ip,
        };
        let doc = self.store.record_signature(&doc.id, record.clone()).await?;
        info!(
            document_id = %doc.id,
            kind = %doc.kind,
            status = %doc.status,
            "signature captured"
        );

        let recipients = self.notifications.confirmation_recipients(&doc);
        if let Err(e) = self
            .notifications
            .send_batch(&doc.id, &Template::SignatureConfirmation, &recipients)
            .await
        {
            warn!(document_id = %doc.id, error = %e, "could not log signature confirmation");
        }
        Ok(record)
    }
}
