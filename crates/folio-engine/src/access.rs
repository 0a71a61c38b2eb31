//! Access Credential Resolver.
//!
//! Credentials arrive from unauthenticated parties. Malformed input is
//! rejected before any lookup, and every failure looks the same to the
//! caller: `NotFound`.

use std::sync::Arc;

use folio_core::{AccessCredential, Document, DocumentId, LifecycleError, Status};
use folio_store::{DocumentStore, StoreError};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::DeskError;

#[derive(Clone)]
pub struct AccessResolver {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl AccessResolver {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Mint a credential for the document, revoking any previous one. A
    /// draft moves to `sent`. The plaintext is returned once and never
    /// stored.
    pub async fn issue(&self, id: &DocumentId) -> Result<(Document, AccessCredential), DeskError> {
        let credential = AccessCredential::generate()?;
        let doc = self
            .store
            .issue_credential(id, credential.digest(), self.clock.now())
            .await?;
        Self::log_issued(&doc, &credential);
        Ok((doc, credential))
    }

    /// Mint the first credential of a draft. Fails with `InvalidTransition`
    /// if the document was sent already, leaving its live link untouched.
    pub async fn issue_first(
        &self,
        id: &DocumentId,
    ) -> Result<(Document, AccessCredential), DeskError> {
        let credential = AccessCredential::generate()?;
        let doc = self
            .store
            .issue_first_credential(id, credential.digest(), self.clock.now())
            .await?;
        Self::log_issued(&doc, &credential);
        Ok((doc, credential))
    }

    fn log_issued(doc: &Document, credential: &AccessCredential) {
        info!(
            document_id = %doc.id,
            kind = %doc.kind,
            status = %doc.status,
            credential = %credential.digest(),
            "access credential issued"
        );
    }

    /// Resolve a credential for display. The first resolve of a `sent`
    /// document records the view; an open document past its expiry is
    /// expired on the spot.
    pub async fn resolve(&self, raw: &str) -> Result<Document, DeskError> {
        let doc = self.authorize(raw).await?;
        let doc = self.expire_if_due(doc).await?;
        if doc.status != Status::Sent {
            return Ok(doc);
        }
        let doc = self.store.mark_viewed(&doc.id, self.clock.now()).await?;
        info!(document_id = %doc.id, status = %doc.status, "document viewed");
        Ok(doc)
    }

    /// Same lookup as [`resolve`](Self::resolve) with no side effects.
    pub async fn authorize(&self, raw: &str) -> Result<Document, DeskError> {
        let Ok(credential) = AccessCredential::parse(raw) else {
            debug!("malformed credential rejected");
            return Err(DeskError::NotFound);
        };
        self.store
            .find_by_credential(&credential.digest())
            .await?
            .ok_or(DeskError::NotFound)
    }

    /// Move an awaiting document past its `expires_at` to `expired`.
    pub(crate) async fn expire_if_due(&self, doc: Document) -> Result<Document, DeskError> {
        let now = self.clock.now();
        if !(doc.status.awaits_party() && doc.is_past_expiry(now)) {
            return Ok(doc);
        }
        match self.store.transition(&doc.id, Status::Expired, now).await {
            Ok(doc) => {
                info!(document_id = %doc.id, "document expired");
                Ok(doc)
            }
            // Someone else moved it first; report whatever it is now.
            Err(StoreError::Lifecycle(LifecycleError::InvalidTransition { .. })) => {
                Ok(self.store.get(&doc.id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}
