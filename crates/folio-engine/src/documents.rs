//! Admin-side document lifecycle: create, send, re-issue, cancel, complete
//! and the expiry sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_core::{
    AccessCredential, DeskConfig, Document, DocumentId, LifecycleError, NewDocument,
    NotificationAttempt, NotificationOutcome, Status,
};
use folio_store::{DocumentStore, StoreError};
use tracing::{info, warn};

use crate::access::AccessResolver;
use crate::clock::Clock;
use crate::error::DeskError;
use crate::notify::{NotificationDispatcher, Template};

/// A freshly issued document. `credential` and `link` are the only copies
/// of the plaintext; they are not recoverable later.
#[derive(Debug, Clone)]
pub struct Issued {
    pub document: Document,
    pub credential: AccessCredential,
    pub link: String,
    pub notification: NotificationAttempt,
}

#[derive(Clone)]
pub struct DocumentService {
    access: AccessResolver,
    store: Arc<dyn DocumentStore>,
    notifications: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    config: Arc<DeskConfig>,
}

impl DocumentService {
    pub fn new(
        access: AccessResolver,
        store: Arc<dyn DocumentStore>,
        notifications: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        config: Arc<DeskConfig>,
    ) -> Self {
        Self {
            access,
            store,
            notifications,
            clock,
            config,
        }
    }

    pub async fn create(&self, new: NewDocument) -> Result<Document, DeskError> {
        let doc = Document::create(new, self.clock.now())?;
        self.store.insert(doc.clone()).await?;
        info!(
            document_id = %doc.id,
            kind = %doc.kind,
            reference = %doc.reference,
            total = %doc.totals().total,
            "document created"
        );
        Ok(doc)
    }

    pub async fn get(&self, id: &DocumentId) -> Result<Document, DeskError> {
        Ok(self.store.get(id).await?)
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<Document>, DeskError> {
        Ok(self.store.list().await?)
    }

    /// Issue the first credential for a draft and email the link.
    pub async fn send(&self, id: &DocumentId) -> Result<Issued, DeskError> {
        let minted = self.access.issue_first(id).await?;
        self.deliver(minted, |link| Template::DocumentIssued { link }).await
    }

    /// Replace the credential of an open document and email the new link.
    /// Earlier links stop resolving.
    pub async fn reissue(&self, id: &DocumentId) -> Result<Issued, DeskError> {
        let minted = self.access.issue(id).await?;
        self.deliver(minted, |link| Template::DocumentIssued { link }).await
    }

    /// Nudge the party about a document still awaiting them. The plaintext
    /// of the current link is not kept, so a reminder carries a new one.
    pub async fn remind(&self, id: &DocumentId) -> Result<Issued, DeskError> {
        let doc = self.store.get(id).await?;
        if !doc.status.awaits_party() {
            return Err(DeskError::DocumentNotActionable(format!(
                "cannot remind about a {} document",
                doc.status
            )));
        }
        let minted = self.access.issue(id).await?;
        let issued = self.deliver(minted, |link| Template::Reminder { link }).await?;
        if issued.notification.outcome == NotificationOutcome::Failed {
            return Err(DeskError::NotificationFailed(
                issued
                    .notification
                    .error_detail
                    .unwrap_or_else(|| "delivery failed".into()),
            ));
        }
        Ok(issued)
    }

    pub async fn cancel(&self, id: &DocumentId) -> Result<Document, DeskError> {
        let doc = self
            .store
            .transition(id, Status::Cancelled, self.clock.now())
            .await?;
        if doc.paid_payment().is_some() {
            warn!(document_id = %id, "paid document cancelled; refund is a manual step");
        }
        info!(document_id = %id, kind = %doc.kind, status = %doc.status, "document cancelled");
        Ok(doc)
    }

    /// Close a signed quote or contract, or a paid invoice.
    pub async fn complete(&self, id: &DocumentId) -> Result<Document, DeskError> {
        let doc = self
            .store
            .transition(id, Status::Completed, self.clock.now())
            .await?;
        info!(document_id = %id, kind = %doc.kind, status = %doc.status, "document completed");
        Ok(doc)
    }

    /// Expire every open document whose `expires_at` is at or before `now`.
    /// Returns the ids that were expired by this sweep.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<DocumentId>, DeskError> {
        let mut expired = Vec::new();
        for doc in self.store.list().await? {
            let open = doc.status == Status::Draft || doc.status.awaits_party();
            if !open || !doc.is_past_expiry(now) {
                continue;
            }
            match self.store.transition(&doc.id, Status::Expired, now).await {
                Ok(_) => {
                    info!(document_id = %doc.id, kind = %doc.kind, "document expired");
                    expired.push(doc.id);
                }
                // Moved on since the listing.
                Err(StoreError::Lifecycle(LifecycleError::InvalidTransition { .. })) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(expired)
    }

    /// Email a freshly minted link to the party.
    async fn deliver(
        &self,
        (document, credential): (Document, AccessCredential),
        template: impl FnOnce(String) -> Template,
    ) -> Result<Issued, DeskError> {
        let id = document.id.clone();
        let link = self.config.document_link(&credential);
        let notification = self
            .notifications
            .send(&id, &template(link.clone()), &document.party.email)
            .await?;
        // Reload so the returned record includes the notification.
        let document = self.store.get(&id).await?;
        Ok(Issued {
            document,
            credential,
            link,
            notification,
        })
    }
}
