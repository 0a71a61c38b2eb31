use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_core::{
    CredentialDigest, Document, DocumentId, GatewayOutcome, NotificationAttempt, PaymentRecord,
    SignatureRecord, Status,
};

use crate::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of settling a checkout session.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub document: Document,
    pub payment: PaymentRecord,
    /// `false` when the session had already been settled by an earlier call.
    pub applied: bool,
}

/// Every lifecycle write goes through here. Each call is atomic: it either
/// applies the whole change or leaves the stored document as it was.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: Document) -> StoreResult<()>;

    async fn get(&self, id: &DocumentId) -> StoreResult<Document>;

    /// All documents, newest first.
    async fn list(&self) -> StoreResult<Vec<Document>>;

    /// Look up the document holding this live credential. Revoked
    /// credentials do not match.
    async fn find_by_credential(&self, digest: &CredentialDigest)
    -> StoreResult<Option<Document>>;

    /// Replace the live credential, revoking the previous one.
    async fn issue_credential(
        &self,
        id: &DocumentId,
        digest: CredentialDigest,
        at: DateTime<Utc>,
    ) -> StoreResult<Document>;

    /// `draft -> sent` with the document's first credential. Fails with
    /// `InvalidTransition` once the document has left `draft`.
    async fn issue_first_credential(
        &self,
        id: &DocumentId,
        digest: CredentialDigest,
        at: DateTime<Utc>,
    ) -> StoreResult<Document>;

    /// `sent -> viewed`; a no-op in any other status.
    async fn mark_viewed(&self, id: &DocumentId, at: DateTime<Utc>) -> StoreResult<Document>;

    async fn transition(
        &self,
        id: &DocumentId,
        to: Status,
        at: DateTime<Utc>,
    ) -> StoreResult<Document>;

    /// Check-and-insert: at most one signature per document.
    async fn record_signature(
        &self,
        id: &DocumentId,
        record: SignatureRecord,
    ) -> StoreResult<Document>;

    /// Store a pending session. Session ids are unique across the store.
    async fn open_payment(&self, id: &DocumentId, record: PaymentRecord)
    -> StoreResult<Document>;

    async fn find_payment(&self, session_id: &str) -> StoreResult<Option<DocumentId>>;

    /// Compare-and-set on `status == pending`.
    async fn settle_payment(
        &self,
        session_id: &str,
        outcome: GatewayOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<Settlement>;

    async fn append_notification(
        &self,
        id: &DocumentId,
        attempt: NotificationAttempt,
    ) -> StoreResult<Document>;
}
