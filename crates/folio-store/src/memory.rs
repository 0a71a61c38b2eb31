//! In-memory document store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_core::{
    CredentialDigest, Document, DocumentId, GatewayOutcome, LifecycleError, NotificationAttempt,
    PaymentRecord, SignatureRecord, Status,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{DocumentStore, Settlement, StoreResult};
use crate::StoreError;

#[derive(Debug, Default)]
struct Tables {
    documents: HashMap<DocumentId, Document>,
    credentials: HashMap<CredentialDigest, DocumentId>,
    sessions: HashMap<String, DocumentId>,
}

/// Holds everything behind one lock so a mutation and its index updates
/// land together. Each write edits a clone and stores it only on success.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn update<T>(
        &mut self,
        id: &DocumentId,
        apply: impl FnOnce(&mut Document) -> Result<T, LifecycleError>,
    ) -> StoreResult<(Document, T)> {
        let current = self
            .documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut working = current.clone();
        let out = apply(&mut working)?;
        self.documents.insert(id.clone(), working.clone());
        Ok((working, out))
    }

    /// Apply `issue` and swap the credential index from the old digest to
    /// the new one.
    fn install_credential(
        &mut self,
        id: &DocumentId,
        digest: CredentialDigest,
        issue: impl FnOnce(&mut Document, CredentialDigest) -> Result<(), LifecycleError>,
    ) -> StoreResult<Document> {
        let (doc, previous) = self.update(id, |doc| {
            let previous = doc.credential.clone();
            issue(doc, digest.clone())?;
            Ok(previous)
        })?;
        if let Some(previous) = previous {
            self.credentials.remove(&previous);
        }
        self.credentials.insert(digest, id.clone());
        Ok(doc)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, document: Document) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(digest) = &document.credential {
            tables.credentials.insert(digest.clone(), document.id.clone());
        }
        for payment in &document.payments {
            tables
                .sessions
                .insert(payment.gateway_session_id.clone(), document.id.clone());
        }
        debug!(document_id = %document.id, kind = %document.kind, "inserted document");
        tables.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn get(&self, id: &DocumentId) -> StoreResult<Document> {
        let tables = self.tables.read().await;
        tables
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<Document>> {
        let tables = self.tables.read().await;
        let mut docs: Vec<Document> = tables.documents.values().cloned().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn find_by_credential(
        &self,
        digest: &CredentialDigest,
    ) -> StoreResult<Option<Document>> {
        let tables = self.tables.read().await;
        Ok(tables
            .credentials
            .get(digest)
            .and_then(|id| tables.documents.get(id))
            .cloned())
    }

    async fn issue_credential(
        &self,
        id: &DocumentId,
        digest: CredentialDigest,
        at: DateTime<Utc>,
    ) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        tables.install_credential(id, digest, |doc, digest| doc.issue_credential(digest, at))
    }

    async fn issue_first_credential(
        &self,
        id: &DocumentId,
        digest: CredentialDigest,
        at: DateTime<Utc>,
    ) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        tables.install_credential(id, digest, |doc, digest| {
            doc.issue_first_credential(digest, at)
        })
    }

    async fn mark_viewed(&self, id: &DocumentId, at: DateTime<Utc>) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        let (doc, _) = tables.update(id, |doc| Ok(doc.mark_viewed(at)))?;
        Ok(doc)
    }

    async fn transition(
        &self,
        id: &DocumentId,
        to: Status,
        at: DateTime<Utc>,
    ) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        let (doc, _) = tables.update(id, |doc| doc.transition(to, at))?;
        Ok(doc)
    }

    async fn record_signature(
        &self,
        id: &DocumentId,
        record: SignatureRecord,
    ) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        let (doc, _) = tables.update(id, |doc| doc.attach_signature(record))?;
        Ok(doc)
    }

    async fn open_payment(
        &self,
        id: &DocumentId,
        record: PaymentRecord,
    ) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        let session_id = record.gateway_session_id.clone();
        if tables.sessions.contains_key(&session_id) {
            return Err(LifecycleError::DuplicateSession(session_id).into());
        }
        let (doc, _) = tables.update(id, |doc| doc.open_payment(record))?;
        tables.sessions.insert(session_id, id.clone());
        Ok(doc)
    }

    async fn find_payment(&self, session_id: &str) -> StoreResult<Option<DocumentId>> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(session_id).cloned())
    }

    async fn settle_payment(
        &self,
        session_id: &str,
        outcome: GatewayOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<Settlement> {
        let mut tables = self.tables.write().await;
        let id = tables
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        let (document, settled) =
            tables.update(&id, |doc| doc.settle_payment(session_id, outcome, at))?;
        Ok(Settlement {
            applied: settled.was_applied(),
            payment: settled.record().clone(),
            document,
        })
    }

    async fn append_notification(
        &self,
        id: &DocumentId,
        attempt: NotificationAttempt,
    ) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        let (doc, _) = tables.update(id, |doc| {
            doc.append_notification(attempt);
            Ok(())
        })?;
        Ok(doc)
    }
}
