//! DuckDB document store.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::{Connection, params};
use folio_core::{
    CredentialDigest, Currency, Document, DocumentId, GatewayOutcome, LifecycleError, LineItem,
    Money, NotificationAttempt, Party, PaymentFailure, PaymentRecord, SignatureRecord, Status,
    StatusTransition, TaxRate,
};
use tracing::{debug, info};

use crate::StoreError;
use crate::store::{DocumentStore, Settlement, StoreResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id VARCHAR PRIMARY KEY,
    kind VARCHAR NOT NULL,
    reference VARCHAR NOT NULL,
    title VARCHAR NOT NULL,
    party_name VARCHAR NOT NULL,
    party_email VARCHAR NOT NULL,
    party_company VARCHAR,
    party_phone VARCHAR,
    party_address VARCHAR,
    tax_rate_bp BIGINT NOT NULL,
    currency VARCHAR NOT NULL,
    terms VARCHAR,
    status VARCHAR NOT NULL,
    created_at VARCHAR NOT NULL,
    updated_at VARCHAR NOT NULL,
    issued_at VARCHAR,
    expires_at VARCHAR,
    due_date VARCHAR
);
CREATE TABLE IF NOT EXISTS line_items (
    document_id VARCHAR NOT NULL,
    position BIGINT NOT NULL,
    description VARCHAR NOT NULL,
    quantity BIGINT NOT NULL,
    unit_price_minor BIGINT NOT NULL,
    PRIMARY KEY (document_id, position)
);
CREATE TABLE IF NOT EXISTS credentials (
    digest VARCHAR PRIMARY KEY,
    document_id VARCHAR NOT NULL,
    issued_at VARCHAR NOT NULL,
    revoked_at VARCHAR
);
CREATE TABLE IF NOT EXISTS transitions (
    document_id VARCHAR NOT NULL,
    seq BIGINT NOT NULL,
    from_status VARCHAR NOT NULL,
    to_status VARCHAR NOT NULL,
    at VARCHAR NOT NULL,
    PRIMARY KEY (document_id, seq)
);
CREATE TABLE IF NOT EXISTS signatures (
    document_id VARCHAR PRIMARY KEY,
    signer_name VARCHAR NOT NULL,
    accepted_at VARCHAR NOT NULL,
    consent_given BOOLEAN NOT NULL,
    signer_ip VARCHAR
);
CREATE TABLE IF NOT EXISTS payments (
    gateway_session_id VARCHAR PRIMARY KEY,
    document_id VARCHAR NOT NULL,
    seq BIGINT NOT NULL,
    status VARCHAR NOT NULL,
    amount_expected BIGINT NOT NULL,
    amount_captured BIGINT,
    currency VARCHAR NOT NULL,
    created_at VARCHAR NOT NULL,
    paid_at VARCHAR,
    failure VARCHAR
);
CREATE TABLE IF NOT EXISTS notifications (
    document_id VARCHAR NOT NULL,
    seq BIGINT NOT NULL,
    recipient VARCHAR NOT NULL,
    subject VARCHAR NOT NULL,
    template VARCHAR NOT NULL,
    sent_at VARCHAR NOT NULL,
    outcome VARCHAR NOT NULL,
    error_detail VARCHAR,
    provider_message_id VARCHAR,
    PRIMARY KEY (document_id, seq)
);
";

/// DuckDB-backed [`DocumentStore`].
///
/// One row per document in `documents`, child rows for everything a
/// document owns. Totals are never stored. Each trait call loads the
/// document, applies the lifecycle rule from `folio-core`, and writes the
/// difference inside one transaction; the primary keys on `signatures` and
/// `payments` back up the at-most-once rules.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and
/// [`open_persistent`](Self::open_persistent) for a database file.
pub struct DuckStore {
    conn: Arc<Mutex<Connection>>,
}

/// Aggregates for the admin `report` command.
pub struct LedgerReport {
    /// `(kind, status, documents)`
    pub by_status: Vec<RecordBatch>,
    /// `(currency, payments, captured_minor)` over paid sessions.
    pub revenue: Vec<RecordBatch>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), documents = store.document_count()?, "opened document store");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("duckdb connection lock poisoned".into()))
    }

    pub fn document_count(&self) -> Result<usize, StoreError> {
        let batches = self.query_arrow("SELECT count(*)::BIGINT AS cnt FROM documents")?;
        let batch = batches
            .first()
            .ok_or_else(|| StoreError::Other("count returned no rows".into()))?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    /// Document counts by kind and status, and captured revenue by currency.
    pub fn ledger_report(&self) -> Result<LedgerReport, StoreError> {
        let by_status = self.query_arrow(
            "SELECT kind, status, count(*)::BIGINT AS documents
             FROM documents
             GROUP BY kind, status
             ORDER BY kind, status",
        )?;
        let revenue = self.query_arrow(
            "SELECT currency, count(*)::BIGINT AS payments,
                    sum(amount_captured)::BIGINT AS captured_minor
             FROM payments
             WHERE status = 'paid'
             GROUP BY currency
             ORDER BY currency",
        )?;
        Ok(LedgerReport { by_status, revenue })
    }

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    /// Run `work` against the connection on the blocking pool, so DuckDB
    /// never stalls a runtime worker.
    async fn blocking<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Other("duckdb connection lock poisoned".into()))?;
            work(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Other(format!("duckdb task failed: {e}")))?
    }

    /// Load, apply `rule`, persist the difference, commit.
    async fn mutate<T>(
        &self,
        id: &DocumentId,
        rule: impl FnOnce(&mut Document) -> Result<T, LifecycleError> + Send + 'static,
    ) -> StoreResult<Document>
    where
        T: Send + 'static,
    {
        let id = id.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let (doc, _) = apply(&tx, &id, rule)?;
            tx.commit()?;
            Ok(doc)
        })
        .await
    }
}

fn apply<T>(
    conn: &Connection,
    id: &DocumentId,
    rule: impl FnOnce(&mut Document) -> Result<T, LifecycleError>,
) -> StoreResult<(Document, T)> {
    let before = load(conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    let mut after = before.clone();
    let out = rule(&mut after)?;
    persist(conn, Some(&before), &after)?;
    Ok((after, out))
}

#[async_trait]
impl DocumentStore for DuckStore {
    async fn insert(&self, document: Document) -> StoreResult<()> {
        let id = document.id.clone();
        let kind = document.kind;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            persist(&tx, None, &document)?;
            tx.commit()?;
            Ok(())
        })
        .await?;
        debug!(document_id = %id, kind = %kind, "inserted document");
        Ok(())
    }

    async fn get(&self, id: &DocumentId) -> StoreResult<Document> {
        let id = id.clone();
        self.blocking(move |conn| {
            load(conn, &id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
        .await
    }

    async fn list(&self) -> StoreResult<Vec<Document>> {
        self.blocking(|conn| {
            let ids = collect(conn, "SELECT id FROM documents", None, |row| {
                row.get::<_, String>(0)
            })?;
            let mut docs = Vec::with_capacity(ids.len());
            for id in ids {
                let id = DocumentId::from_stored(id);
                if let Some(doc) = load(conn, &id)? {
                    docs.push(doc);
                }
            }
            docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            Ok(docs)
        })
        .await
    }

    async fn find_by_credential(
        &self,
        digest: &CredentialDigest,
    ) -> StoreResult<Option<Document>> {
        let digest = digest.clone();
        self.blocking(move |conn| {
            let ids = collect(
                conn,
                "SELECT document_id FROM credentials WHERE digest = ? AND revoked_at IS NULL",
                Some(digest.as_str()),
                |row| row.get::<_, String>(0),
            )?;
            match ids.into_iter().next() {
                Some(id) => load(conn, &DocumentId::from_stored(id)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn issue_credential(
        &self,
        id: &DocumentId,
        digest: CredentialDigest,
        at: DateTime<Utc>,
    ) -> StoreResult<Document> {
        self.mutate(id, move |doc| doc.issue_credential(digest, at)).await
    }

    async fn issue_first_credential(
        &self,
        id: &DocumentId,
        digest: CredentialDigest,
        at: DateTime<Utc>,
    ) -> StoreResult<Document> {
        self.mutate(id, move |doc| doc.issue_first_credential(digest, at)).await
    }

    async fn mark_viewed(&self, id: &DocumentId, at: DateTime<Utc>) -> StoreResult<Document> {
        self.mutate(id, move |doc| Ok(doc.mark_viewed(at))).await
    }

    async fn transition(
        &self,
        id: &DocumentId,
        to: Status,
        at: DateTime<Utc>,
    ) -> StoreResult<Document> {
        self.mutate(id, move |doc| doc.transition(to, at)).await
    }

    async fn record_signature(
        &self,
        id: &DocumentId,
        record: SignatureRecord,
    ) -> StoreResult<Document> {
        self.mutate(id, move |doc| doc.attach_signature(record)).await
    }

    async fn open_payment(
        &self,
        id: &DocumentId,
        record: PaymentRecord,
    ) -> StoreResult<Document> {
        let id = id.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            if session_owner(&tx, &record.gateway_session_id)?.is_some() {
                return Err(LifecycleError::DuplicateSession(record.gateway_session_id).into());
            }
            let (doc, _) = apply(&tx, &id, |doc| doc.open_payment(record))?;
            tx.commit()?;
            Ok(doc)
        })
        .await
    }

    async fn find_payment(&self, session_id: &str) -> StoreResult<Option<DocumentId>> {
        let session_id = session_id.to_string();
        self.blocking(move |conn| session_owner(conn, &session_id)).await
    }

    async fn settle_payment(
        &self,
        session_id: &str,
        outcome: GatewayOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<Settlement> {
        let session_id = session_id.to_string();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let id = session_owner(&tx, &session_id)?
                .ok_or_else(|| StoreError::NotFound(session_id.clone()))?;
            let (document, settled) =
                apply(&tx, &id, |doc| doc.settle_payment(&session_id, outcome, at))?;
            tx.commit()?;
            Ok(Settlement {
                applied: settled.was_applied(),
                payment: settled.record().clone(),
                document,
            })
        })
        .await
    }

    async fn append_notification(
        &self,
        id: &DocumentId,
        attempt: NotificationAttempt,
    ) -> StoreResult<Document> {
        self.mutate(id, move |doc| {
            doc.append_notification(attempt);
            Ok(())
        })
        .await
    }
}

// ── Reads ──

struct DocumentRow {
    kind: String,
    reference: String,
    title: String,
    party_name: String,
    party_email: String,
    party_company: Option<String>,
    party_phone: Option<String>,
    party_address: Option<String>,
    tax_rate_bp: i64,
    currency: String,
    terms: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
    issued_at: Option<String>,
    expires_at: Option<String>,
    due_date: Option<String>,
}

fn collect<T>(
    conn: &Connection,
    sql: &str,
    key: Option<&str>,
    map: impl FnMut(&duckdb::Row<'_>) -> duckdb::Result<T>,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = match key {
        Some(key) => stmt.query_map(params![key], map)?,
        None => stmt.query_map([], map)?,
    };
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn session_owner(conn: &Connection, session_id: &str) -> StoreResult<Option<DocumentId>> {
    let ids = collect(
        conn,
        "SELECT document_id FROM payments WHERE gateway_session_id = ?",
        Some(session_id),
        |row| row.get::<_, String>(0),
    )?;
    Ok(ids.into_iter().next().map(DocumentId::from_stored))
}

fn load(conn: &Connection, id: &DocumentId) -> StoreResult<Option<Document>> {
    let key = Some(id.as_str());
    let rows = collect(
        conn,
        "SELECT kind, reference, title, party_name, party_email, party_company,
                party_phone, party_address, tax_rate_bp, currency, terms, status,
                created_at, updated_at, issued_at, expires_at, due_date
         FROM documents WHERE id = ?",
        key,
        |row| {
            Ok(DocumentRow {
                kind: row.get(0)?,
                reference: row.get(1)?,
                title: row.get(2)?,
                party_name: row.get(3)?,
                party_email: row.get(4)?,
                party_company: row.get(5)?,
                party_phone: row.get(6)?,
                party_address: row.get(7)?,
                tax_rate_bp: row.get(8)?,
                currency: row.get(9)?,
                terms: row.get(10)?,
                status: row.get(11)?,
                created_at: row.get(12)?,
                updated_at: row.get(13)?,
                issued_at: row.get(14)?,
                expires_at: row.get(15)?,
                due_date: row.get(16)?,
            })
        },
    )?;
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };

    let line_items = collect(
        conn,
        "SELECT description, quantity, unit_price_minor FROM line_items
         WHERE document_id = ? ORDER BY position",
        key,
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
    )?
    .into_iter()
    .map(|(description, quantity, price)| {
        Ok(LineItem {
            description,
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::Corrupt(format!("quantity {quantity}")))?,
            unit_price: Money::from_minor(price),
        })
    })
    .collect::<StoreResult<Vec<_>>>()?;

    let credential = collect(
        conn,
        "SELECT digest FROM credentials WHERE document_id = ? AND revoked_at IS NULL",
        key,
        |row| row.get::<_, String>(0),
    )?
    .into_iter()
    .next()
    .map(CredentialDigest::from_hex);

    let transitions = collect(
        conn,
        "SELECT from_status, to_status, at FROM transitions
         WHERE document_id = ? ORDER BY seq",
        key,
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
    )?
    .into_iter()
    .map(|(from, to, at)| {
        Ok(StatusTransition {
            from: parse_enum(&from)?,
            to: parse_enum(&to)?,
            at: parse_ts(&at)?,
        })
    })
    .collect::<StoreResult<Vec<_>>>()?;

    let signature = collect(
        conn,
        "SELECT signer_name, accepted_at, consent_given, signer_ip FROM signatures
         WHERE document_id = ?",
        key,
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        },
    )?
    .into_iter()
    .next()
    .map(|(signer_name, accepted_at, consent_given, signer_ip)| {
        Ok::<_, StoreError>(SignatureRecord {
            signer_name,
            accepted_at: parse_ts(&accepted_at)?,
            consent_given,
            signer_ip,
        })
    })
    .transpose()?;

    let payments = collect(
        conn,
        "SELECT gateway_session_id, status, amount_expected, amount_captured, currency,
                created_at, paid_at, failure
         FROM payments WHERE document_id = ? ORDER BY seq",
        key,
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        },
    )?
    .into_iter()
    .map(
        |(session, status, expected, captured, currency, created_at, paid_at, failure)| {
            Ok(PaymentRecord {
                gateway_session_id: session,
                status: parse_enum(&status)?,
                amount_expected: Money::from_minor(expected),
                amount_captured: captured.map(Money::from_minor),
                currency: parse_enum(&currency)?,
                created_at: parse_ts(&created_at)?,
                paid_at: paid_at.as_deref().map(parse_ts).transpose()?,
                failure: failure
                    .as_deref()
                    .map(serde_json::from_str::<PaymentFailure>)
                    .transpose()
                    .map_err(|e| StoreError::Corrupt(format!("payment failure: {e}")))?,
            })
        },
    )
    .collect::<StoreResult<Vec<_>>>()?;

    let notifications = collect(
        conn,
        "SELECT recipient, subject, template, sent_at, outcome, error_detail, provider_message_id
         FROM notifications WHERE document_id = ? ORDER BY seq",
        key,
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        },
    )?
    .into_iter()
    .map(
        |(recipient, subject, template, sent_at, outcome, error_detail, provider_message_id)| {
            Ok(NotificationAttempt {
                recipient,
                subject,
                template: parse_enum(&template)?,
                sent_at: parse_ts(&sent_at)?,
                outcome: parse_enum(&outcome)?,
                error_detail,
                provider_message_id,
            })
        },
    )
    .collect::<StoreResult<Vec<_>>>()?;

    let tax_rate = u32::try_from(row.tax_rate_bp)
        .map(TaxRate::from_basis_points)
        .map_err(|_| StoreError::Corrupt(format!("tax rate {}", row.tax_rate_bp)))?;

    Ok(Some(Document {
        id: id.clone(),
        kind: parse_enum(&row.kind)?,
        reference: row.reference,
        title: row.title,
        party: Party {
            name: row.party_name,
            email: row.party_email,
            company: row.party_company,
            phone: row.party_phone,
            address: row.party_address,
        },
        line_items,
        tax_rate,
        currency: parse_enum::<Currency>(&row.currency)?,
        terms: row.terms,
        status: parse_enum(&row.status)?,
        credential,
        created_at: parse_ts(&row.created_at)?,
        updated_at: parse_ts(&row.updated_at)?,
        issued_at: row.issued_at.as_deref().map(parse_ts).transpose()?,
        expires_at: row.expires_at.as_deref().map(parse_ts).transpose()?,
        due_date: row
            .due_date
            .as_deref()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d")
                    .map_err(|e| StoreError::Corrupt(format!("due date {d}: {e}")))
            })
            .transpose()?,
        signature,
        payments,
        notifications,
        transitions,
    }))
}

// ── Writes ──

/// Write the difference between `before` and `after`. `None` inserts.
fn persist(conn: &Connection, before: Option<&Document>, after: &Document) -> StoreResult<()> {
    let id = after.id.as_str();
    match before {
        None => {
            conn.execute(
                "INSERT INTO documents VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    after.kind.as_str(),
                    after.reference,
                    after.title,
                    after.party.name,
                    after.party.email,
                    after.party.company,
                    after.party.phone,
                    after.party.address,
                    i64::from(after.tax_rate.basis_points()),
                    after.currency.code(),
                    after.terms,
                    after.status.as_str(),
                    ts(&after.created_at),
                    ts(&after.updated_at),
                    after.issued_at.as_ref().map(ts),
                    after.expires_at.as_ref().map(ts),
                    after.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
                ],
            )?;
            for (position, item) in after.line_items.iter().enumerate() {
                conn.execute(
                    "INSERT INTO line_items VALUES (?, ?, ?, ?, ?)",
                    params![
                        id,
                        position as i64,
                        item.description,
                        i64::from(item.quantity),
                        item.unit_price.minor(),
                    ],
                )?;
            }
        }
        Some(_) => {
            conn.execute(
                "UPDATE documents SET status = ?, updated_at = ?, issued_at = ? WHERE id = ?",
                params![
                    after.status.as_str(),
                    ts(&after.updated_at),
                    after.issued_at.as_ref().map(ts),
                    id,
                ],
            )?;
        }
    }

    let old_credential = before.and_then(|b| b.credential.as_ref());
    if after.credential.as_ref() != old_credential {
        let now = ts(&after.updated_at);
        if old_credential.is_some() {
            conn.execute(
                "UPDATE credentials SET revoked_at = ? WHERE document_id = ? AND revoked_at IS NULL",
                params![now, id],
            )?;
        }
        if let Some(digest) = &after.credential {
            conn.execute(
                "INSERT INTO credentials VALUES (?, ?, ?, NULL)",
                params![digest.as_str(), id, now],
            )?;
        }
    }

    let seen = before.map_or(0, |b| b.transitions.len());
    for (seq, t) in after.transitions.iter().enumerate().skip(seen) {
        conn.execute(
            "INSERT INTO transitions VALUES (?, ?, ?, ?, ?)",
            params![id, seq as i64, t.from.as_str(), t.to.as_str(), ts(&t.at)],
        )?;
    }

    if before.is_none_or(|b| b.signature.is_none()) {
        if let Some(sig) = &after.signature {
            conn.execute(
                "INSERT INTO signatures VALUES (?, ?, ?, ?, ?)",
                params![
                    id,
                    sig.signer_name,
                    ts(&sig.accepted_at),
                    sig.consent_given,
                    sig.signer_ip,
                ],
            )?;
        }
    }

    for (seq, payment) in after.payments.iter().enumerate() {
        let failure = payment
            .failure
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Other(e.to_string()))?;
        match before.and_then(|b| b.payment(&payment.gateway_session_id)) {
            None => {
                conn.execute(
                    "INSERT INTO payments VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        payment.gateway_session_id,
                        id,
                        seq as i64,
                        payment.status.as_str(),
                        payment.amount_expected.minor(),
                        payment.amount_captured.map(Money::minor),
                        payment.currency.code(),
                        ts(&payment.created_at),
                        payment.paid_at.as_ref().map(ts),
                        failure,
                    ],
                )?;
            }
            Some(old) if old != payment => {
                let updated = conn.execute(
                    "UPDATE payments
                     SET status = ?, amount_captured = ?, paid_at = ?, failure = ?
                     WHERE gateway_session_id = ? AND status = 'pending'",
                    params![
                        payment.status.as_str(),
                        payment.amount_captured.map(Money::minor),
                        payment.paid_at.as_ref().map(ts),
                        failure,
                        payment.gateway_session_id,
                    ],
                )?;
                if updated != 1 {
                    return Err(StoreError::Conflict(format!(
                        "payment {} was already settled",
                        payment.gateway_session_id
                    )));
                }
            }
            Some(_) => {}
        }
    }

    let seen = before.map_or(0, |b| b.notifications.len());
    for (seq, n) in after.notifications.iter().enumerate().skip(seen) {
        conn.execute(
            "INSERT INTO notifications VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                seq as i64,
                n.recipient,
                n.subject,
                n.template.as_str(),
                ts(&n.sent_at),
                n.outcome.as_str(),
                n.error_detail,
                n.provider_message_id,
            ],
        )?;
    }
    Ok(())
}

// Full precision, so a reloaded document compares equal.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {s}: {e}")))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> StoreResult<T> {
    s.parse().map_err(StoreError::Corrupt)
}
