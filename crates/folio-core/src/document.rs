//! The document record and its lifecycle rules.
//!
//! A [`Document`] is a kind-tagged record: quotes, invoices, and contracts
//! share every field and differ only in which terminal conditions apply.
//! All mutators check their rule first and leave the document untouched on
//! error, so a store can apply them to a working copy and persist only on
//! success.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credential::CredentialDigest;
use crate::error::{LifecycleError, ValidationError};
use crate::money::{Currency, Money, TaxRate, Totals};
use crate::records::{
    GatewayOutcome, NotificationAttempt, PaymentFailure, PaymentRecord, PaymentStatus,
    SettleOutcome, SignatureRecord, StatusTransition,
};
use crate::status::Status;

pub const MAX_LINE_ITEMS: usize = 200;
pub const MAX_QUANTITY: u32 = 10_000;
pub const MAX_UNIT_PRICE: Money = Money::from_minor(10_000_000_000);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Rehydrate an id read back from storage.
    pub fn from_stored(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Quote,
    Invoice,
    /// Contracts and agreements.
    Contract,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Invoice => "invoice",
            Self::Contract => "contract",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Quote => "Quote",
            Self::Invoice => "Invoice",
            Self::Contract => "Agreement",
        }
    }

    /// Quotes are accepted by signing, contracts are signed.
    pub fn accepts_signature(&self) -> bool {
        matches!(self, Self::Quote | Self::Contract)
    }

    pub fn accepts_payment(&self) -> bool {
        matches!(self, Self::Invoice)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quote" => Ok(Self::Quote),
            "invoice" => Ok(Self::Invoice),
            "contract" | "agreement" => Ok(Self::Contract),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

/// The external counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    pub fn amount(&self) -> Money {
        Money::from_minor(i64::from(self.quantity).saturating_mul(self.unit_price.minor()))
    }
}

/// Admin input for creating a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub reference: String,
    pub title: String,
    pub party: Party,
    pub line_items: Vec<LineItem>,
    /// Basis points: `1000` is 10 %.
    #[serde(default)]
    pub tax_rate: TaxRate,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub terms: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl NewDocument {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.reference.trim().is_empty() {
            return Err(ValidationError::new("reference", "must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::new("title", "must not be empty"));
        }
        if self.party.name.trim().is_empty() {
            return Err(ValidationError::new("party.name", "must not be empty"));
        }
        if !looks_like_email(&self.party.email) {
            return Err(ValidationError::new(
                "party.email",
                "must be a valid email address",
            ));
        }
        if self.line_items.is_empty() {
            return Err(ValidationError::new(
                "line_items",
                "at least one line item is required",
            ));
        }
        if self.line_items.len() > MAX_LINE_ITEMS {
            return Err(ValidationError::new(
                "line_items",
                format!("at most {MAX_LINE_ITEMS} line items"),
            ));
        }
        for item in &self.line_items {
            if item.description.trim().is_empty() {
                return Err(ValidationError::new(
                    "line_items.description",
                    "must not be empty",
                ));
            }
            if item.quantity == 0 || item.quantity > MAX_QUANTITY {
                return Err(ValidationError::new(
                    "line_items.quantity",
                    format!("must be between 1 and {MAX_QUANTITY}"),
                ));
            }
            if item.unit_price < Money::ZERO || item.unit_price > MAX_UNIT_PRICE {
                return Err(ValidationError::new(
                    "line_items.unit_price",
                    "out of range",
                ));
            }
        }
        if !self.tax_rate.is_valid() {
            return Err(ValidationError::new("tax_rate", "must be 0-100%"));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(ValidationError::new(
                    "expires_at",
                    "must be in the future",
                ));
            }
        }
        Ok(())
    }
}

pub fn looks_like_email(s: &str) -> bool {
    let s = s.trim();
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub kind: DocumentKind,
    pub reference: String,
    pub title: String,
    pub party: Party,
    pub line_items: Vec<LineItem>,
    pub tax_rate: TaxRate,
    pub currency: Currency,
    pub terms: Option<String>,
    pub status: Status,
    /// Digest of the live access credential; `None` while in draft.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialDigest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub signature: Option<SignatureRecord>,
    pub payments: Vec<PaymentRecord>,
    pub notifications: Vec<NotificationAttempt>,
    pub transitions: Vec<StatusTransition>,
}

impl Document {
    /// Validate admin input and build a draft.
    pub fn create(new: NewDocument, at: DateTime<Utc>) -> Result<Self, ValidationError> {
        new.validate(at)?;
        Ok(Self {
            id: DocumentId::generate(),
            kind: new.kind,
            reference: new.reference.trim().to_string(),
            title: new.title.trim().to_string(),
            party: new.party,
            line_items: new.line_items,
            tax_rate: new.tax_rate,
            currency: new.currency,
            terms: new.terms,
            status: Status::Draft,
            credential: None,
            created_at: at,
            updated_at: at,
            issued_at: None,
            expires_at: new.expires_at,
            due_date: new.due_date,
            signature: None,
            payments: Vec::new(),
            notifications: Vec::new(),
            transitions: Vec::new(),
        })
    }

    pub fn totals(&self) -> Totals {
        Totals::compute(&self.line_items, self.tax_rate)
    }

    /// Every terminal condition for this kind holds.
    pub fn completion_satisfied(&self) -> bool {
        match self.kind {
            DocumentKind::Quote | DocumentKind::Contract => self.signature.is_some(),
            DocumentKind::Invoice => self.paid_payment().is_some(),
        }
    }

    pub fn paid_payment(&self) -> Option<&PaymentRecord> {
        self.payments
            .iter()
            .find(|p| p.status == PaymentStatus::Paid)
    }

    pub fn payment(&self, session_id: &str) -> Option<&PaymentRecord> {
        self.payments
            .iter()
            .find(|p| p.gateway_session_id == session_id)
    }

    pub fn latest_payment(&self) -> Option<&PaymentRecord> {
        self.paid_payment().or_else(|| self.payments.last())
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Apply a status change, enforcing the status table and kind rules.
    pub fn transition(&mut self, to: Status, at: DateTime<Utc>) -> Result<(), LifecycleError> {
        let from = self.status;
        let kind_allows = match to {
            Status::Signed => self.kind.accepts_signature() && self.signature.is_some(),
            Status::Paid => self.kind.accepts_payment() && self.paid_payment().is_some(),
            Status::Completed => self.completion_satisfied(),
            _ => true,
        };
        if !from.can_transition_to(to) || !kind_allows {
            return Err(LifecycleError::InvalidTransition { from, to });
        }
        self.status = to;
        self.updated_at = at;
        self.transitions.push(StatusTransition { from, to, at });
        Ok(())
    }

    /// Install a fresh credential digest. A draft moves to `sent`; an open
    /// document keeps its status and the previous credential stops working.
    pub fn issue_credential(
        &mut self,
        digest: CredentialDigest,
        at: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.ensure_open("credential issue")?;
        if self.status == Status::Draft {
            self.transition(Status::Sent, at)?;
        }
        self.credential = Some(digest);
        self.issued_at.get_or_insert(at);
        self.updated_at = at;
        Ok(())
    }

    /// Install the first credential of a draft. Anything past `draft` is
    /// refused, so of two racing sends only one mints a link.
    pub fn issue_first_credential(
        &mut self,
        digest: CredentialDigest,
        at: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.status != Status::Draft {
            return Err(LifecycleError::InvalidTransition {
                from: self.status,
                to: Status::Sent,
            });
        }
        self.issue_credential(digest, at)
    }

    /// First view of a sent document. Returns whether the status changed.
    pub fn mark_viewed(&mut self, at: DateTime<Utc>) -> bool {
        if self.status == Status::Sent {
            // Sent -> Viewed is always in the table.
            self.transition(Status::Viewed, at).is_ok()
        } else {
            false
        }
    }

    pub fn attach_signature(&mut self, record: SignatureRecord) -> Result<(), LifecycleError> {
        if !self.kind.accepts_signature() {
            return Err(self.not_actionable("signature"));
        }
        self.ensure_open("signature")?;
        if self.signature.is_some() {
            return Err(LifecycleError::AlreadySigned);
        }
        if !self.status.awaits_party() {
            return Err(self.not_actionable("signature"));
        }
        let at = record.accepted_at;
        self.signature = Some(record);
        if let Err(e) = self.transition(Status::Signed, at) {
            self.signature = None;
            return Err(e);
        }
        Ok(())
    }

    /// Register a pending checkout session against this invoice.
    pub fn open_payment(&mut self, record: PaymentRecord) -> Result<(), LifecycleError> {
        if !self.kind.accepts_payment() || !self.status.awaits_party() {
            return Err(self.not_actionable("payment"));
        }
        if !self.totals().total.is_positive() || self.paid_payment().is_some() {
            return Err(self.not_actionable("payment"));
        }
        if self.payment(&record.gateway_session_id).is_some() {
            return Err(LifecycleError::DuplicateSession(record.gateway_session_id));
        }
        self.updated_at = record.created_at;
        self.payments.push(record);
        Ok(())
    }

    /// Settle a pending session with the gateway's verdict.
    ///
    /// The document becomes `paid` only when the gateway reports a capture
    /// of exactly `total` in the document's currency while the document is
    /// still awaiting the party. Any other report settles the record as
    /// `failed` with the reason. Settling an already-settled record is a
    /// no-op that returns the stored record.
    pub fn settle_payment(
        &mut self,
        session_id: &str,
        outcome: GatewayOutcome,
        at: DateTime<Utc>,
    ) -> Result<SettleOutcome, LifecycleError> {
        let idx = self
            .payments
            .iter()
            .position(|p| p.gateway_session_id == session_id)
            .ok_or_else(|| LifecycleError::UnknownSession(session_id.to_string()))?;
        if self.payments[idx].is_settled() {
            return Ok(SettleOutcome::AlreadySettled(self.payments[idx].clone()));
        }

        let total = self.totals().total;
        let already_paid = self.paid_payment().is_some();
        let status = self.status;
        let currency = self.currency;

        let record = &mut self.payments[idx];
        match outcome {
            GatewayOutcome::Failed { reason } => {
                record.status = PaymentStatus::Failed;
                record.failure = Some(PaymentFailure::Gateway { detail: reason });
            }
            GatewayOutcome::Paid {
                amount,
                currency: captured_currency,
            } => {
                record.amount_captured = Some(amount);
                record.status = PaymentStatus::Failed;
                if !captured_currency.eq_ignore_ascii_case(currency.code()) {
                    record.failure = Some(PaymentFailure::CurrencyMismatch {
                        expected: currency,
                        captured: captured_currency,
                    });
                } else if amount != total {
                    record.failure = Some(PaymentFailure::AmountMismatch {
                        expected: total,
                        captured: amount,
                    });
                } else if !status.awaits_party() || already_paid {
                    let status = if already_paid { Status::Paid } else { status };
                    record.failure = Some(PaymentFailure::DocumentNotActionable { status });
                } else {
                    record.status = PaymentStatus::Paid;
                    record.paid_at = Some(at);
                }
            }
        }
        let settled = record.clone();
        self.updated_at = at;
        if settled.status == PaymentStatus::Paid {
            self.transition(Status::Paid, at)?;
        }
        Ok(SettleOutcome::Applied(settled))
    }

    pub fn append_notification(&mut self, attempt: NotificationAttempt) {
        self.notifications.push(attempt);
    }

    /// The read-only projection shown to the external party.
    pub fn view(&self) -> DocumentView {
        let totals = self.totals();
        let payment = self.latest_payment();
        DocumentView {
            kind: self.kind,
            reference: self.reference.clone(),
            title: self.title.clone(),
            party: self.party.clone(),
            line_items: self.line_items.clone(),
            currency: self.currency,
            tax_rate: self.tax_rate,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            status: self.status,
            terms: self.terms.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            due_date: self.due_date,
            signed_by: self.signature.as_ref().map(|s| s.signer_name.clone()),
            signed_at: self.signature.as_ref().map(|s| s.accepted_at),
            payment_status: payment.map(|p| p.status),
            paid_at: payment.and_then(|p| p.paid_at),
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), LifecycleError> {
        if self.status.is_terminal() {
            return Err(self.not_actionable(operation));
        }
        Ok(())
    }

    fn not_actionable(&self, operation: &'static str) -> LifecycleError {
        LifecycleError::NotActionable {
            kind: self.kind,
            status: self.status,
            operation,
        }
    }
}

/// What an unauthenticated party may see: no credential digest, no status
/// history, no notification log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentView {
    pub kind: DocumentKind,
    pub reference: String,
    pub title: String,
    pub party: Party,
    pub line_items: Vec<LineItem>,
    pub currency: Currency,
    pub tax_rate: TaxRate,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub status: Status,
    pub terms: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub signed_by: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub payment_status: Option<PaymentStatus>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn new_document(kind: DocumentKind) -> NewDocument {
        NewDocument {
            kind,
            reference: "Q-2026-014".into(),
            title: "Website redesign".into(),
            party: Party {
                name: "Ada Lovelace".into(),
                email: "ada@example.com".into(),
                company: Some("Analytical Engines Ltd".into()),
                phone: None,
                address: None,
            },
            line_items: vec![
                LineItem {
                    description: "Design and build".into(),
                    quantity: 1,
                    unit_price: Money::from_major(1800),
                },
                LineItem {
                    description: "Hosting setup".into(),
                    quantity: 1,
                    unit_price: Money::from_major(300),
                },
            ],
            tax_rate: TaxRate::percent(10),
            currency: Currency::Gbp,
            terms: Some("Payment due within 14 days.".into()),
            expires_at: None,
            due_date: None,
        }
    }

    fn sent(kind: DocumentKind) -> Document {
        let now = Utc::now();
        let mut doc = Document::create(new_document(kind), now).unwrap();
        doc.issue_credential(CredentialDigest::from_hex("ab".repeat(32)), now)
            .unwrap();
        doc
    }

    fn signature(at: DateTime<Utc>) -> SignatureRecord {
        SignatureRecord {
            signer_name: "Ada Lovelace".into(),
            accepted_at: at,
            consent_given: true,
            signer_ip: None,
        }
    }

    #[test]
    fn create_starts_in_draft_without_credential() {
        let doc = Document::create(new_document(DocumentKind::Quote), Utc::now()).unwrap();
        assert_eq!(doc.status, Status::Draft);
        assert!(doc.credential.is_none());
        assert_eq!(doc.totals().total, Money::from_minor(231_000));
    }

    #[test]
    fn create_rejects_bad_input() {
        let now = Utc::now();
        let mut new = new_document(DocumentKind::Invoice);
        new.party.email = "not-an-email".into();
        assert_eq!(
            Document::create(new, now).unwrap_err().field,
            "party.email"
        );

        let mut new = new_document(DocumentKind::Invoice);
        new.line_items.clear();
        assert_eq!(Document::create(new, now).unwrap_err().field, "line_items");

        let mut new = new_document(DocumentKind::Invoice);
        new.line_items[0].quantity = 0;
        assert!(Document::create(new, now).is_err());

        let mut new = new_document(DocumentKind::Quote);
        new.expires_at = Some(now - Duration::days(1));
        assert_eq!(Document::create(new, now).unwrap_err().field, "expires_at");
    }

    #[test]
    fn email_check() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a b@c.co"));
        assert!(!looks_like_email("a@@b.co"));
    }

    #[test]
    fn issue_moves_draft_to_sent_and_reissue_keeps_status() {
        let mut doc = sent(DocumentKind::Quote);
        assert_eq!(doc.status, Status::Sent);
        let first_issue = doc.issued_at;
        doc.mark_viewed(Utc::now());
        doc.issue_credential(CredentialDigest::from_hex("cd".repeat(32)), Utc::now())
            .unwrap();
        assert_eq!(doc.status, Status::Viewed);
        assert_eq!(doc.issued_at, first_issue);
        assert_eq!(
            doc.credential.as_ref().map(|c| c.as_str().to_string()),
            Some("cd".repeat(32))
        );
    }

    #[test]
    fn mark_viewed_is_idempotent() {
        let mut doc = sent(DocumentKind::Contract);
        assert!(doc.mark_viewed(Utc::now()));
        assert!(!doc.mark_viewed(Utc::now()));
        assert_eq!(doc.status, Status::Viewed);
        assert_eq!(doc.transitions.len(), 2);
    }

    #[test]
    fn signature_is_at_most_once() {
        let mut doc = sent(DocumentKind::Contract);
        doc.attach_signature(signature(Utc::now())).unwrap();
        assert_eq!(doc.status, Status::Signed);
        assert_eq!(
            doc.attach_signature(signature(Utc::now())),
            Err(LifecycleError::AlreadySigned)
        );
    }

    #[test]
    fn cancelled_contract_rejects_signature() {
        let mut doc = sent(DocumentKind::Contract);
        doc.transition(Status::Cancelled, Utc::now()).unwrap();
        let err = doc.attach_signature(signature(Utc::now())).unwrap_err();
        assert!(matches!(err, LifecycleError::NotActionable { .. }));
        assert!(doc.signature.is_none());
    }

    #[test]
    fn invoices_cannot_be_signed_and_quotes_cannot_be_paid() {
        let mut invoice = sent(DocumentKind::Invoice);
        assert!(matches!(
            invoice.attach_signature(signature(Utc::now())),
            Err(LifecycleError::NotActionable { .. })
        ));
        let mut quote = sent(DocumentKind::Quote);
        let record = PaymentRecord::pending("cs_1", Money::from_minor(1), Currency::Gbp, Utc::now());
        assert!(matches!(
            quote.open_payment(record),
            Err(LifecycleError::NotActionable { .. })
        ));
    }

    #[test]
    fn paid_requires_a_paid_record() {
        let mut invoice = sent(DocumentKind::Invoice);
        assert_eq!(
            invoice.transition(Status::Paid, Utc::now()),
            Err(LifecycleError::InvalidTransition {
                from: Status::Sent,
                to: Status::Paid
            })
        );
    }

    #[test]
    fn settle_matching_amount_marks_paid_once() {
        let mut invoice = sent(DocumentKind::Invoice);
        let total = invoice.totals().total;
        invoice
            .open_payment(PaymentRecord::pending("cs_1", total, Currency::Gbp, Utc::now()))
            .unwrap();
        let outcome = GatewayOutcome::Paid {
            amount: total,
            currency: "GBP".into(),
        };
        let first = invoice.settle_payment("cs_1", outcome.clone(), Utc::now()).unwrap();
        assert!(first.was_applied());
        assert_eq!(first.record().status, PaymentStatus::Paid);
        assert_eq!(invoice.status, Status::Paid);

        let second = invoice.settle_payment("cs_1", outcome, Utc::now()).unwrap();
        assert!(!second.was_applied());
        assert_eq!(second.record(), first.record());
        let paid_transitions = invoice
            .transitions
            .iter()
            .filter(|t| t.to == Status::Paid)
            .count();
        assert_eq!(paid_transitions, 1);
    }

    #[test]
    fn settle_amount_mismatch_fails_record_and_keeps_status() {
        let mut invoice = sent(DocumentKind::Invoice);
        let total = invoice.totals().total;
        invoice
            .open_payment(PaymentRecord::pending("cs_1", total, Currency::Gbp, Utc::now()))
            .unwrap();
        let outcome = invoice
            .settle_payment(
                "cs_1",
                GatewayOutcome::Paid {
                    amount: Money::from_minor(100),
                    currency: "gbp".into(),
                },
                Utc::now(),
            )
            .unwrap();
        let record = outcome.record();
        assert_eq!(record.status, PaymentStatus::Failed);
        assert_eq!(
            record.failure,
            Some(PaymentFailure::AmountMismatch {
                expected: total,
                captured: Money::from_minor(100)
            })
        );
        assert_eq!(invoice.status, Status::Sent);
    }

    #[test]
    fn capture_after_cancel_is_recorded_but_not_applied() {
        let mut invoice = sent(DocumentKind::Invoice);
        let total = invoice.totals().total;
        invoice
            .open_payment(PaymentRecord::pending("cs_1", total, Currency::Gbp, Utc::now()))
            .unwrap();
        invoice.transition(Status::Cancelled, Utc::now()).unwrap();
        let outcome = invoice
            .settle_payment(
                "cs_1",
                GatewayOutcome::Paid {
                    amount: total,
                    currency: "gbp".into(),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(
            outcome.record().failure,
            Some(PaymentFailure::DocumentNotActionable {
                status: Status::Cancelled
            })
        );
        assert_eq!(invoice.status, Status::Cancelled);
    }

    #[test]
    fn completion_follows_kind_predicate() {
        let mut contract = sent(DocumentKind::Contract);
        assert!(contract.transition(Status::Completed, Utc::now()).is_err());
        contract.attach_signature(signature(Utc::now())).unwrap();
        contract.transition(Status::Completed, Utc::now()).unwrap();
        assert!(contract.status.is_terminal());
    }

    #[test]
    fn view_hides_internal_fields() {
        let doc = sent(DocumentKind::Quote);
        let json = serde_json::to_value(doc.view()).unwrap();
        assert!(json.get("credential").is_none());
        assert!(json.get("notifications").is_none());
        assert!(json.get("transitions").is_none());
        assert_eq!(json["total"], 231_000);
    }
}
