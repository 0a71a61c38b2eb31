//! Records owned by a document: signature, payments, notification log, and
//! status history. Created only through the lifecycle protocols.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Currency, Money};
use crate::status::Status;

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: Status,
    pub to: Status,
    pub at: DateTime<Utc>,
}

/// A typed name plus explicit consent. Not cryptographically bound to the
/// party's identity; possession of the credential is the only proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signer_name: String,
    pub accepted_at: DateTime<Utc>,
    pub consent_given: bool,
    pub signer_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Why a checkout session settled as failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PaymentFailure {
    AmountMismatch { expected: Money, captured: Money },
    CurrencyMismatch { expected: Currency, captured: String },
    Gateway { detail: String },
    /// Funds were captured but the document had left sent/viewed
    /// (cancelled or expired meanwhile). Needs a manual refund.
    DocumentNotActionable { status: Status },
}

impl fmt::Display for PaymentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmountMismatch { expected, captured } => {
                write!(f, "amount mismatch: expected {expected}, captured {captured}")
            }
            Self::CurrencyMismatch { expected, captured } => write!(
                f,
                "currency mismatch: expected {}, captured {captured}",
                expected.code()
            ),
            Self::Gateway { detail } => write!(f, "gateway reported failure: {detail}"),
            Self::DocumentNotActionable { status } => {
                write!(f, "document was {status} when the payment settled")
            }
        }
    }
}

/// One checkout session against an invoice. Keyed by `gateway_session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub gateway_session_id: String,
    pub status: PaymentStatus,
    pub amount_expected: Money,
    pub amount_captured: Option<Money>,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failure: Option<PaymentFailure>,
}

impl PaymentRecord {
    pub fn pending(
        session_id: impl Into<String>,
        amount_expected: Money,
        currency: Currency,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            gateway_session_id: session_id.into(),
            status: PaymentStatus::Pending,
            amount_expected,
            amount_captured: None,
            currency,
            created_at: at,
            paid_at: None,
            failure: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != PaymentStatus::Pending
    }
}

/// What the gateway says happened to a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Paid { amount: Money, currency: String },
    Failed { reason: String },
}

/// Result of applying a [`GatewayOutcome`] to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The pending record was settled by this call.
    Applied(PaymentRecord),
    /// The record had already been settled; nothing changed.
    AlreadySettled(PaymentRecord),
}

impl SettleOutcome {
    pub fn record(&self) -> &PaymentRecord {
        match self {
            Self::Applied(r) | Self::AlreadySettled(r) => r,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    DocumentIssued,
    Reminder,
    SignatureConfirmation,
    PaymentReceipt,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentIssued => "document_issued",
            Self::Reminder => "reminder",
            Self::SignatureConfirmation => "signature_confirmation",
            Self::PaymentReceipt => "payment_receipt",
        }
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document_issued" => Ok(Self::DocumentIssued),
            "reminder" => Ok(Self::Reminder),
            "signature_confirmation" => Ok(Self::SignatureConfirmation),
            "payment_receipt" => Ok(Self::PaymentReceipt),
            other => Err(format!("unknown template: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    Failed,
}

impl NotificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for NotificationOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown notification outcome: {other}")),
        }
    }
}

/// One delivery attempt. Append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub recipient: String,
    pub subject: String,
    pub template: TemplateKind,
    pub sent_at: DateTime<Utc>,
    pub outcome: NotificationOutcome,
    pub error_detail: Option<String>,
    pub provider_message_id: Option<String>,
}
