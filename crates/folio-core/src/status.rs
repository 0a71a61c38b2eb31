//! Document status machine.
//!
//! ```text
//! draft -> sent -> viewed -> { signed | paid } -> completed
//!    \        \        \          \       \
//!     +--------+--------+----------+-------+--> cancelled | expired
//! ```
//!
//! Transitions only move forward. Kind-specific rules (who may be signed,
//! who may be paid, when completion holds) live on [`Document`](crate::Document).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Internal only; no credential exists yet.
    Draft,
    /// Credential issued and sent to the party.
    Sent,
    /// The party has resolved the credential at least once.
    Viewed,
    Signed,
    Paid,
    Completed,
    Cancelled,
    Expired,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Viewed => "viewed",
            Self::Signed => "signed",
            Self::Paid => "paid",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// No further mutation is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    /// The external party can still sign or pay.
    pub fn awaits_party(&self) -> bool {
        matches!(self, Self::Sent | Self::Viewed)
    }

    /// Whether the status table permits `self -> to`, ignoring document kind.
    pub fn can_transition_to(&self, to: Status) -> bool {
        use Status::*;
        match (self, to) {
            (from, Cancelled | Expired) => !from.is_terminal(),
            (Draft, Sent) => true,
            (Sent, Viewed | Signed | Paid) => true,
            (Viewed, Signed | Paid) => true,
            (Signed | Paid, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "draft" => Self::Draft,
            "sent" => Self::Sent,
            "viewed" => Self::Viewed,
            "signed" => Self::Signed,
            "paid" => Self::Paid,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            other => return Err(format!("unknown status: {other}")),
        })
    }
}
