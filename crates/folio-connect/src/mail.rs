//! Email provider boundary.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum MailError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    #[error("provider did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("provider returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, MailError>;
}

/// Writes emails to the log instead of sending them. For local runs
/// without provider credentials.
#[derive(Debug, Default)]
pub struct LogMailer {
    sent: AtomicU64,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, MailError> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "email not sent (log mailer)\n{}",
            email.text
        );
        Ok(DeliveryReceipt {
            message_id: format!("log-{n}"),
        })
    }
}
