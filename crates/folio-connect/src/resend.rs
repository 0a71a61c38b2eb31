//! Resend-compatible email client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::mail::{DeliveryReceipt, MailError, Mailer, OutboundEmail};

pub struct ResendMailer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    from: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<WireAttachment<'a>>,
}

#[derive(Serialize)]
struct WireAttachment<'a> {
    filename: &'a str,
    content: String,
    content_type: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl ResendMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MailError::Http)?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            timeout: config.timeout,
        })
    }

    fn transport(&self, err: reqwest::Error) -> MailError {
        if err.is_timeout() {
            warn!(timeout = ?self.timeout, "email provider request timed out");
            MailError::Timeout(self.timeout)
        } else {
            MailError::Http(err)
        }
    }

    fn request<'a>(&'a self, email: &'a OutboundEmail) -> SendRequest<'a> {
        SendRequest {
            from: &self.from,
            to: [email.to.as_str()],
            subject: &email.subject,
            text: &email.text,
            attachments: email
                .attachments
                .iter()
                .map(|a| WireAttachment {
                    filename: &a.filename,
                    content: STANDARD.encode(&a.bytes),
                    content_type: &a.content_type,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, MailError> {
        let url = format!("{}/emails", self.api_base);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(email))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let sent: SendResponse = resp.json().await.map_err(|e| self.transport(e))?;
        info!(to = %email.to, message_id = %sent.id, "email accepted by provider");
        Ok(DeliveryReceipt {
            message_id: sent.id,
        })
    }
}
