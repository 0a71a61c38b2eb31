//! Notification Dispatcher.
//!
//! Composes an email from a template, delivers it through the [`Mailer`],
//! and appends exactly one [`NotificationAttempt`] per recipient to the
//! document's log. A delivery failure is data, not an error: it is recorded
//! as a failed attempt and the caller carries on.

use std::sync::Arc;

use folio_connect::{Attachment, Mailer, OutboundEmail};
use folio_core::document::looks_like_email;
use folio_core::pdf::{self, RenderOptions};
use folio_core::{
    DeskConfig, Document, DocumentId, DocumentKind, NotificationAttempt, NotificationOutcome,
    TemplateKind,
};
use folio_store::DocumentStore;
use futures::future::join_all;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::DeskError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    DocumentIssued { link: String },
    Reminder { link: String },
    SignatureConfirmation,
    PaymentReceipt,
}

impl Template {
    pub fn kind(&self) -> TemplateKind {
        match self {
            Self::DocumentIssued { .. } => TemplateKind::DocumentIssued,
            Self::Reminder { .. } => TemplateKind::Reminder,
            Self::SignatureConfirmation => TemplateKind::SignatureConfirmation,
            Self::PaymentReceipt => TemplateKind::PaymentReceipt,
        }
    }

    fn attaches_pdf(&self) -> bool {
        matches!(self, Self::SignatureConfirmation | Self::PaymentReceipt)
    }

    /// Subject and plain-text body.
    pub fn compose(&self, doc: &Document, agency: &str) -> (String, String) {
        let label = doc.kind.label();
        let total = doc.currency.format(doc.totals().total);
        let greeting = format!("Hi {},", doc.party.name);
        let sign_off = format!("Thanks,\n{agency}");
        let ask = match doc.kind {
            DocumentKind::Quote => "review and accept it",
            DocumentKind::Contract => "review and sign it",
            DocumentKind::Invoice => "pay it securely",
        };
        match self {
            Self::DocumentIssued { link } => {
                let mut body = format!(
                    "{greeting}\n\n{agency} has sent you {} {} for \"{}\" ({total}).\n\n\
                     You can {ask} online:\n{link}\n",
                    article(label),
                    label.to_lowercase(),
                    doc.title,
                );
                if let Some(due) = doc.due_date {
                    body.push_str(&format!("\nPayment is due by {}.\n", due.format("%-d %B %Y")));
                }
                if let Some(expires_at) = doc.expires_at {
                    body.push_str(&format!(
                        "\nThis {} is valid until {}.\n",
                        label.to_lowercase(),
                        expires_at.format("%-d %B %Y")
                    ));
                }
                body.push_str(&format!("\n{sign_off}\n"));
                (format!("{label} {} from {agency}", doc.reference), body)
            }
            Self::Reminder { link } => (
                format!("Reminder: {label} {} is waiting for you", doc.reference),
                format!(
                    "{greeting}\n\nA quick reminder that {label} {} for \"{}\" ({total}) is still open.\n\n\
                     You can {ask} here:\n{link}\n\n\
                     Earlier links no longer work; please use this one.\n\n{sign_off}\n",
                    doc.reference, doc.title,
                ),
            ),
            Self::SignatureConfirmation => {
                let signed = doc
                    .signature
                    .as_ref()
                    .map(|s| {
                        format!(
                            "Signed by {} on {}.",
                            s.signer_name,
                            s.accepted_at.format("%-d %B %Y at %H:%M UTC")
                        )
                    })
                    .unwrap_or_default();
                (
                    format!("{label} {} signed", doc.reference),
                    format!(
                        "{greeting}\n\nThank you for signing {label} {} for \"{}\". {signed}\n\n\
                         A copy is attached for your records.\n\n{sign_off}\n",
                        doc.reference, doc.title,
                    ),
                )
            }
            Self::PaymentReceipt => {
                let paid = doc.paid_payment();
                let amount = paid
                    .and_then(|p| p.amount_captured)
                    .map(|a| doc.currency.format(a))
                    .unwrap_or(total);
                let when = paid
                    .and_then(|p| p.paid_at)
                    .map(|at| format!(" on {}", at.format("%-d %B %Y")))
                    .unwrap_or_default();
                (
                    format!("Receipt for {label} {}", doc.reference),
                    format!(
                        "{greeting}\n\nWe received your payment of {amount}{when} for {label} {}.\n\n\
                         A copy of the paid {} is attached.\n\n{sign_off}\n",
                        doc.reference,
                        label.to_lowercase(),
                    ),
                )
            }
        }
    }
}

fn article(word: &str) -> &'static str {
    match word.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn DocumentStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    config: Arc<DeskConfig>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: Arc<DeskConfig>,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            config,
        }
    }

    /// Send one email and log the attempt.
    pub async fn send(
        &self,
        id: &DocumentId,
        template: &Template,
        recipient: &str,
    ) -> Result<NotificationAttempt, DeskError> {
        let doc = self.store.get(id).await?;
        let attempt = self.deliver(&doc, template, recipient).await;
        self.store.append_notification(id, attempt.clone()).await?;
        Ok(attempt)
    }

    /// Send to several recipients concurrently. Each recipient gets its own
    /// attempt; one failure does not affect the others. Every attempt is
    /// written to the log even if an earlier write failed; the first write
    /// error is returned once all have been tried.
    pub async fn send_batch(
        &self,
        id: &DocumentId,
        template: &Template,
        recipients: &[String],
    ) -> Result<Vec<NotificationAttempt>, DeskError> {
        let doc = self.store.get(id).await?;
        let attempts = join_all(
            recipients
                .iter()
                .map(|recipient| self.deliver(&doc, template, recipient)),
        )
        .await;
        let mut first_error = None;
        for attempt in &attempts {
            if let Err(e) = self.store.append_notification(id, attempt.clone()).await {
                warn!(
                    document_id = %id,
                    recipient = %attempt.recipient,
                    error = %e,
                    "could not log notification attempt"
                );
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(attempts),
        }
    }

    /// The party, plus the agency inbox when one is configured.
    pub fn confirmation_recipients(&self, doc: &Document) -> Vec<String> {
        let mut recipients = vec![doc.party.email.clone()];
        if let Some(inbox) = &self.config.agency_inbox {
            if !inbox.eq_ignore_ascii_case(&doc.party.email) {
                recipients.push(inbox.clone());
            }
        }
        recipients
    }

    async fn deliver(
        &self,
        doc: &Document,
        template: &Template,
        recipient: &str,
    ) -> NotificationAttempt {
        let (subject, text) = template.compose(doc, &self.config.agency_name);
        let sent_at = self.clock.now();
        let attempt = |outcome, error_detail: Option<String>, provider_message_id| {
            NotificationAttempt {
                recipient: recipient.to_string(),
                subject: subject.clone(),
                template: template.kind(),
                sent_at,
                outcome,
                error_detail,
                provider_message_id,
            }
        };

        if !looks_like_email(recipient) {
            warn!(document_id = %doc.id, recipient, "invalid recipient address");
            return attempt(
                NotificationOutcome::Failed,
                Some("invalid recipient address".into()),
                None,
            );
        }

        let mut attachments = Vec::new();
        if template.attaches_pdf() {
            let options = RenderOptions {
                agency_name: self.config.agency_name.clone(),
                generated_at: sent_at,
            };
            match pdf::render(doc, &options) {
                Ok(bytes) => attachments.push(Attachment {
                    filename: format!("{}.pdf", doc.reference),
                    content_type: "application/pdf".into(),
                    bytes,
                }),
                Err(e) => {
                    warn!(document_id = %doc.id, error = %e, "pdf render failed, email not sent");
                    return attempt(NotificationOutcome::Failed, Some(e.to_string()), None);
                }
            }
        }

        let email = OutboundEmail {
            to: recipient.to_string(),
            subject: subject.clone(),
            text,
            attachments,
        };
        match self.mailer.deliver(&email).await {
            Ok(receipt) => {
                info!(
                    document_id = %doc.id,
                    recipient,
                    template = template.kind().as_str(),
                    message_id = %receipt.message_id,
                    "notification sent"
                );
                attempt(NotificationOutcome::Sent, None, Some(receipt.message_id))
            }
            Err(e) => {
                warn!(
                    document_id = %doc.id,
                    recipient,
                    template = template.kind().as_str(),
                    error = %e,
                    "notification failed"
                );
                attempt(NotificationOutcome::Failed, Some(e.to_string()), None)
            }
        }
    }
}
