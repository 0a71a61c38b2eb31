//! Process configuration. Every setting is a flag with an environment
//! fallback, resolved once at start-up.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use folio_connect::{
    GatewayConfig, LogMailer, MailConfig, Mailer, PaymentGateway, ResendMailer, StripeGateway,
    UnconfiguredGateway,
};
use folio_core::DeskConfig;
use folio_engine::Desk;
use folio_store::DuckStore;
use ring::rand::{SecureRandom, SystemRandom};

#[derive(Debug, Args)]
pub struct DeskArgs {
    /// Agency name shown on PDFs and emails
    #[arg(long, env = "FOLIO_AGENCY_NAME", default_value = "Folio Studio", global = true)]
    pub agency_name: String,

    /// Copy recipient for signature confirmations and payment receipts
    #[arg(long, env = "FOLIO_AGENCY_INBOX", global = true)]
    pub agency_inbox: Option<String>,

    /// Public origin used in document links and gateway return URLs
    #[arg(
        long,
        env = "FOLIO_PUBLIC_URL",
        default_value = "http://localhost:3000",
        global = true
    )]
    pub public_url: String,

    /// Maximum age of a gateway webhook signature, in seconds
    #[arg(long, env = "FOLIO_WEBHOOK_TOLERANCE_SECS", default_value_t = 300, global = true)]
    pub webhook_tolerance_secs: u64,
}

impl DeskArgs {
    pub fn config(&self) -> DeskConfig {
        DeskConfig {
            agency_name: self.agency_name.clone(),
            agency_inbox: self.agency_inbox.clone().filter(|s| !s.trim().is_empty()),
            public_base_url: self.public_url.clone(),
            webhook_tolerance_secs: self.webhook_tolerance_secs,
        }
    }
}

#[derive(Debug, Args)]
pub struct GatewayArgs {
    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true, global = true)]
    pub stripe_secret_key: Option<String>,

    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true, global = true)]
    pub stripe_webhook_secret: Option<String>,

    #[arg(
        long,
        env = "STRIPE_API_BASE",
        default_value = "https://api.stripe.com",
        global = true
    )]
    pub stripe_api_base: String,

    /// Per-request timeout for gateway calls, in seconds
    #[arg(long, env = "STRIPE_TIMEOUT_SECS", default_value_t = 15, global = true)]
    pub stripe_timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct MailArgs {
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true, global = true)]
    pub resend_api_key: Option<String>,

    /// Sender, e.g. "Folio Studio <studio@example.com>"
    #[arg(long, env = "RESEND_FROM", global = true)]
    pub mail_from: Option<String>,

    #[arg(
        long,
        env = "RESEND_API_BASE",
        default_value = "https://api.resend.com",
        global = true
    )]
    pub resend_api_base: String,

    /// Per-request timeout for email delivery, in seconds
    #[arg(long, env = "RESEND_TIMEOUT_SECS", default_value_t = 15, global = true)]
    pub resend_timeout_secs: u64,
}

/// Open the store and wire every protocol to it.
pub fn build_desk(
    db: &Path,
    desk: &DeskArgs,
    gateway: &GatewayArgs,
    mail: &MailArgs,
) -> anyhow::Result<(Desk, Arc<DuckStore>)> {
    let store = Arc::new(
        DuckStore::open_persistent(db)
            .with_context(|| format!("opening document store at {}", db.display()))?,
    );

    let webhook_secret = match non_empty(&gateway.stripe_webhook_secret) {
        Some(secret) => secret.to_string(),
        None => {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set; gateway webhooks will be rejected");
            unguessable_secret()?
        }
    };

    let payment_gateway: Arc<dyn PaymentGateway> = match non_empty(&gateway.stripe_secret_key) {
        Some(secret_key) => Arc::new(
            StripeGateway::new(&GatewayConfig {
                api_base: gateway.stripe_api_base.clone(),
                secret_key: secret_key.to_string(),
                timeout: Duration::from_secs(gateway.stripe_timeout_secs),
            })
            .context("building payment gateway client")?,
        ),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set; invoices cannot be paid");
            Arc::new(UnconfiguredGateway)
        }
    };

    let mailer: Arc<dyn Mailer> = match (non_empty(&mail.resend_api_key), non_empty(&mail.mail_from))
    {
        (Some(api_key), Some(from)) => Arc::new(
            ResendMailer::new(&MailConfig {
                api_base: mail.resend_api_base.clone(),
                api_key: api_key.to_string(),
                from: from.to_string(),
                timeout: Duration::from_secs(mail.resend_timeout_secs),
            })
            .context("building email client")?,
        ),
        _ => {
            tracing::warn!("RESEND_API_KEY or RESEND_FROM not set; emails are logged, not sent");
            Arc::new(LogMailer::new())
        }
    };

    let desk = Desk::new(
        store.clone(),
        payment_gateway,
        mailer,
        desk.config(),
        &webhook_secret,
    )?;
    Ok((desk, store))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn unguessable_secret() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| anyhow::anyhow!("system random source unavailable"))?;
    Ok(hex::encode(bytes))
}
