//! The SaaS boundary: payment gateway, email provider, and gateway webhooks.
//!
//! The traits are always available so protocols can be tested against fakes;
//! the HTTP clients sit behind the `http` feature.

pub mod config;
pub mod gateway;
pub mod mail;
pub mod webhook;

#[cfg(feature = "http")]
pub mod resend;
#[cfg(feature = "http")]
pub mod stripe;

pub use config::{GatewayConfig, MailConfig};
pub use gateway::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, SessionState,
    UnconfiguredGateway,
};
pub use mail::{Attachment, DeliveryReceipt, LogMailer, MailError, Mailer, OutboundEmail};
pub use webhook::{WebhookError, WebhookEvent, WebhookVerifier};

#[cfg(feature = "http")]
pub use resend::ResendMailer;
#[cfg(feature = "http")]
pub use stripe::StripeGateway;
