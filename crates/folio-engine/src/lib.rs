//! Lifecycle protocols.
//!
//! Each service owns one protocol and talks to the outside world only through
//! the [`DocumentStore`](folio_store::DocumentStore),
//! [`PaymentGateway`](folio_connect::PaymentGateway) and
//! [`Mailer`](folio_connect::Mailer) seams. [`Desk`] wires them together.

mod access;
mod clock;
mod desk;
mod documents;
mod error;
mod notify;
mod payments;
mod signing;

pub use access::AccessResolver;
pub use clock::{Clock, SystemClock};
pub use desk::Desk;
pub use documents::{DocumentService, Issued};
pub use error::DeskError;
pub use notify::{NotificationDispatcher, Template};
pub use payments::{PaymentBroker, WebhookAck};
pub use signing::{SignRequest, SignatureCapture};
