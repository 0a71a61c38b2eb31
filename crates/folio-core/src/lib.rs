pub mod config;
pub mod credential;
pub mod document;
pub mod error;
pub mod money;
pub mod pdf;
pub mod records;
pub mod status;

pub use config::{ConfigError, DeskConfig};
pub use credential::{AccessCredential, CredentialDigest, CredentialError};
pub use document::{Document, DocumentId, DocumentKind, DocumentView, LineItem, NewDocument, Party};
pub use error::{LifecycleError, ValidationError};
pub use money::{Currency, Money, TaxRate, Totals};
pub use pdf::{RenderError, RenderOptions};
pub use records::{
    GatewayOutcome, NotificationAttempt, NotificationOutcome, PaymentFailure, PaymentRecord,
    PaymentStatus, SettleOutcome, SignatureRecord, StatusTransition, TemplateKind,
};
pub use status::Status;
