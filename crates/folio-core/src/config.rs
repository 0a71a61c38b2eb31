//! Deployment settings shared by every protocol. Built once at process
//! start and passed in; nothing reads the environment mid-request.

use thiserror::Error;

use crate::credential::AccessCredential;
use crate::document::looks_like_email;

/// Placeholder the gateway substitutes with the real session id on redirect.
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Missing(&'static str),

    #[error("public base URL must start with http:// or https://: {0}")]
    BaseUrl(String),

    #[error("agency inbox is not an email address: {0}")]
    Inbox(String),
}

#[derive(Debug, Clone)]
pub struct DeskConfig {
    /// Shown on PDFs and in email sign-offs.
    pub agency_name: String,
    /// Receives a copy of signature confirmations and payment receipts.
    pub agency_inbox: Option<String>,
    /// Origin of the party-facing site, e.g. `https://folio.example.com`.
    pub public_base_url: String,
    /// Maximum age of a gateway webhook signature.
    pub webhook_tolerance_secs: u64,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            agency_name: "Folio Studio".into(),
            agency_inbox: None,
            public_base_url: "http://localhost:3000".into(),
            webhook_tolerance_secs: 300,
        }
    }
}

impl DeskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agency_name.trim().is_empty() {
            return Err(ConfigError::Missing("agency name"));
        }
        let url = self.public_base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Missing("public base URL"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::BaseUrl(url.to_string()));
        }
        if let Some(inbox) = &self.agency_inbox {
            if !looks_like_email(inbox) {
                return Err(ConfigError::Inbox(inbox.clone()));
            }
        }
        Ok(())
    }

    fn base(&self) -> &str {
        self.public_base_url.trim().trim_end_matches('/')
    }

    /// Absolute URL for a path on the party-facing site.
    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base(), path.trim_start_matches('/'))
    }

    /// The link handed to the party. The only place the plaintext ends up.
    pub fn document_link(&self, credential: &AccessCredential) -> String {
        format!("{}/d/{}", self.base(), credential.expose())
    }

    pub fn payment_success_url(&self) -> String {
        format!(
            "{}/payments/return?session_id={SESSION_ID_PLACEHOLDER}",
            self.base()
        )
    }

    pub fn payment_cancel_url(&self, credential: &AccessCredential) -> String {
        format!("{}?checkout=cancelled", self.document_link(credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(DeskConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_settings() {
        let mut cfg = DeskConfig::default();
        cfg.public_base_url = "folio.example.com".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::BaseUrl(_))));

        let mut cfg = DeskConfig::default();
        cfg.agency_inbox = Some("inbox".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::Inbox(_))));

        let mut cfg = DeskConfig::default();
        cfg.agency_name = "  ".into();
        assert_eq!(cfg.validate(), Err(ConfigError::Missing("agency name")));
    }

    #[test]
    fn links_strip_trailing_slash() {
        let cfg = DeskConfig {
            public_base_url: "https://folio.example.com/".into(),
            ..DeskConfig::default()
        };
        let credential = AccessCredential::parse(&"a".repeat(32)).unwrap();
        assert_eq!(
            cfg.document_link(&credential),
            format!("https://folio.example.com/d/{}", "a".repeat(32))
        );
        assert_eq!(
            cfg.payment_success_url(),
            "https://folio.example.com/payments/return?session_id={CHECKOUT_SESSION_ID}"
        );
    }
}
