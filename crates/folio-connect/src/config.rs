use std::time::Duration;

/// Upper bound on a single provider round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Payment gateway credentials. `api_base` is overridable for test doubles.
///
/// The webhook signing secret is not here: it belongs to the verifier that
/// the desk owns, not to the outbound client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_base: String,
    pub secret_key: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".into(),
            secret_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_base: String,
    pub api_key: String,
    /// Sender, e.g. `Folio Studio <studio@example.com>`.
    pub from: String,
    pub timeout: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.resend.com".into(),
            api_key: String::new(),
            from: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}
