//! Stripe-compatible checkout client.

use std::time::Duration;

use async_trait::async_trait;
use folio_core::Money;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::gateway::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, SessionState};

pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct CreatedSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RetrievedSession {
    status: Option<String>,
    payment_status: String,
    amount_total: Option<i64>,
    currency: Option<String>,
}

impl StripeGateway {
    /// `api_base` like `https://api.stripe.com` (trailing slash tolerated).
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GatewayError::Http)?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            timeout: config.timeout,
        })
    }

    fn transport(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            warn!(timeout = ?self.timeout, "gateway request timed out");
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Http(err)
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

fn checkout_form(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
    vec![
        ("mode", "payment".into()),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
        ("client_reference_id", request.document_id.to_string()),
        ("customer_email", request.customer_email.clone()),
        ("metadata[document_id]", request.document_id.to_string()),
        ("metadata[reference]", request.reference.clone()),
        ("line_items[0][quantity]", "1".into()),
        (
            "line_items[0][price_data][currency]",
            request.currency.code().into(),
        ),
        (
            "line_items[0][price_data][unit_amount]",
            request.amount.minor().to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]",
            request.description.clone(),
        ),
    ]
}

fn session_state(session: &RetrievedSession) -> SessionState {
    if session.payment_status == "paid" {
        return SessionState::Paid {
            amount: Money::from_minor(session.amount_total.unwrap_or_default()),
            currency: session.currency.clone().unwrap_or_default(),
        };
    }
    match session.status.as_deref() {
        Some("expired") => SessionState::Expired,
        // `complete` but unpaid: an asynchronous method is still clearing.
        Some("open") | Some("complete") | None => SessionState::Open,
        Some(other) => SessionState::Failed {
            reason: format!("session status {other}"),
        },
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        info!(
            document_id = %request.document_id,
            amount = %request.amount,
            currency = request.currency.code(),
            "creating checkout session"
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(request))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let created: CreatedSession = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| self.transport(e))?;
        let url = created.url.ok_or_else(|| {
            warn!(session_id = %created.id, "gateway returned a session without a url");
            GatewayError::Unavailable("session has no checkout url".into())
        })?;
        info!(session_id = %created.id, "checkout session created");
        Ok(CheckoutSession {
            id: created.id,
            url,
        })
    }

    async fn session_state(&self, session_id: &str) -> Result<SessionState, GatewayError> {
        let url = format!("{}/v1/checkout/sessions/{session_id}", self.api_base);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let session: RetrievedSession = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| self.transport(e))?;
        let state = session_state(&session);
        info!(session_id, state = ?state, "retrieved checkout session");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{Currency, DocumentId};

    fn retrieved(json: &str) -> RetrievedSession {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn paid_session_reports_amount() {
        let s = retrieved(
            r#"{"id":"cs_1","status":"complete","payment_status":"paid","amount_total":231000,"currency":"gbp"}"#,
        );
        assert_eq!(
            session_state(&s),
            SessionState::Paid {
                amount: Money::from_minor(231_000),
                currency: "gbp".into()
            }
        );
    }

    #[test]
    fn unpaid_sessions_are_open_or_expired() {
        let open = retrieved(r#"{"status":"open","payment_status":"unpaid"}"#);
        assert_eq!(session_state(&open), SessionState::Open);
        let clearing = retrieved(r#"{"status":"complete","payment_status":"unpaid"}"#);
        assert_eq!(session_state(&clearing), SessionState::Open);
        let expired = retrieved(r#"{"status":"expired","payment_status":"unpaid"}"#);
        assert_eq!(session_state(&expired), SessionState::Expired);
    }

    #[test]
    fn form_carries_total_as_single_line() {
        let request = CheckoutRequest {
            document_id: DocumentId::generate(),
            reference: "INV-7".into(),
            description: "Invoice INV-7".into(),
            customer_email: "ada@example.com".into(),
            amount: Money::from_minor(231_000),
            currency: Currency::Gbp,
            success_url: "https://x/return".into(),
            cancel_url: "https://x/cancel".into(),
        };
        let form = checkout_form(&request);
        let get = |k: &str| form.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("231000"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("gbp"));
        assert_eq!(get("mode"), Some("payment"));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let gateway = StripeGateway::new(&GatewayConfig {
            api_base: "http://localhost:12111/".into(),
            ..GatewayConfig::default()
        })
        .unwrap();
        assert_eq!(gateway.api_base, "http://localhost:12111");
    }

    #[tokio::test]
    async fn silent_gateway_times_out() {
        // Accepts the connection and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let gateway = StripeGateway::new(&GatewayConfig {
            api_base: format!("http://{addr}"),
            secret_key: "sk_test".into(),
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        let err = gateway.session_state("cs_1").await.unwrap_err();
        assert!(
            matches!(err, GatewayError::Timeout(t) if t == Duration::from_millis(200)),
            "{err:?}"
        );
        hold.abort();
    }
}
