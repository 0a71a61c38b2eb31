//! Gateway webhook verification.
//!
//! The gateway signs each delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>` where the MAC is HMAC-SHA256 over
//! `"<t>.<raw body>"` keyed by the endpoint secret.

use chrono::{DateTime, Utc};
use ring::hmac;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature does not match payload")]
    BadSignature,
    #[error("signature timestamp outside tolerance")]
    Stale,
    #[error("malformed event payload: {0}")]
    Payload(String),
}

/// A verified event. Only the fields the broker acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: String,
    /// Set when the event's object is a checkout session.
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    id: Option<String>,
    object: Option<String>,
}

pub struct WebhookVerifier {
    key: hmac::Key,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: &str, tolerance_secs: u64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            tolerance_secs: i64::try_from(tolerance_secs).unwrap_or(i64::MAX),
        }
    }

    /// Check the signature and freshness, then parse the event.
    pub fn verify(
        &self,
        header: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent, WebhookError> {
        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => {
                    timestamp = Some(v.parse::<i64>().map_err(|_| WebhookError::MalformedHeader)?)
                }
                Some(("v1", v)) => candidates.push(v),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if candidates.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        let signed = signed_payload(timestamp, payload);
        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|tag| hmac::verify(&self.key, &signed, &tag).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(WebhookError::BadSignature);
        }
        if (now.timestamp() - timestamp).abs() > self.tolerance_secs {
            return Err(WebhookError::Stale);
        }

        let raw: RawEvent =
            serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))?;
        let session_id = match raw.data.object.object.as_deref() {
            Some("checkout.session") => raw.data.object.id,
            _ => None,
        };
        Ok(WebhookEvent {
            id: raw.id,
            kind: raw.kind,
            session_id,
        })
    }

    /// Produce a header the way the gateway does. Used by test doubles.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let tag = hmac::sign(&self.key, &signed_payload(timestamp, payload));
        format!("t={timestamp},v1={}", hex::encode(tag.as_ref()))
    }
}

fn signed_payload(timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(payload);
    signed
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = r#"{
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {"object": {"id": "cs_test_123", "object": "checkout.session"}}
    }"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test", 300)
    }

    #[test]
    fn accepts_valid_signature() {
        let v = verifier();
        let now = Utc::now();
        let header = v.sign(EVENT.as_bytes(), now.timestamp());
        let event = v.verify(&header, EVENT.as_bytes(), now).unwrap();
        assert_eq!(event.kind, "checkout.session.completed");
        assert_eq!(event.session_id.as_deref(), Some("cs_test_123"));
    }

    #[test]
    fn rejects_tampered_payload() {
        let v = verifier();
        let now = Utc::now();
        let header = v.sign(EVENT.as_bytes(), now.timestamp());
        let tampered = EVENT.replace("cs_test_123", "cs_test_999");
        assert_eq!(
            v.verify(&header, tampered.as_bytes(), now),
            Err(WebhookError::BadSignature)
        );
    }

    #[test]
    fn rejects_other_secret() {
        let now = Utc::now();
        let header = WebhookVerifier::new("whsec_other", 300).sign(EVENT.as_bytes(), now.timestamp());
        assert_eq!(
            verifier().verify(&header, EVENT.as_bytes(), now),
            Err(WebhookError::BadSignature)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let v = verifier();
        let now = Utc::now();
        let header = v.sign(EVENT.as_bytes(), now.timestamp() - 3600);
        assert_eq!(
            v.verify(&header, EVENT.as_bytes(), now),
            Err(WebhookError::Stale)
        );
    }

    #[test]
    fn rejects_malformed_header() {
        let v = verifier();
        for header in ["", "t=abc,v1=00", "v1=00", "t=1"] {
            assert_eq!(
                v.verify(header, EVENT.as_bytes(), Utc::now()),
                Err(WebhookError::MalformedHeader),
                "{header}"
            );
        }
    }

    #[test]
    fn non_session_objects_carry_no_session() {
        let payload = r#"{"id":"evt_2","type":"charge.refunded","data":{"object":{"id":"ch_1","object":"charge"}}}"#;
        let v = verifier();
        let now = Utc::now();
        let header = v.sign(payload.as_bytes(), now.timestamp());
        let event = v.verify(&header, payload.as_bytes(), now).unwrap();
        assert_eq!(event.session_id, None);
    }
}
