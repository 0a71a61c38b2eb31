//! Test doubles shared by the engine integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use folio_connect::{
    CheckoutRequest, CheckoutSession, DeliveryReceipt, GatewayError, MailError, Mailer,
    OutboundEmail, PaymentGateway, SessionState,
};
use folio_core::{
    Currency, DeskConfig, DocumentKind, LineItem, Money, NewDocument, Party, TaxRate,
};
use folio_engine::{Clock, Desk};
use folio_store::MemoryStore;

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const AGENCY_INBOX: &str = "studio@folio.example";

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Mutex::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Gateway whose session states are set by the test.
#[derive(Default)]
pub struct ScriptedGateway {
    next: AtomicU64,
    sessions: Mutex<HashMap<String, SessionState>>,
    requests: Mutex<Vec<CheckoutRequest>>,
    pub unavailable: AtomicBool,
}

impl ScriptedGateway {
    pub fn set_state(&self, session_id: &str, state: SessionState) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), state);
    }

    pub fn pay(&self, session_id: &str, amount: Money) {
        self.set_state(
            session_id,
            SessionState::Paid {
                amount,
                currency: "gbp".into(),
            },
        );
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("connection refused".into()));
        }
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{n}");
        self.set_state(&id, SessionState::Open);
        self.requests.lock().unwrap().push(request.clone());
        Ok(CheckoutSession {
            url: format!("https://pay.example/c/{id}"),
            id,
        })
    }

    async fn session_state(&self, session_id: &str) -> Result<SessionState, GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("connection refused".into()));
        }
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::Server {
                status: 404,
                body: "no such session".into(),
            })
    }
}

/// Records every email; can be told to reject everything or one address.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    reject: Mutex<HashSet<String>>,
    pub down: AtomicBool,
}

impl RecordingMailer {
    pub fn reject(&self, address: &str) {
        self.reject.lock().unwrap().insert(address.to_string());
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_with_subject(&self, prefix: &str) -> Vec<OutboundEmail> {
        self.sent()
            .into_iter()
            .filter(|e| e.subject.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn deliver(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, MailError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(MailError::Server {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        if self.reject.lock().unwrap().contains(&email.to) {
            return Err(MailError::Rejected(format!("{} bounced", email.to)));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(email.clone());
        Ok(DeliveryReceipt {
            message_id: format!("msg_{}", sent.len()),
        })
    }
}

pub struct Harness {
    pub desk: Desk,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

pub fn harness() -> Harness {
    harness_with(DeskConfig {
        public_base_url: "https://folio.example".into(),
        ..DeskConfig::default()
    })
}

pub fn harness_with_inbox() -> Harness {
    harness_with(DeskConfig {
        public_base_url: "https://folio.example".into(),
        agency_inbox: Some(AGENCY_INBOX.into()),
        ..DeskConfig::default()
    })
}

fn harness_with(config: DeskConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::default());
    let mailer = Arc::new(RecordingMailer::default());
    let clock = Arc::new(ManualClock::new());
    let desk = Desk::with_clock(
        store.clone(),
        gateway.clone(),
        mailer.clone(),
        config,
        WEBHOOK_SECRET,
        clock.clone(),
    )
    .unwrap();
    Harness {
        desk,
        store,
        gateway,
        mailer,
        clock,
    }
}

/// £1,800 design plus £300 hosting at 20 %: total £2,520.00.
pub fn new_document(kind: DocumentKind) -> NewDocument {
    NewDocument {
        kind,
        reference: match kind {
            DocumentKind::Quote => "Q-2026-031",
            DocumentKind::Invoice => "INV-2026-107",
            DocumentKind::Contract => "AGR-2026-009",
        }
        .into(),
        title: "Spring campaign".into(),
        party: Party {
            name: "Katherine Johnson".into(),
            email: "katherine@client.example".into(),
            company: Some("Orbital Ltd".into()),
            phone: None,
            address: None,
        },
        line_items: vec![
            LineItem {
                description: "Campaign design".into(),
                quantity: 1,
                unit_price: Money::from_major(1800),
            },
            LineItem {
                description: "Landing page hosting (months)".into(),
                quantity: 3,
                unit_price: Money::from_major(100),
            },
        ],
        tax_rate: TaxRate::percent(20),
        currency: Currency::Gbp,
        terms: Some("Payment due within 14 days.".into()),
        expires_at: None,
        due_date: None,
    }
}

pub const TOTAL: Money = Money::from_minor(252_000);
