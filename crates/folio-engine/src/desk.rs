use std::sync::Arc;

use folio_connect::{Mailer, PaymentGateway, WebhookVerifier};
use folio_core::DeskConfig;
use folio_store::DocumentStore;

use crate::access::AccessResolver;
use crate::clock::{Clock, SystemClock};
use crate::documents::DocumentService;
use crate::error::DeskError;
use crate::notify::NotificationDispatcher;
use crate::payments::PaymentBroker;
use crate::signing::SignatureCapture;

/// All protocols wired to one store, gateway, mailer and clock.
///
/// Cheap to clone; every service shares the same backends.
#[derive(Clone)]
pub struct Desk {
    pub config: Arc<DeskConfig>,
    pub documents: DocumentService,
    pub access: AccessResolver,
    pub signatures: SignatureCapture,
    pub payments: PaymentBroker,
    pub notifications: NotificationDispatcher,
}

impl Desk {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        config: DeskConfig,
        webhook_secret: &str,
    ) -> Result<Self, DeskError> {
        Self::with_clock(
            store,
            gateway,
            mailer,
            config,
            webhook_secret,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        config: DeskConfig,
        webhook_secret: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DeskError> {
        config.validate()?;
        let config = Arc::new(config);
        let verifier = Arc::new(WebhookVerifier::new(
            webhook_secret,
            config.webhook_tolerance_secs,
        ));

        let access = AccessResolver::new(store.clone(), clock.clone());
        let notifications =
            NotificationDispatcher::new(store.clone(), mailer, clock.clone(), config.clone());
        let documents = DocumentService::new(
            access.clone(),
            store.clone(),
            notifications.clone(),
            clock.clone(),
            config.clone(),
        );
        let signatures = SignatureCapture::new(
            access.clone(),
            store.clone(),
            notifications.clone(),
            clock.clone(),
        );
        let payments = PaymentBroker::new(
            access.clone(),
            store,
            gateway,
            notifications.clone(),
            clock,
            config.clone(),
            verifier,
        );

        Ok(Self {
            config,
            documents,
            access,
            signatures,
            payments,
            notifications,
        })
    }
}
