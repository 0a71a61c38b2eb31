mod common;

use std::sync::atomic::Ordering;

use folio_connect::{SessionState, WebhookVerifier};
use folio_core::{
    DocumentKind, Money, PaymentFailure, PaymentStatus, Status, TemplateKind,
};
use folio_engine::DeskError;
use folio_store::DocumentStore;

use common::{Harness, TOTAL, WEBHOOK_SECRET, harness, new_document};

/// A sent invoice and the plaintext credential the party holds.
async fn sent_invoice(h: &Harness) -> (folio_core::DocumentId, String) {
    let doc = h
        .desk
        .documents
        .create(new_document(DocumentKind::Invoice))
        .await
        .unwrap();
    let issued = h.desk.documents.send(&doc.id).await.unwrap();
    (doc.id, issued.credential.expose().to_string())
}

fn receipts(h: &Harness) -> usize {
    h.mailer.sent_with_subject("Receipt for").len()
}

#[tokio::test]
async fn checkout_charges_the_invoice_total() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;

    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    assert_eq!(session.id, "cs_test_1");
    assert!(session.url.starts_with("https://pay.example/"));

    let requests = h.gateway.requests();
    let request = &requests[0];
    assert_eq!(request.amount, TOTAL);
    assert_eq!(request.document_id, id);
    assert_eq!(
        request.success_url,
        "https://folio.example/payments/return?session_id={CHECKOUT_SESSION_ID}"
    );
    assert_eq!(
        request.cancel_url,
        format!("https://folio.example/d/{credential}?checkout=cancelled")
    );

    let stored = h.store.get(&id).await.unwrap();
    assert_eq!(stored.payments.len(), 1);
    assert_eq!(stored.payments[0].status, PaymentStatus::Pending);
    assert_eq!(stored.payments[0].amount_expected, TOTAL);
    assert_eq!(stored.status, Status::Sent);
}

#[tokio::test]
async fn checkout_preconditions() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    assert!(matches!(
        h.desk.payments.checkout(&credential, false).await,
        Err(DeskError::TermsNotAccepted)
    ));

    let quote = h
        .desk
        .documents
        .create(new_document(DocumentKind::Quote))
        .await
        .unwrap();
    let issued = h.desk.documents.send(&quote.id).await.unwrap();
    assert!(matches!(
        h.desk.payments.checkout(issued.credential.expose(), true).await,
        Err(DeskError::DocumentNotActionable(_))
    ));

    let draft = h
        .desk
        .documents
        .create(new_document(DocumentKind::Invoice))
        .await
        .unwrap();
    assert!(matches!(
        h.desk.payments.create_session(&draft.id, true).await,
        Err(DeskError::DocumentNotActionable(_))
    ));

    h.desk.documents.cancel(&id).await.unwrap();
    assert!(matches!(
        h.desk.payments.checkout(&credential, true).await,
        Err(DeskError::DocumentNotActionable(_))
    ));
    assert!(h.gateway.requests().is_empty());
}

#[tokio::test]
async fn zero_total_invoice_cannot_be_paid() {
    let h = harness();
    let mut new = new_document(DocumentKind::Invoice);
    for item in &mut new.line_items {
        item.unit_price = Money::ZERO;
    }
    let doc = h.desk.documents.create(new).await.unwrap();
    h.desk.documents.send(&doc.id).await.unwrap();
    assert!(matches!(
        h.desk.payments.create_session(&doc.id, true).await,
        Err(DeskError::DocumentNotActionable(_))
    ));
}

#[tokio::test]
async fn gateway_outage_leaves_document_unchanged() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let before = h.store.get(&id).await.unwrap();

    h.gateway.unavailable.store(true, Ordering::SeqCst);
    let err = h.desk.payments.checkout(&credential, true).await.unwrap_err();
    assert!(matches!(err, DeskError::SessionCreationFailed(_)), "{err}");
    assert!(!err.user_message().contains("connection refused"));

    let after = h.store.get(&id).await.unwrap();
    assert_eq!(after.payments, before.payments);
    assert_eq!(after.status, before.status);
}

#[tokio::test]
async fn confirm_is_idempotent_and_sends_one_receipt() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();

    // Party came back before paying.
    let pending = h.desk.payments.confirm(&session.id).await.unwrap();
    assert_eq!(pending.status, PaymentStatus::Pending);
    assert_eq!(h.store.get(&id).await.unwrap().status, Status::Sent);

    h.gateway.pay(&session.id, TOTAL);
    let first = h.desk.payments.confirm(&session.id).await.unwrap();
    assert_eq!(first.status, PaymentStatus::Paid);
    assert_eq!(first.amount_captured, Some(TOTAL));

    // Gateway redirect and webhook race; the second is a no-op.
    let second = h.desk.payments.confirm(&session.id).await.unwrap();
    assert_eq!(second, first);

    let stored = h.store.get(&id).await.unwrap();
    assert_eq!(stored.status, Status::Paid);
    let paid: Vec<_> = stored
        .transitions
        .iter()
        .filter(|t| t.to == Status::Paid)
        .collect();
    assert_eq!(paid.len(), 1);
    assert_eq!(receipts(&h), 1);
    let logged = stored
        .notifications
        .iter()
        .filter(|n| n.template == TemplateKind::PaymentReceipt)
        .count();
    assert_eq!(logged, 1);

    let receipt = h.mailer.sent_with_subject("Receipt for");
    assert_eq!(receipt[0].attachments.len(), 1);
    assert!(receipt[0].text.contains("£2,520.00"));

    let done = h.desk.documents.complete(&id).await.unwrap();
    assert_eq!(done.status, Status::Completed);
}

#[tokio::test]
async fn concurrent_confirms_settle_once() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    h.gateway.pay(&session.id, TOTAL);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let payments = h.desk.payments.clone();
            let session_id = session.id.clone();
            tokio::spawn(async move { payments.confirm(&session_id).await })
        })
        .collect();
    for task in tasks {
        let record = task.await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Paid);
    }

    assert_eq!(receipts(&h), 1);
    let stored = h.store.get(&id).await.unwrap();
    assert_eq!(
        stored
            .transitions
            .iter()
            .filter(|t| t.to == Status::Paid)
            .count(),
        1
    );
}

#[tokio::test]
async fn short_payment_is_rejected() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    let short = Money::from_minor(TOTAL.minor() - 1);
    h.gateway.pay(&session.id, short);

    let err = h.desk.payments.confirm(&session.id).await.unwrap_err();
    assert!(matches!(
        err,
        DeskError::AmountMismatch { expected, captured } if expected == TOTAL && captured == short
    ));
    // Asking again gives the same answer.
    assert!(matches!(
        h.desk.payments.confirm(&session.id).await,
        Err(DeskError::AmountMismatch { .. })
    ));

    let stored = h.store.get(&id).await.unwrap();
    assert_eq!(stored.status, Status::Sent);
    assert_eq!(stored.payments[0].status, PaymentStatus::Failed);
    assert!(matches!(
        stored.payments[0].failure,
        Some(PaymentFailure::AmountMismatch { .. })
    ));
    assert_eq!(receipts(&h), 0);

    // A fresh session can still pay in full.
    let retry = h.desk.payments.checkout(&credential, true).await.unwrap();
    assert_ne!(retry.id, session.id);
    h.gateway.pay(&retry.id, TOTAL);
    let paid = h.desk.payments.confirm(&retry.id).await.unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);
    assert_eq!(h.store.get(&id).await.unwrap().status, Status::Paid);
}

#[tokio::test]
async fn gateway_failures_settle_as_failed() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    h.gateway.set_state(&session.id, SessionState::Expired);

    let record = h.desk.payments.confirm(&session.id).await.unwrap();
    assert_eq!(record.status, PaymentStatus::Failed);
    assert!(matches!(record.failure, Some(PaymentFailure::Gateway { .. })));
    assert_eq!(h.store.get(&id).await.unwrap().status, Status::Sent);
}

#[tokio::test]
async fn capture_after_cancel_is_flagged_not_applied() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    h.desk.documents.cancel(&id).await.unwrap();
    h.gateway.pay(&session.id, TOTAL);

    let record = h.desk.payments.confirm(&session.id).await.unwrap();
    assert_eq!(record.status, PaymentStatus::Failed);
    assert_eq!(
        record.failure,
        Some(PaymentFailure::DocumentNotActionable {
            status: Status::Cancelled
        })
    );
    assert_eq!(h.store.get(&id).await.unwrap().status, Status::Cancelled);
    assert_eq!(receipts(&h), 0);
}

#[tokio::test]
async fn confirm_errors() {
    let h = harness();
    assert!(matches!(
        h.desk.payments.confirm("cs_unknown").await,
        Err(DeskError::NotFound)
    ));

    let (_, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    h.gateway.unavailable.store(true, Ordering::SeqCst);
    assert!(matches!(
        h.desk.payments.confirm(&session.id).await,
        Err(DeskError::Gateway(_))
    ));
}

#[tokio::test]
async fn failed_receipt_does_not_undo_payment() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    h.gateway.pay(&session.id, TOTAL);
    h.mailer.down.store(true, Ordering::SeqCst);

    let record = h.desk.payments.confirm(&session.id).await.unwrap();
    assert_eq!(record.status, PaymentStatus::Paid);
    let stored = h.store.get(&id).await.unwrap();
    assert_eq!(stored.status, Status::Paid);
    let receipt = stored
        .notifications
        .iter()
        .find(|n| n.template == TemplateKind::PaymentReceipt)
        .unwrap();
    assert!(receipt.error_detail.is_some());
}

fn event(kind: &str, object: &str, id: &str) -> String {
    format!(
        r#"{{"id":"evt_1","type":"{kind}","data":{{"object":{{"id":"{id}","object":"{object}"}}}}}}"#
    )
}

#[tokio::test]
async fn webhook_confirms_the_session() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    h.gateway.pay(&session.id, TOTAL);

    let payload = event("checkout.session.completed", "checkout.session", &session.id);
    let signer = WebhookVerifier::new(WEBHOOK_SECRET, 300);
    let header = signer.sign(payload.as_bytes(), h.now().timestamp());

    let ack = h
        .desk
        .payments
        .handle_webhook(payload.as_bytes(), &header)
        .await
        .unwrap();
    assert_eq!(ack.event_id, "evt_1");
    assert_eq!(ack.payment, Some(PaymentStatus::Paid));
    assert_eq!(h.store.get(&id).await.unwrap().status, Status::Paid);

    // Redelivery is harmless.
    let ack = h
        .desk
        .payments
        .handle_webhook(payload.as_bytes(), &header)
        .await
        .unwrap();
    assert_eq!(ack.payment, Some(PaymentStatus::Paid));
    assert_eq!(receipts(&h), 1);
}

#[tokio::test]
async fn webhook_rejects_forgeries_and_ignores_noise() {
    let h = harness();
    let (id, credential) = sent_invoice(&h).await;
    let session = h.desk.payments.checkout(&credential, true).await.unwrap();
    h.gateway.pay(&session.id, TOTAL);
    let now = h.now().timestamp();

    let payload = event("checkout.session.completed", "checkout.session", &session.id);
    let forged = WebhookVerifier::new("whsec_guess", 300).sign(payload.as_bytes(), now);
    assert!(matches!(
        h.desk.payments.handle_webhook(payload.as_bytes(), &forged).await,
        Err(DeskError::InvalidWebhook(_))
    ));
    assert_eq!(h.store.get(&id).await.unwrap().status, Status::Sent);

    let signer = WebhookVerifier::new(WEBHOOK_SECRET, 300);
    let refund = event("charge.refunded", "charge", "ch_1");
    let ack = h
        .desk
        .payments
        .handle_webhook(refund.as_bytes(), &signer.sign(refund.as_bytes(), now))
        .await
        .unwrap();
    assert_eq!(ack.payment, None);

    let stranger = event("checkout.session.completed", "checkout.session", "cs_elsewhere");
    let ack = h
        .desk
        .payments
        .handle_webhook(stranger.as_bytes(), &signer.sign(stranger.as_bytes(), now))
        .await
        .unwrap();
    assert_eq!(ack.payment, None);
    assert_eq!(h.store.get(&id).await.unwrap().status, Status::Sent);
}
