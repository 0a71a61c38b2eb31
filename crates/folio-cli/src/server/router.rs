use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::handlers;
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/documents",
            get(handlers::list_documents).post(handlers::create_document),
        )
        .route("/documents/:id", get(handlers::get_document))
        .route("/documents/:id/send", post(handlers::send_document))
        .route("/documents/:id/reissue", post(handlers::reissue_document))
        .route("/documents/:id/remind", post(handlers::remind_document))
        .route("/documents/:id/cancel", post(handlers::cancel_document))
        .route("/documents/:id/complete", post(handlers::complete_document))
        .route("/expire", post(handlers::expire_documents))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let public = Router::new()
        .route("/documents/:credential", get(handlers::view_document))
        .route("/documents/:credential/pdf", get(handlers::download_pdf))
        .route("/documents/:credential/sign", post(handlers::sign_document))
        .route(
            "/documents/:credential/checkout",
            post(handlers::start_checkout),
        )
        .route("/payments/confirm", post(handlers::confirm_payment))
        .route("/webhooks/gateway", post(handlers::gateway_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/admin", admin)
        .nest("/api", public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    if !state.is_admin(token) {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use folio_connect::{
        CheckoutRequest, CheckoutSession, GatewayError, LogMailer, PaymentGateway, SessionState,
        WebhookVerifier,
    };
    use folio_core::DeskConfig;
    use folio_engine::Desk;
    use folio_store::MemoryStore;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    const TOKEN: &str = "admin-secret";
    const WEBHOOK_SECRET: &str = "whsec_router";

    /// Every session is immediately paid in full.
    struct PaidGateway;

    #[async_trait]
    impl PaymentGateway for PaidGateway {
        async fn create_checkout(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutSession, GatewayError> {
            Ok(CheckoutSession {
                id: format!("cs_{}", request.reference),
                url: "https://pay.example/c".into(),
            })
        }

        async fn session_state(&self, _session_id: &str) -> Result<SessionState, GatewayError> {
            Ok(SessionState::Paid {
                amount: folio_core::Money::from_minor(11_000),
                currency: "gbp".into(),
            })
        }
    }

    fn app() -> Router {
        let desk = Desk::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PaidGateway),
            Arc::new(LogMailer::new()),
            DeskConfig::default(),
            WEBHOOK_SECRET,
        )
        .unwrap();
        create_router(AppState::new(desk, TOKEN))
    }

    fn document_json(kind: &str) -> Value {
        json!({
            "kind": kind,
            "reference": "R-7",
            "title": "Logo",
            "party": {"name": "Mary Jackson", "email": "mary@client.example"},
            "line_items": [{"description": "Logo design", "quantity": 1, "unit_price": 10000}],
            "tax_rate": 10
        })
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        admin: bool,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if admin {
            builder = builder.header("authorization", format!("Bearer {TOKEN}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Create and send a document; returns `(id, credential)`.
    async fn sent(app: &Router, kind: &str) -> (String, String) {
        let (status, doc) = call(
            app,
            "POST",
            "/api/admin/documents",
            Some(document_json(kind)),
            true,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = doc["id"].as_str().unwrap().to_string();
        let uri = format!("/api/admin/documents/{id}/send");
        let (status, issued) = call(app, "POST", &uri, None, true).await;
        assert_eq!(status, StatusCode::OK);
        let link = issued["link"].as_str().unwrap();
        let credential = link.rsplit('/').next().unwrap().to_string();
        (id, credential)
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, body) = call(&app(), "GET", "/health", None, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn admin_routes_need_the_token() {
        let app = app();
        let (status, body) = call(&app, "GET", "/api/admin/documents", None, false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let request = Request::builder()
            .uri("/api/admin/documents")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, "GET", "/api/admin/documents", None, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn quote_totals_from_a_percentage_tax_rate() {
        let app = app();
        let quote = json!({
            "kind": "quote",
            "reference": "Q-2026-014",
            "title": "Brand refresh",
            "party": {"name": "Mary Jackson", "email": "mary@client.example"},
            "line_items": [
                {"description": "Design", "quantity": 1, "unit_price": 180000},
                {"description": "Copy", "quantity": 1, "unit_price": 30000}
            ],
            "tax_rate": 10
        });
        let (status, doc) = call(&app, "POST", "/api/admin/documents", Some(quote), true).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(doc["tax_rate"], 10);

        let id = doc["id"].as_str().unwrap();
        let uri = format!("/api/admin/documents/{id}/send");
        let (_, issued) = call(&app, "POST", &uri, None, true).await;
        let credential = issued["link"].as_str().unwrap().rsplit('/').next().unwrap();
        let uri = format!("/api/documents/{credential}");
        let (status, view) = call(&app, "GET", &uri, None, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], "viewed");
        assert_eq!(view["subtotal"], 210_000);
        assert_eq!(view["tax"], 21_000);
        assert_eq!(view["total"], 231_000);
    }

    #[tokio::test]
    async fn invalid_input_is_unprocessable() {
        let mut doc = document_json("quote");
        doc["party"]["email"] = json!("not-an-email");
        let (status, body) = call(&app(), "POST", "/api/admin/documents", Some(doc), true).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn party_sees_a_view_and_signs_once() {
        let app = app();
        let (_, credential) = sent(&app, "contract").await;

        let uri = format!("/api/documents/{credential}");
        let (status, view) = call(&app, "GET", &uri, None, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], "viewed");
        assert_eq!(view["total"], 11_000);
        assert!(view.get("credential").is_none());
        assert!(view.get("transitions").is_none());
        assert!(view.get("notifications").is_none());

        let sign = json!({"signer_name": "Mary Jackson", "consent": true});
        let uri = format!("/api/documents/{credential}/sign");
        let (status, record) = call(&app, "POST", &uri, Some(sign.clone()), false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["signer_name"], "Mary Jackson");
        let (status, body) = call(&app, "POST", &uri, Some(sign), false).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "ALREADY_SIGNED");
    }

    #[tokio::test]
    async fn unknown_credentials_are_404() {
        let app = app();
        let uris = [
            "/api/documents/nope".to_string(),
            format!("/api/documents/{}", "f".repeat(32)),
        ];
        for uri in &uris {
            let (status, body) = call(&app, "GET", uri, None, false).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["code"], "NOT_FOUND");
        }
    }

    #[tokio::test]
    async fn pdf_download() {
        let app = app();
        let (_, credential) = sent(&app, "invoice").await;
        let request = Request::builder()
            .uri(format!("/api/documents/{credential}/pdf"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/pdf");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn invoice_checkout_and_confirm() {
        let app = app();
        let (id, credential) = sent(&app, "invoice").await;
        let uri = format!("/api/documents/{credential}/checkout");

        let (status, body) = call(&app, "POST", &uri, Some(json!({})), false).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "TERMS_NOT_ACCEPTED");

        let accepted = json!({"terms_accepted": true});
        let (status, session) = call(&app, "POST", &uri, Some(accepted), false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["session_id"], "cs_R-7");

        let confirm = json!({"session_id": "cs_R-7"});
        let (status, body) =
            call(&app, "POST", "/api/payments/confirm", Some(confirm), false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "paid");

        let (_, doc) = call(&app, "GET", &format!("/api/admin/documents/{id}"), None, true).await;
        assert_eq!(doc["status"], "paid");
        let uri = format!("/api/admin/documents/{id}/complete");
        let (status, doc) = call(&app, "POST", &uri, None, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["status"], "completed");
    }

    #[tokio::test]
    async fn webhook_requires_a_valid_signature() {
        let app = app();
        let (_, credential) = sent(&app, "invoice").await;
        let uri = format!("/api/documents/{credential}/checkout");
        call(&app, "POST", &uri, Some(json!({"terms_accepted": true})), false).await;

        let payload = json!({
            "id": "evt_9",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_R-7", "object": "checkout.session"}}
        })
        .to_string();
        let post = |signature: Option<String>| {
            let mut builder = Request::builder().method("POST").uri("/api/webhooks/gateway");
            if let Some(signature) = signature {
                builder = builder.header(handlers::SIGNATURE_HEADER, signature);
            }
            builder.body(Body::from(payload.clone())).unwrap()
        };

        let response = app.clone().oneshot(post(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let now = chrono::Utc::now().timestamp();
        let forged = WebhookVerifier::new("whsec_other", 300).sign(payload.as_bytes(), now);
        let response = app.clone().oneshot(post(Some(forged))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let signed = WebhookVerifier::new(WEBHOOK_SECRET, 300).sign(payload.as_bytes(), now);
        let response = app.clone().oneshot(post(Some(signed))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let ack: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(ack["event_id"], "evt_9");
        assert_eq!(ack["payment"], "paid");
    }
}
