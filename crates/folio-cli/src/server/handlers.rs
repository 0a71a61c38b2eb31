//! Request handlers. Each one is a thin adapter over a [`Desk`] protocol.
//!
//! [`Desk`]: folio_engine::Desk

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use folio_core::pdf::{self, RenderOptions};
use folio_core::{
    Document, DocumentId, DocumentView, NewDocument, NotificationAttempt, PaymentRecord,
    SignatureRecord,
};
use folio_engine::{DeskError, Issued, SignRequest, WebhookAck};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Admin ──

/// Returned by send, reissue and remind. The link is shown once.
#[derive(Debug, Serialize)]
pub struct IssuedResponse {
    pub document: Document,
    pub link: String,
    pub notification: NotificationAttempt,
}

impl From<Issued> for IssuedResponse {
    fn from(issued: Issued) -> Self {
        Self {
            document: issued.document,
            link: issued.link,
            notification: issued.notification,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub expired: Vec<DocumentId>,
}

fn document_id(raw: &str) -> ApiResult<DocumentId> {
    raw.parse()
        .map_err(|_| ApiError::Desk(DeskError::NotFound))
}

pub async fn create_document(
    State(state): State<AppState>,
    Json(new): Json<NewDocument>,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let doc = state.desk.documents.create(new).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn list_documents(State(state): State<AppState>) -> ApiResult<Json<Vec<Document>>> {
    Ok(Json(state.desk.documents.list().await?))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    Ok(Json(state.desk.documents.get(&document_id(&id)?).await?))
}

pub async fn send_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<IssuedResponse>> {
    let issued = state.desk.documents.send(&document_id(&id)?).await?;
    Ok(Json(issued.into()))
}

pub async fn reissue_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<IssuedResponse>> {
    let issued = state.desk.documents.reissue(&document_id(&id)?).await?;
    Ok(Json(issued.into()))
}

pub async fn remind_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<IssuedResponse>> {
    let issued = state.desk.documents.remind(&document_id(&id)?).await?;
    Ok(Json(issued.into()))
}

pub async fn cancel_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    Ok(Json(state.desk.documents.cancel(&document_id(&id)?).await?))
}

pub async fn complete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    Ok(Json(state.desk.documents.complete(&document_id(&id)?).await?))
}

pub async fn expire_documents(State(state): State<AppState>) -> ApiResult<Json<ExpireResponse>> {
    let expired = state.desk.documents.expire_overdue(Utc::now()).await?;
    Ok(Json(ExpireResponse { expired }))
}

// ── External party ──

pub async fn view_document(
    State(state): State<AppState>,
    Path(credential): Path<String>,
) -> ApiResult<Json<DocumentView>> {
    let doc = state.desk.access.resolve(&credential).await?;
    Ok(Json(doc.view()))
}

pub async fn download_pdf(
    State(state): State<AppState>,
    Path(credential): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let doc = state.desk.access.authorize(&credential).await?;
    let options = RenderOptions {
        agency_name: state.desk.config.agency_name.clone(),
        generated_at: doc.updated_at,
    };
    let bytes = pdf::render(&doc, &options).map_err(DeskError::from)?;
    let disposition = format!("attachment; filename=\"{}.pdf\"", pdf_filename(&doc));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

fn pdf_filename(doc: &Document) -> String {
    doc.reference
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct SignBody {
    pub signer_name: String,
    #[serde(default)]
    pub consent: bool,
}

pub async fn sign_document(
    State(state): State<AppState>,
    Path(credential): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SignBody>,
) -> ApiResult<Json<SignatureRecord>> {
    let request = SignRequest {
        signer_name: body.signer_name,
        consent: body.consent,
        signer_ip: client_ip(&headers),
    };
    Ok(Json(state.desk.signatures.sign(&credential, request).await?))
}

/// First hop of `X-Forwarded-For`, as set by the fronting proxy.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    #[serde(default)]
    pub terms_accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: String,
}

pub async fn start_checkout(
    State(state): State<AppState>,
    Path(credential): Path<String>,
    Json(body): Json<CheckoutBody>,
) -> ApiResult<Json<CheckoutResponse>> {
    let session = state
        .desk
        .payments
        .checkout(&credential, body.terms_accepted)
        .await?;
    Ok(Json(CheckoutResponse {
        session_id: session.id,
        checkout_url: session.url,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBody {
    pub session_id: String,
}

/// What the return page needs; amounts and failure detail stay internal.
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub session_id: String,
    pub status: folio_core::PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<PaymentRecord> for ConfirmResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            session_id: record.gateway_session_id,
            status: record.status,
            paid_at: record.paid_at,
        }
    }
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> ApiResult<Json<ConfirmResponse>> {
    let record = state.desk.payments.confirm(&body.session_id).await?;
    Ok(Json(record.into()))
}

pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("missing {SIGNATURE_HEADER} header")))?;
    let ack = state.desk.payments.handle_webhook(&body, signature).await?;
    Ok(Json(ack))
}
