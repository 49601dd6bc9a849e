use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    models::session::AuthSession,
    state::AppState,
    validation::documents::{decode_content, parse_document_type, validate_document_id},
};

/// The request payload for signing a document.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SignDocumentRequest {
    pub document_type: String,
    pub document_id: String,
    /// Base64 (standard alphabet) document content.
    pub content: String,
}

/// The request payload for issuing a share link.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShareDocumentRequest {
    pub document_type: String,
    pub document_id: String,
    pub valid_days: Option<u32>,
}

/// Signs a document with the caller's unlocked certificate.
#[axum::debug_handler]
pub async fn sign(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Json(req): Json<SignDocumentRequest>,
) -> Result<Response> {
    let document_type = parse_document_type(&req.document_type)?;
    validate_document_id(&req.document_id)?;
    let content = decode_content(&req.content)?;

    let signed = state
        .signing
        .sign(session.user_id, document_type, &req.document_id, &content)
        .await?;

    Ok((StatusCode::CREATED, Json(signed)).into_response())
}

/// Issues a time-limited share link for a document the caller signed.
#[axum::debug_handler]
pub async fn share(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Json(req): Json<ShareDocumentRequest>,
) -> Result<Response> {
    let document_type = parse_document_type(&req.document_type)?;
    validate_document_id(&req.document_id)?;

    let latest = state
        .store
        .find_latest_signed_document(document_type, &req.document_id)
        .await?
        .ok_or(AppError::DocumentNotFound)?;

    if latest.signer_id != session.user_id {
        tracing::warn!(
            "❌ {} tried to share {} signed by someone else",
            session.user_id,
            req.document_id
        );
        return Err(AppError::Unauthorized);
    }

    let issued = state
        .public
        .share
        .tokens
        .issue(&req.document_id, req.valid_days)?;

    let response = sonic_rs::to_string(&sonic_rs::json!({
        "token": issued.token,
        "expiresAt": issued.expires_at,
        "url": format!("/share/{}?token={}", req.document_id, issued.token),
    }))
    .map_err(|e| AppError::Internal(format!("Failed to encode share response: {}", e)))?;

    Ok((
        StatusCode::CREATED,
        [(http::header::CONTENT_TYPE, "application/json")],
        response,
    )
        .into_response())
}

/// Checks candidate content against a document's latest signature.
#[axum::debug_handler]
pub async fn verify_integrity(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Json(req): Json<SignDocumentRequest>,
) -> Result<Response> {
    let document_type = parse_document_type(&req.document_type)?;
    let content = decode_content(&req.content)?;

    let report = state
        .signing
        .verify_integrity(document_type, &req.document_id, &content)
        .await?;

    tracing::info!(
        "🔎 Integrity check of {} by {}: {}",
        req.document_id,
        session.user_id,
        if report.is_valid() { "intact" } else { "altered" }
    );

    let response = sonic_rs::to_string(&sonic_rs::json!({
        "signedDocumentId": report.signed_document_id,
        "contentMatches": report.content_matches,
        "signatureValid": report.signature_valid,
        "valid": report.is_valid(),
    }))
    .map_err(|e| AppError::Internal(format!("Failed to encode integrity report: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(http::header::CONTENT_TYPE, "application/json")],
        response,
    )
        .into_response())
}
