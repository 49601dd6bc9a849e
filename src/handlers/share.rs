use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    state::PublicState,
};

#[derive(Deserialize, Debug)]
pub struct ShareQuery {
    pub token: Option<String>,
}

/// Serves a shared document to anyone holding a valid token.
///
/// Every failure, including a missing artifact, is the same 404.
pub async fn fetch(
    State(state): State<PublicState>,
    Path(document_id): Path<String>,
    Query(query): Query<ShareQuery>,
) -> Result<Response> {
    let token = query.token.as_deref().unwrap_or_default();
    if !state.share.tokens.validate(token, &document_id) {
        return Err(AppError::NotFound);
    }

    let bytes = state
        .share
        .artifacts
        .fetch(&document_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!("❌ Valid share link for {} but no artifact on disk", document_id);
            AppError::NotFound
        })?;

    let content_type = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");

    tracing::info!("📤 Shared document {} served ({} bytes)", document_id, bytes.len());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, no-store"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::REFERRER_POLICY, "no-referrer"),
        ],
        Body::from(bytes),
    )
        .into_response())
}
