use std::fmt;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::{AppError, Result},
    models::session::AuthSession,
    state::AppState,
};

/// Longest passphrase accepted before any decoding is attempted.
const MAX_PASSPHRASE_LEN: usize = 1024;

/// The request payload for starting a certificate session.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    /// Defaults to the owner's active certificate.
    #[serde(default)]
    #[zeroize(skip)]
    pub certificate_id: Option<Uuid>,
    pub passphrase: String,
}

impl fmt::Debug for StartSessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartSessionRequest")
            .field("certificate_id", &self.certificate_id)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// The request payload for unlocking a locked certificate session.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct UnlockSessionRequest {
    pub passphrase: String,
}

impl fmt::Debug for UnlockSessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockSessionRequest")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

fn validate_passphrase(passphrase: &str) -> Result<()> {
    if passphrase.is_empty() {
        return Err(AppError::Validation("Passphrase cannot be empty".to_string()));
    }
    if passphrase.len() > MAX_PASSPHRASE_LEN {
        return Err(AppError::Validation("Passphrase is too long".to_string()));
    }
    Ok(())
}

/// Reports the caller's certificate session.
pub async fn status(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<Response> {
    let status = state.sessions.status(session.user_id).await;
    Ok((StatusCode::OK, Json(status)).into_response())
}

/// Unlocks a certificate and opens a session with it.
#[axum::debug_handler]
pub async fn start(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<Response> {
    tracing::info!("🔑 Certificate session start requested by {}", session.user_id);
    validate_passphrase(&payload.passphrase)?;

    let status = state
        .sessions
        .start(session.user_id, payload.certificate_id, &payload.passphrase)
        .await?;

    Ok((StatusCode::OK, Json(status)).into_response())
}

/// Locks the caller's session, purging the key material.
pub async fn lock(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<Response> {
    let status = state.sessions.lock(session.user_id).await?;
    Ok((StatusCode::OK, Json(status)).into_response())
}

/// Unlocks the caller's locked session.
#[axum::debug_handler]
pub async fn unlock(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    Json(payload): Json<UnlockSessionRequest>,
) -> Result<Response> {
    tracing::info!("🔑 Certificate session unlock requested by {}", session.user_id);
    validate_passphrase(&payload.passphrase)?;

    let status = state
        .sessions
        .unlock(session.user_id, &payload.passphrase)
        .await?;

    Ok((StatusCode::OK, Json(status)).into_response())
}

/// Ends the caller's session.
pub async fn end(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
) -> Result<StatusCode> {
    state.sessions.end(session.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passphrase_never_reaches_debug_output() {
        let request: StartSessionRequest =
            sonic_rs::from_str(r#"{"passphrase":"hunter2-secret"}"#).unwrap();
        assert!(request.certificate_id.is_none());

        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn start_accepts_camel_case_certificate_id() {
        let id = Uuid::new_v4();
        let request: StartSessionRequest = sonic_rs::from_str(&format!(
            r#"{{"certificateId":"{}","passphrase":"x"}}"#,
            id
        ))
        .unwrap();
        assert_eq!(request.certificate_id, Some(id));
    }

    #[test]
    fn passphrase_bounds() {
        assert!(validate_passphrase("").is_err());
        assert!(validate_passphrase(&"x".repeat(MAX_PASSPHRASE_LEN + 1)).is_err());
        assert!(validate_passphrase("correct horse").is_ok());
    }
}
