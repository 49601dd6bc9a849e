use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use redis::AsyncCommands;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{error::AppError, models::session::AuthSession, state::AppState};

/// Extracts the session token from the request cookies.
fn extract_session_token(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get("session_id")
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// A middleware that requires a valid login session.
///
/// Sessions are issued by the authentication service and stored in Redis as
/// `session:<id>` JSON. On success the `AuthSession` is added to the request
/// extensions.
pub async fn require_auth(
    State(mut state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking authentication...");

    let session_id = extract_session_token(&cookies).ok_or_else(|| {
        tracing::warn!("❌ No session_id cookie found");
        AppError::Authentication("Not authenticated".to_string())
    })?;

    let key = format!("session:{}", session_id);
    let session_json: Option<String> = state.redis.get(&key).await?;
    let session_json = session_json.ok_or_else(|| {
        tracing::warn!("❌ Session {} not found", session_id);
        AppError::Authentication("Not authenticated".to_string())
    })?;

    let session: AuthSession = sonic_rs::from_str(&session_json).map_err(|e| {
        tracing::warn!("❌ Invalid session JSON: {}", e);
        AppError::Authentication("Not authenticated".to_string())
    })?;

    if chrono::Utc::now() > session.expires_at {
        tracing::warn!("❌ Session expired for user: {}", session.user_id);
        let _: () = state.redis.del(&key).await.unwrap_or(());
        return Err(AppError::Authentication("Session expired".to_string()));
    }

    tracing::debug!("✅ User authenticated: {}", session.user_id);
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}
