use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;
use subtle::ConstantTimeEq;
use tower_cookies::Cookies;

use crate::{error::AppError, state::AppState};

/// A middleware that verifies the double-submit CSRF token.
///
/// The `csrf_token` cookie must equal the `x-csrf-token` header and still be
/// known to Redis (`csrf:<token>`). Safe methods are exempt.
pub async fn verify_csrf(
    State(mut state): State<AppState>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(req).await;
    }

    let Some(cookie_token) = cookies.get("csrf_token").map(|c| c.value().to_string()) else {
        tracing::warn!("❌ CSRF: csrf_token cookie missing");
        return AppError::Authentication("Missing CSRF token cookie".to_string()).into_response();
    };

    let header_token = match req.headers().get("x-csrf-token").map(|v| v.to_str()) {
        Some(Ok(token)) => token.to_string(),
        Some(Err(_)) => {
            tracing::warn!("❌ CSRF: header is not valid ASCII");
            return AppError::Authentication("Invalid CSRF token format".to_string())
                .into_response();
        }
        None => {
            tracing::warn!("❌ CSRF: x-csrf-token header missing");
            return AppError::Authentication("Missing CSRF token header".to_string())
                .into_response();
        }
    };

    if !bool::from(cookie_token.as_bytes().ct_eq(header_token.as_bytes())) {
        tracing::warn!("❌ CSRF: tokens do not match");
        return AppError::Authentication("CSRF token mismatch".to_string()).into_response();
    }

    match state
        .redis
        .exists::<_, bool>(format!("csrf:{}", cookie_token))
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!("❌ CSRF: token expired or unknown");
            AppError::Authentication("CSRF token expired or invalid".to_string()).into_response()
        }
        Err(e) => {
            tracing::error!("❌ CSRF: Redis error: {}", e);
            AppError::Authentication("CSRF validation error".to_string()).into_response()
        }
    }
}
