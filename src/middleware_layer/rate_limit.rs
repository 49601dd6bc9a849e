use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use std::net::SocketAddr;

use crate::{error::{AppError, ErrorCode}, models::session::AuthSession, state::AppState};

/// Failed passphrase attempts allowed per owner within the window.
const PASSPHRASE_MAX_FAILURES: i64 = 5;
const PASSPHRASE_WINDOW_SECS: i64 = 15 * 60;

/// Public requests allowed per IP within the window.
const PUBLIC_MAX_REQUESTS: i64 = 60;
const PUBLIC_WINDOW_SECS: i64 = 60;

/// Extracts the peer IP address from the request extensions.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn ttl_minutes(state: &AppState, key: &str) -> i64 {
    let ttl: Option<i64> = redis::cmd("TTL")
        .arg(key)
        .query_async(&mut state.redis.clone())
        .await
        .unwrap_or(None);
    (ttl.unwrap_or(0) + 59) / 60
}

/// A middleware that limits wrong-passphrase attempts on `start`/`unlock`.
///
/// Only responses carrying `INVALID_PASSPHRASE` count; a success clears the
/// counter.
pub async fn rate_limit_passphrase(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = format!("rate_limit:passphrase:{}", session.user_id);

    let failures: Option<i64> = redis::cmd("GET")
        .arg(&key)
        .query_async(&mut state.redis.clone())
        .await
        .unwrap_or(None);

    if failures.is_some_and(|count| count >= PASSPHRASE_MAX_FAILURES) {
        let minutes = ttl_minutes(&state, &key).await;
        return AppError::RateLimitExceeded(format!(
            "Too many wrong passphrases. Try again in {} minutes",
            minutes
        ))
        .into_response();
    }

    let response = next.run(req).await;

    let wrong_passphrase = response
        .extensions()
        .get::<ErrorCode>()
        .is_some_and(|code| code.0 == AppError::InvalidPassphrase.code());

    if wrong_passphrase {
        let _: () = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut state.redis.clone())
            .await
            .unwrap_or(());

        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(PASSPHRASE_WINDOW_SECS)
            .query_async(&mut state.redis.clone())
            .await
            .unwrap_or(());
    } else if response.status().is_success() {
        let _: () = redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut state.redis.clone())
            .await
            .unwrap_or(());
    }

    response
}

/// A middleware that limits unauthenticated requests per client IP.
pub async fn rate_limit_public(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = format!("rate_limit:public:{}", extract_real_ip(&req));

    let count: i64 = redis::cmd("INCR")
        .arg(&key)
        .query_async(&mut state.redis.clone())
        .await
        .unwrap_or(0);

    if count == 1 {
        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(PUBLIC_WINDOW_SECS)
            .query_async(&mut state.redis.clone())
            .await
            .unwrap_or(());
    }

    if count > PUBLIC_MAX_REQUESTS {
        let minutes = ttl_minutes(&state, &key).await;
        return AppError::RateLimitExceeded(format!(
            "Too many requests. Try again in {} minutes",
            minutes
        ))
        .into_response();
    }

    next.run(req).await
}
