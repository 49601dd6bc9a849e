use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use http::{header, HeaderName, HeaderValue, Method};
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    handlers, middleware_layer,
    state::{AppState, PublicState},
};

/// Largest request body accepted; leaves room for base64 overhead on
/// 8 MiB documents.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// The unauthenticated surface: verification and share links.
///
/// Needs neither Redis nor the session registry.
pub fn public_routes(state: PublicState) -> Router {
    Router::new()
        .route("/api/public/verify", get(handlers::verification::verify))
        .route("/share/{document_id}", get(handlers::share::fetch))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let csrf_header = HeaderName::from_static("x-csrf-token");

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
            csrf_header.clone(),
        ])
        .allow_credentials(true)
        .expose_headers([csrf_header])
        .max_age(Duration::from_secs(86400)))
}

/// Builds the full application router.
pub fn app(state: AppState) -> anyhow::Result<Router> {
    let protected_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(100)
            .burst_size(50)
            .use_headers()
            .finish()
            .context("Invalid rate limiter configuration")?,
    );

    // Wrong passphrases are counted per owner; needs the AuthSession, so
    // require_auth must run first (last route_layer runs first).
    let passphrase_routes = Router::new()
        .route(
            "/api/certificate-session/start",
            post(handlers::sessions::start),
        )
        .route(
            "/api/certificate-session/unlock",
            post(handlers::sessions::unlock),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_passphrase,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/certificate-session", get(handlers::sessions::status))
        .route(
            "/api/certificate-session/lock",
            post(handlers::sessions::lock),
        )
        .route(
            "/api/certificate-session/end",
            post(handlers::sessions::end),
        )
        .route("/api/documents/sign", post(handlers::documents::sign))
        .route("/api/documents/share", post(handlers::documents::share))
        .route(
            "/api/documents/verify-integrity",
            post(handlers::documents::verify_integrity),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let authenticated = Router::new()
        .merge(passphrase_routes)
        .merge(protected_routes)
        .layer(tower_governor::GovernorLayer::new(protected_governor_conf));

    let public = public_routes(state.public.clone()).route_layer(from_fn_with_state(
        state.clone(),
        middleware_layer::rate_limit::rate_limit_public,
    ));

    Ok(Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.cors_allowed_origins)?))
}
