//! Application router and middleware for the gateway.
//!
//! [`build_app_router`] is shared by `main.rs` and `tests/common/mod.rs`
//! so integration tests run through the production middleware.

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the gateway [`Router`]: unauthenticated `/health`, Basic-auth
/// `/generate`, and the middleware stack.
///
/// Layers, outermost first:
///
/// 1. CORS, so browser preflights for `/generate` never reach auth.
/// 2. Request id (`x-request-id`, UUID unless the caller sent one).
/// 3. Tracing span per request, carrying the request id header.
/// 4. Request id copied onto the response.
/// 5. Whole-request timeout (`REQUEST_TIMEOUT_SECS`, answers 408). This is
///    a backstop: the orchestrator's own `COMPLETION_TIMEOUT_SECS` deadline
///    should fire first and produce a 504 after dequeuing the prompt. If
///    this layer fires instead, the handler future is dropped and the
///    prompt is abandoned from a background task.
/// 6. Panic recovery.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    if !config.request_timeout_covers_completion() {
        tracing::warn!(
            request_timeout_secs = config.request_timeout_secs,
            completion_timeout_secs = config.comfyui.completion_timeout_secs,
            "REQUEST_TIMEOUT_SECS does not exceed COMPLETION_TIMEOUT_SECS; slow generations will end in 408",
        );
    }

    let cors = build_cors_layer(config);
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(routes::health::router())
        .merge(routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// CORS for browser front-ends calling `/generate` with Basic credentials.
///
/// Panics at startup if any configured origin is invalid.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
