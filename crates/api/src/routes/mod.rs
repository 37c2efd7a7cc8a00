pub mod health;

use axum::routing::post;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the authenticated route tree.
///
/// ```text
/// /generate                POST   (Basic auth)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/generate", post(handlers::generate::generate))
}
