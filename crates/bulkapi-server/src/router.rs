//! Router assembly for the bulk API.
//!
//! [`build_router`] mounts the bulk handler at the configured path with CORS
//! and tracing middleware layers. Hosts merge the result into their own
//! router, or nest it under a prefix.

use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the router exposing `POST {bulk path}`.
///
/// The route is registered at the configured path only; when the router is
/// nested, the prefix is recovered from `OriginalUri` at request time.
pub fn build_router(state: AppState) -> Router {
    let path = state.engine.config().path.clone();
    Router::new()
        .route(&path, post(handlers::bulk::bulk))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
