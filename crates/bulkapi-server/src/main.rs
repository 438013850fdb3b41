//! Binary entrypoint for the standalone bulk gateway.
//!
//! Reads configuration from environment variables:
//! - `BULKAPI_ROUTES`: JSON route catalog file (default: "routes.json")
//! - `BULKAPI_UPSTREAM`: service every sub-request is sent to, e.g.
//!   "http://orders:8080" (default: the authority the bulk request arrived
//!   on, which the client controls through `Host`)
//! - `BULKAPI_PORT`: server listen port (default: "3000")
//! - `BULKAPI_*` engine settings, see [`BulkConfig::from_env`]

use std::sync::Arc;

use axum::http::Uri;
use axum::routing::get;
use tracing_subscriber::EnvFilter;

use bulkapi_core::target::UpstreamRebase;
use bulkapi_core::StaticRouteCatalog;
use bulkapi_server::config::BulkConfig;
use bulkapi_server::dispatch::HttpDispatcher;
use bulkapi_server::engine::BulkEngine;
use bulkapi_server::handlers;
use bulkapi_server::router::build_router;
use bulkapi_server::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BulkConfig::from_env();
    let routes_path = std::env::var("BULKAPI_ROUTES")
        .unwrap_or_else(|_| "routes.json".to_string());
    let port = std::env::var("BULKAPI_PORT")
        .unwrap_or_else(|_| "3000".to_string());

    let catalog = StaticRouteCatalog::from_file(&routes_path)
        .expect("Failed to load route catalog");
    tracing::info!("loaded {} route(s) from {}", catalog.len(), routes_path);

    let dispatcher = HttpDispatcher::new(config.operation_timeout())
        .expect("Failed to build HTTP dispatcher");
    let mut engine = BulkEngine::new(config, Arc::new(catalog), Arc::new(dispatcher));

    match std::env::var("BULKAPI_UPSTREAM") {
        Ok(upstream) => {
            let uri: Uri = upstream
                .parse()
                .expect("BULKAPI_UPSTREAM must be an absolute URI");
            let rebase = UpstreamRebase::new(&uri)
                .expect("BULKAPI_UPSTREAM must include scheme and host");
            engine = engine.with_uri_transform(Arc::new(rebase));
            tracing::info!("forwarding sub-requests to {}", upstream);
        }
        Err(_) if engine.config().allowed_authorities.is_empty() => tracing::warn!(
            "BULKAPI_UPSTREAM and BULKAPI_ALLOWED_HOSTS not set, sub-requests go to whatever host the client names"
        ),
        Err(_) => tracing::info!("BULKAPI_UPSTREAM not set, sub-requests target the gateway itself"),
    }

    let bulk_path = engine.config().path.clone();
    let app = build_router(AppState::new(engine))
        .route("/health", get(handlers::health::health));

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("bulk gateway listening on {} (endpoint {})", addr, bulk_path);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
