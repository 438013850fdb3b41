//! Application state shared by the bulk handlers.
//!
//! [`AppState`] holds the [`BulkEngine`] behind an `Arc`. The engine keeps no
//! per-batch state, so no lock is needed around it.

use std::sync::Arc;

use bulkapi_core::RouteCatalog;

use crate::config::BulkConfig;
use crate::dispatch::HttpDispatcher;
use crate::engine::BulkEngine;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BulkEngine>,
}

impl AppState {
    pub fn new(engine: BulkEngine) -> Self {
        AppState {
            engine: Arc::new(engine),
        }
    }

    /// Creates state whose engine dispatches over HTTP with the configured
    /// per-operation timeout.
    pub fn with_http_dispatcher(
        config: BulkConfig,
        catalog: Arc<dyn RouteCatalog>,
    ) -> Result<Self, ApiError> {
        let dispatcher = HttpDispatcher::new(config.operation_timeout())?;
        Ok(AppState::new(BulkEngine::new(
            config,
            catalog,
            Arc::new(dispatcher),
        )))
    }
}
