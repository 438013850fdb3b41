//! HTTP bulk endpoint for aggregating many API calls into one round trip.
//!
//! Provides the batch orchestrator ([`engine::BulkEngine`]), the HTTP
//! sub-request dispatcher, the axum handler and router, configuration, and
//! error handling. Validation primitives come from `bulkapi-core`.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod state;
