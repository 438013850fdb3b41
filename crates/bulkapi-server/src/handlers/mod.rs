//! HTTP handler modules for the bulk API.
//!
//! Handlers are thin: they extract the request, build the request context
//! and delegate to [`crate::engine::BulkEngine`].

pub mod bulk;
pub mod health;
