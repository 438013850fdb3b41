//! API schema types for request/response definitions.
//!
//! Types use serde derives for JSON serialization/deserialization. The
//! per-operation types themselves live in `bulkapi_core::model`.

pub mod bulk;
