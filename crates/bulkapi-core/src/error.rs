//! Core error types for bulkapi-core.
//!
//! Uses `thiserror` for structured, matchable error variants. [`BulkError`]
//! covers the batch-fatal failures; per-operation transport failures are not
//! errors at this level and never appear here.

use thiserror::Error;

/// Batch-fatal errors. Any of these rejects the whole batch before (or, for
/// [`BulkError::Unauthorized`], instead of finishing) dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkError {
    /// The batch holds more operations than the configured limit.
    #[error("bulk operations exceed the limitation({max}): got {count}")]
    OverLimit { count: usize, max: usize },

    /// An operation's target is malformed, self-referential, or not
    /// bulk-eligible.
    #[error("invalid URL({target}) exists in this bulk request: {reason}")]
    InvalidTarget {
        index: usize,
        target: String,
        reason: String,
    },

    /// A sub-request was refused by server re-authentication and escalation
    /// is enabled.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl BulkError {
    pub fn invalid_target(
        index: usize,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BulkError::InvalidTarget {
            index,
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while building or loading a route catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A route pattern does not follow the `/literal/{param}/{*rest}` syntax.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to read route catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse route catalog: {0}")]
    Parse(#[from] serde_json::Error),
}
