//! Schema types for the bulk endpoint.

use serde::{Deserialize, Serialize};

use bulkapi_core::{Operation, Outcome};

/// Body of `POST {bulk path}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// Successful bulk response: one result per non-silent operation, in
/// submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub results: Vec<Outcome>,
}
