//! Core types and validation logic for the bulk API.
//!
//! This crate holds everything the bulk endpoint needs to decide whether a
//! batch may run, without performing any I/O: the operation/outcome data
//! model, the host route catalog abstraction, the eligibility policy, and the
//! target URI builder. Dispatching and the HTTP surface live in
//! `bulkapi-server`.

pub mod catalog;
pub mod eligibility;
pub mod error;
pub mod model;
pub mod target;

// Re-export commonly used types
pub use catalog::{RouteCatalog, RouteDescriptor, StaticRouteCatalog};
pub use eligibility::{EligibilityResolver, EligibilityResult};
pub use error::{BulkError, CatalogError};
pub use model::{Operation, Outcome, OutcomeError};
pub use target::{RequestContext, ResolvedTarget, TargetUriBuilder, UriTransform};
