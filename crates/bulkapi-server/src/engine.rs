//! BulkEngine: validates a batch, dispatches its operations and assembles
//! the correlated results.
//!
//! A batch moves through validation, dispatch and assembly. Validation is
//! all-or-nothing: the size limit and every operation's target are checked
//! before the first sub-request leaves, so a rejected batch has no side
//! effects. Once dispatching starts, each operation's outcome is independent
//! of its siblings.

use std::sync::Arc;

use axum::http::{Method, Uri};
use futures::stream::{self, StreamExt, TryStreamExt};
use uuid::Uuid;

use bulkapi_core::{
    BulkError, EligibilityResolver, Operation, Outcome, RequestContext, RouteCatalog,
    TargetUriBuilder, UriTransform,
};

use crate::config::BulkConfig;
use crate::dispatch::{DispatchFailure, DispatchRequest, Dispatcher};

/// An operation that passed validation, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedOperation {
    pub method: Method,
    pub uri: Uri,
    pub expects_body: bool,
}

/// The bulk aggregation engine.
///
/// Constructed once by the host and shared through axum state. Holds no
/// per-batch state, so concurrent batches only share the read-only catalog
/// and its eligibility cache.
pub struct BulkEngine {
    config: BulkConfig,
    resolver: EligibilityResolver,
    targets: TargetUriBuilder,
    dispatcher: Arc<dyn Dispatcher>,
}

impl BulkEngine {
    pub fn new(
        config: BulkConfig,
        catalog: Arc<dyn RouteCatalog>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let config = config.normalized();
        let targets = TargetUriBuilder::new(&config.path);
        BulkEngine {
            config,
            resolver: EligibilityResolver::new(catalog),
            targets,
            dispatcher,
        }
    }

    /// Installs the host's URI rewrite, applied to every resolved target.
    pub fn with_uri_transform(mut self, transform: Arc<dyn UriTransform>) -> Self {
        self.targets = self.targets.with_transform(transform);
        self
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Checks the batch size and every target without dispatching anything.
    ///
    /// Returns one [`PreparedOperation`] per input operation, in order, or
    /// the first error found.
    pub fn validate(
        &self,
        operations: &[Operation],
        ctx: &RequestContext,
    ) -> Result<Vec<PreparedOperation>, BulkError> {
        if operations.len() > self.config.limit {
            return Err(BulkError::OverLimit {
                count: operations.len(),
                max: self.config.limit,
            });
        }

        operations
            .iter()
            .enumerate()
            .map(|(index, op)| self.prepare(index, op, ctx))
            .collect()
    }

    fn prepare(
        &self,
        index: usize,
        op: &Operation,
        ctx: &RequestContext,
    ) -> Result<PreparedOperation, BulkError> {
        let method = op.http_method();
        let target = self.targets.build(index, op.url.as_deref(), ctx)?;

        let eligibility = self.resolver.resolve(&target.path, &method);
        if !eligibility.eligible {
            return Err(BulkError::invalid_target(
                index,
                target.path,
                format!("{} is not available through the bulk endpoint", method),
            ));
        }

        Ok(PreparedOperation {
            method,
            uri: target.uri,
            expects_body: eligibility.expects_body,
        })
    }

    /// Validates and runs a batch.
    ///
    /// Outcomes come back in submission order with silent operations left
    /// out. Operations start in submission order, at most
    /// `max_concurrency` at a time; each runs on its own task, so dropping
    /// the returned future stops further dispatch without aborting
    /// sub-requests already in flight.
    pub async fn execute(
        &self,
        operations: Vec<Operation>,
        ctx: &RequestContext,
    ) -> Result<Vec<Outcome>, BulkError> {
        let batch_id = Uuid::new_v4();
        let count = operations.len();

        let prepared = match self.validate(&operations, ctx) {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::warn!(%batch_id, operations = count, error = %err, "bulk request rejected");
                return Err(err);
            }
        };
        tracing::info!(%batch_id, operations = count, "bulk request accepted");

        let escalate = self.config.escalate_reauth_failures;
        let dispatcher = &self.dispatcher;

        let outcomes: Vec<Option<Outcome>> = stream::iter(operations.into_iter().zip(prepared))
            .enumerate()
            .map(|(index, (op, prepared))| {
                let target = prepared.uri.to_string();
                let request = DispatchRequest {
                    method: prepared.method,
                    uri: prepared.uri,
                    headers: op.headers,
                    params: op.params,
                    expects_body: prepared.expects_body,
                };
                let dispatcher = Arc::clone(dispatcher);
                let handle = tokio::spawn(async move { dispatcher.dispatch(request).await });
                let (silent, payload) = (op.silent, op.payload);

                async move {
                    let result = handle.await.unwrap_or_else(|err| {
                        Err(DispatchFailure::Transport(format!(
                            "dispatch task failed: {}",
                            err
                        )))
                    });

                    let outcome = match result {
                        Ok(outcome) => outcome,
                        Err(failure @ DispatchFailure::Reauthentication(_)) if escalate => {
                            tracing::warn!(%batch_id, index, %target, "re-authentication refused, aborting batch");
                            return Err(BulkError::Unauthorized(failure.to_string()));
                        }
                        Err(failure) => {
                            tracing::warn!(%batch_id, index, %target, status = failure.status(), error = %failure, "operation failed");
                            failure.into_outcome()
                        }
                    };

                    Ok((!silent).then(|| outcome.with_payload(payload)))
                }
            })
            .buffered(self.config.max_concurrency)
            .try_collect()
            .await?;

        let results: Vec<Outcome> = outcomes.into_iter().flatten().collect();
        tracing::info!(%batch_id, operations = count, results = results.len(), "bulk request completed");
        Ok(results)
    }
}
