//! Sub-request execution.
//!
//! The [`Dispatcher`] trait is the seam between the orchestrator and the
//! network. [`HttpDispatcher`] issues each sub-request exactly once with
//! `reqwest`; whatever status the target answers with becomes the outcome,
//! and only failures below HTTP surface as [`DispatchFailure`].

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::http::{HeaderName, HeaderValue, Method, Uri};
use indexmap::IndexMap;
use serde_json::Value;

use bulkapi_core::Outcome;

use crate::error::ApiError;

/// Everything needed to issue one sub-request.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: IndexMap<String, String>,
    pub params: IndexMap<String, Value>,
    /// Send `params` as a JSON body instead of form parameters.
    pub expects_body: bool,
}

/// A sub-request that never produced an HTTP response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchFailure {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    /// The target demanded re-authentication the client could not replay.
    #[error("server re-authentication refused: {0}")]
    Reauthentication(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl DispatchFailure {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchFailure::Timeout(_) => "TIMEOUT",
            DispatchFailure::Connect(_) => "CONNECT_FAILED",
            DispatchFailure::Reauthentication(_) => "REAUTHENTICATION_REFUSED",
            DispatchFailure::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    /// Status reported on the synthetic outcome.
    pub fn status(&self) -> u16 {
        match self {
            DispatchFailure::Timeout(_) => 504,
            _ => 502,
        }
    }

    pub fn into_outcome(self) -> Outcome {
        Outcome::failed(self.status(), self.code(), self.to_string())
    }
}

/// Executes a single sub-request.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: DispatchRequest) -> Result<Outcome, DispatchFailure>;
}

/// Production dispatcher backed by a shared `reqwest::Client`.
pub struct HttpDispatcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDispatcher {
    /// Creates a dispatcher whose sub-requests give up after `timeout`.
    /// Redirects are returned to the caller rather than followed.
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ApiError::InternalError(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpDispatcher { client, timeout })
    }

    async fn execute(&self, request: DispatchRequest) -> Result<Outcome, DispatchFailure> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.uri.to_string());

        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), _) if name == CONTENT_LENGTH || name == TRANSFER_ENCODING => {}
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::warn!(header = %name, "skipping header that is not valid HTTP"),
            }
        }

        if request.expects_body {
            builder = builder.json(&request.params);
        } else if !request.params.is_empty() {
            let pairs = form_pairs(&request.params);
            builder = if params_in_query(&request.method) {
                builder.query(&pairs)
            } else {
                builder.form(&pairs)
            };
        }

        let response = builder.send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let mut headers = IndexMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        let bytes = response.bytes().await.map_err(classify)?;
        let body = decode_body(&bytes);
        if body.lossy {
            tracing::warn!(uri = %request.uri, status, "response body is not UTF-8, invalid bytes replaced");
        }

        Ok(Outcome::new(status, headers, body.text))
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<Outcome, DispatchFailure> {
        match tokio::time::timeout(self.timeout, self.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchFailure::Timeout(self.timeout)),
        }
    }
}

/// Methods whose form parameters travel in the query string.
fn params_in_query(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// Flattens params into form pairs: strings verbatim, `null` as empty,
/// everything else as compact JSON.
fn form_pairs(params: &IndexMap<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect()
}

struct DecodedBody {
    text: Option<String>,
    lossy: bool,
}

/// Empty bodies become `None`. Invalid UTF-8 sequences are replaced with
/// U+FFFD since outcomes carry the body as a JSON string.
fn decode_body(bytes: &[u8]) -> DecodedBody {
    if bytes.is_empty() {
        return DecodedBody {
            text: None,
            lossy: false,
        };
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => DecodedBody {
            text: Some(text.to_string()),
            lossy: false,
        },
        Err(_) => DecodedBody {
            text: Some(String::from_utf8_lossy(bytes).into_owned()),
            lossy: true,
        },
    }
}

fn classify(err: reqwest::Error) -> DispatchFailure {
    let message = error_chain(&err);
    if message.contains("server authentication") {
        DispatchFailure::Reauthentication(message)
    } else if err.is_connect() {
        DispatchFailure::Connect(message)
    } else {
        DispatchFailure::Transport(message)
    }
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
