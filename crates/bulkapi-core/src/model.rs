//! Operation and outcome data model.
//!
//! [`Operation`] is one sub-request as submitted by the client and
//! [`Outcome`] is the recorded result of dispatching it. Both derive serde so
//! they double as the wire format of the bulk endpoint.

use http::Method;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One logical sub-request inside a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Relative or rooted target, optionally with a query string.
    #[serde(default)]
    pub url: Option<String>,
    /// HTTP method name, case-insensitive. Missing or unknown means GET.
    #[serde(default)]
    pub method: Option<String>,
    /// Headers copied onto the sub-request in submission order.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Parameters sent either as a JSON body or as form parameters.
    #[serde(default)]
    pub params: IndexMap<String, Value>,
    /// Execute the operation but leave it out of the results.
    #[serde(default)]
    pub silent: bool,
    /// Opaque correlation token echoed on the outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Operation {
    /// Creates a GET operation for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Operation {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Creates an operation with an explicit method.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Operation {
            url: Some(url.into()),
            method: Some(method.into()),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// The method this operation will be dispatched with.
    pub fn http_method(&self) -> Method {
        self.method
            .as_deref()
            .map(parse_method)
            .unwrap_or(Method::GET)
    }
}

/// Parses a method name case-insensitively, falling back to GET for anything
/// that is not a standard HTTP method.
pub fn parse_method(name: &str) -> Method {
    standard_method(name).unwrap_or(Method::GET)
}

/// Returns the standard HTTP method named by `name`, ignoring case.
pub fn standard_method(name: &str) -> Option<Method> {
    match name.trim().to_ascii_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "HEAD" => Some(Method::HEAD),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        "OPTIONS" => Some(Method::OPTIONS),
        "TRACE" => Some(Method::TRACE),
        _ => None,
    }
}

/// The recorded result of dispatching one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// HTTP status returned by the target (or synthesized on failure).
    pub status: u16,
    /// Response headers, first value per name.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Response body as text, `null` when the target sent none. Bytes that
    /// are not valid UTF-8 are replaced with U+FFFD.
    #[serde(default)]
    pub body: Option<String>,
    /// The operation's correlation token, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Present only when the sub-request never produced a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl Outcome {
    pub fn new(status: u16, headers: IndexMap<String, String>, body: Option<String>) -> Self {
        Outcome {
            status,
            headers,
            body,
            payload: None,
            error: None,
        }
    }

    /// Synthetic outcome for a sub-request that failed below HTTP.
    pub fn failed(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Outcome {
            status,
            headers: IndexMap::new(),
            body: None,
            payload: None,
            error: Some(OutcomeError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Diagnostic attached to a synthetic failure outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    /// Machine-readable failure code (e.g., "TIMEOUT", "CONNECT_FAILED").
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_defaults_fill_missing_fields() {
        let op: Operation = serde_json::from_value(json!({ "url": "home" })).unwrap();
        assert_eq!(op.url.as_deref(), Some("home"));
        assert_eq!(op.http_method(), Method::GET);
        assert!(op.headers.is_empty());
        assert!(op.params.is_empty());
        assert!(!op.silent);
        assert!(op.payload.is_none());
    }

    #[test]
    fn method_is_case_insensitive_and_falls_back_to_get() {
        assert_eq!(parse_method("put"), Method::PUT);
        assert_eq!(parse_method(" Delete "), Method::DELETE);
        assert_eq!(parse_method("PATCH"), Method::PATCH);
        assert_eq!(parse_method("FROBNICATE"), Method::GET);
        assert_eq!(parse_method(""), Method::GET);
    }

    #[test]
    fn headers_keep_submission_order() {
        let op: Operation = serde_json::from_value(json!({
            "url": "/home",
            "headers": { "X-B": "2", "X-A": "1", "Authorization": "Basic abc" }
        }))
        .unwrap();
        let names: Vec<&str> = op.headers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["X-B", "X-A", "Authorization"]);
    }

    #[test]
    fn payload_round_trips_strings_and_numbers_unchanged() {
        let op: Operation =
            serde_json::from_value(json!({ "url": "/a", "payload": "requestNo:1" })).unwrap();
        assert_eq!(op.payload, Some(json!("requestNo:1")));

        let op: Operation = serde_json::from_value(json!({ "url": "/a", "payload": 42 })).unwrap();
        let outcome = Outcome::new(200, IndexMap::new(), None).with_payload(op.payload);
        let wire = serde_json::to_value(&outcome).unwrap();
        assert_eq!(wire["payload"], json!(42));
    }

    #[test]
    fn outcome_omits_absent_payload_and_error_but_keeps_null_body() {
        let wire = serde_json::to_value(Outcome::new(204, IndexMap::new(), None)).unwrap();
        assert_eq!(wire, json!({ "status": 204, "headers": {}, "body": null }));
    }

    #[test]
    fn failed_outcome_carries_diagnostic() {
        let outcome = Outcome::failed(502, "CONNECT_FAILED", "connection refused");
        assert!(outcome.is_failure());
        assert_eq!(outcome.status, 502);
        assert_eq!(outcome.error.unwrap().code, "CONNECT_FAILED");
    }
}
