//! Bulk endpoint configuration.
//!
//! [`BulkConfig`] carries every tunable of the engine. Defaults match the
//! documented behavior (mounted at `/bulk`, at most 100 operations,
//! sequential dispatch). [`BulkConfig::from_env`] reads overrides from
//! environment variables:
//! - `BULKAPI_PATH`: endpoint path (default: "/bulk")
//! - `BULKAPI_LIMIT`: maximum operations per batch (default: 100)
//! - `BULKAPI_MAX_CONCURRENCY`: operations dispatched at once (default: 1)
//! - `BULKAPI_TIMEOUT_SECS`: per-operation timeout (default: 30)
//! - `BULKAPI_ESCALATE_REAUTH`: fail the batch with 401 on re-auth refusals
//!   (default: false)
//! - `BULKAPI_DEFAULT_SCHEME`: scheme assumed when the inbound request does
//!   not state one (default: "http")
//! - `BULKAPI_ALLOWED_HOSTS`: comma-separated authorities bulk requests may
//!   arrive on, and so be dispatched to (default: any)

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bulkapi_core::target::normalize_mount_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub operation_timeout_secs: u64,
    #[serde(default)]
    pub escalate_reauth_failures: bool,
    #[serde(default = "default_scheme")]
    pub default_scheme: String,
    /// Inbound authorities served by the endpoint; empty serves any.
    #[serde(default)]
    pub allowed_authorities: Vec<String>,
}

fn default_path() -> String {
    "/bulk".to_string()
}

fn default_limit() -> usize {
    100
}

fn default_max_concurrency() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_scheme() -> String {
    "http".to_string()
}

impl Default for BulkConfig {
    fn default() -> Self {
        BulkConfig {
            path: default_path(),
            limit: default_limit(),
            max_concurrency: default_max_concurrency(),
            operation_timeout_secs: default_timeout_secs(),
            escalate_reauth_failures: false,
            default_scheme: default_scheme(),
            allowed_authorities: Vec::new(),
        }
    }
}

impl BulkConfig {
    /// Reads the configuration from `BULKAPI_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Unparsable values
    /// are logged and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = BulkConfig::default();
        BulkConfig {
            path: lookup("BULKAPI_PATH").unwrap_or(defaults.path),
            limit: parse_or("BULKAPI_LIMIT", &lookup, defaults.limit),
            max_concurrency: parse_or(
                "BULKAPI_MAX_CONCURRENCY",
                &lookup,
                defaults.max_concurrency,
            ),
            operation_timeout_secs: parse_or(
                "BULKAPI_TIMEOUT_SECS",
                &lookup,
                defaults.operation_timeout_secs,
            ),
            escalate_reauth_failures: parse_or(
                "BULKAPI_ESCALATE_REAUTH",
                &lookup,
                defaults.escalate_reauth_failures,
            ),
            default_scheme: lookup("BULKAPI_DEFAULT_SCHEME").unwrap_or(defaults.default_scheme),
            allowed_authorities: lookup("BULKAPI_ALLOWED_HOSTS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|host| !host.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.allowed_authorities),
        }
        .normalized()
    }

    /// Normalizes the path and clamps values that would disable the engine.
    pub fn normalized(mut self) -> Self {
        self.path = normalize_mount_path(&self.path);
        self.max_concurrency = self.max_concurrency.max(1);
        self.operation_timeout_secs = self.operation_timeout_secs.max(1);
        self
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Whether bulk requests arriving on `authority` may be served.
    pub fn authority_allowed(&self, authority: &str) -> bool {
        self.allowed_authorities.is_empty()
            || self
                .allowed_authorities
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(authority))
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, ?default, "ignoring unparsable setting");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = BulkConfig::from_lookup(lookup(&[]));
        assert_eq!(config, BulkConfig::default());
        assert_eq!(config.path, "/bulk");
        assert_eq!(config.limit, 100);
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_read_and_normalized() {
        let config = BulkConfig::from_lookup(lookup(&[
            ("BULKAPI_PATH", "batch/"),
            ("BULKAPI_LIMIT", "1000"),
            ("BULKAPI_MAX_CONCURRENCY", "0"),
            ("BULKAPI_TIMEOUT_SECS", "5"),
            ("BULKAPI_ESCALATE_REAUTH", "true"),
        ]));
        assert_eq!(config.path, "/batch");
        assert_eq!(config.limit, 1000);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.operation_timeout(), Duration::from_secs(5));
        assert!(config.escalate_reauth_failures);
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let config = BulkConfig::from_lookup(lookup(&[
            ("BULKAPI_LIMIT", "lots"),
            ("BULKAPI_ESCALATE_REAUTH", "sometimes"),
        ]));
        assert_eq!(config.limit, 100);
        assert!(!config.escalate_reauth_failures);
    }

    #[test]
    fn allowed_hosts_restrict_authorities() {
        let config = BulkConfig::from_lookup(lookup(&[(
            "BULKAPI_ALLOWED_HOSTS",
            "api.example.com, localhost:8080,",
        )]));
        assert_eq!(
            config.allowed_authorities,
            vec!["api.example.com".to_string(), "localhost:8080".to_string()]
        );
        assert!(config.authority_allowed("API.example.com"));
        assert!(config.authority_allowed("localhost:8080"));
        assert!(!config.authority_allowed("evil.example.net"));
        assert!(BulkConfig::default().authority_allowed("anything"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: BulkConfig = serde_json::from_str(r#"{ "limit": 5 }"#).unwrap();
        assert_eq!(config.limit, 5);
        assert_eq!(config.path, "/bulk");
    }
}
