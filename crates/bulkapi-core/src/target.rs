//! Rewriting of operation targets into absolute sub-request URIs.
//!
//! A target is resolved relative to the base URL of the bulk request that
//! carried it: scheme, authority and whatever prefix the bulk endpoint is
//! mounted under. Targets that point back at the bulk endpoint are refused.

use std::sync::Arc;

use http::uri::{Authority, PathAndQuery, Scheme};
use http::Uri;

use crate::error::BulkError;

/// Host-supplied rewrite applied to every resolved sub-request URI.
pub trait UriTransform: Send + Sync {
    fn transform(&self, uri: Uri) -> Uri;
}

impl<F> UriTransform for F
where
    F: Fn(Uri) -> Uri + Send + Sync,
{
    fn transform(&self, uri: Uri) -> Uri {
        self(uri)
    }
}

/// Sends every sub-request to a fixed upstream, keeping path and query.
#[derive(Debug, Clone)]
pub struct UpstreamRebase {
    scheme: Scheme,
    authority: Authority,
}

impl UpstreamRebase {
    /// Returns `None` unless `base` has both a scheme and an authority.
    pub fn new(base: &Uri) -> Option<Self> {
        Some(UpstreamRebase {
            scheme: base.scheme()?.clone(),
            authority: base.authority()?.clone(),
        })
    }
}

impl UriTransform for UpstreamRebase {
    fn transform(&self, uri: Uri) -> Uri {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).unwrap_or(uri)
    }
}

/// Where the current bulk request arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub scheme: String,
    pub authority: String,
    /// Path of the inbound bulk request, including any mount prefix.
    pub path: String,
}

impl RequestContext {
    pub fn new(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        RequestContext {
            scheme: scheme.into(),
            authority: authority.into(),
            path: path.into(),
        }
    }

    /// The part of the inbound path before the last occurrence of
    /// `bulk_path`, e.g. `/api` for `/api/bulk`.
    pub fn mount_prefix(&self, bulk_path: &str) -> &str {
        match self.path.rfind(bulk_path) {
            Some(end) => &self.path[..end],
            None => "",
        }
    }

    /// Scheme, authority and mount prefix of the inbound URL.
    pub fn base_url(&self, bulk_path: &str) -> String {
        format!(
            "{}://{}{}",
            self.scheme,
            self.authority,
            self.mount_prefix(bulk_path)
        )
    }
}

/// An operation target ready for eligibility checks and dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Absolute URI to dispatch to, after the host transform.
    pub uri: Uri,
    /// Leading-slash path without query string, used for route matching.
    pub path: String,
}

/// Builds absolute sub-request URIs from operation targets.
pub struct TargetUriBuilder {
    bulk_path: String,
    transform: Option<Arc<dyn UriTransform>>,
}

impl TargetUriBuilder {
    pub fn new(bulk_path: &str) -> Self {
        TargetUriBuilder {
            bulk_path: normalize_mount_path(bulk_path),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn UriTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn bulk_path(&self) -> &str {
        &self.bulk_path
    }

    /// Resolves the target of operation `index`.
    pub fn build(
        &self,
        index: usize,
        raw: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<ResolvedTarget, BulkError> {
        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Err(BulkError::invalid_target(index, "", "target is empty")),
        };

        let normalized = normalize_target(raw);
        if normalized.contains('\\') {
            return Err(BulkError::invalid_target(
                index,
                normalized,
                "backslash in target",
            ));
        }

        // HTTP clients resolve dot segments before sending, so checks must
        // see the path the target will actually reach.
        let raw_path = strip_query(&normalized);
        let path = remove_dot_segments(raw_path);
        let target = format!("{}{}", path, &normalized[raw_path.len()..]);

        if is_within(&path, &self.bulk_path) {
            return Err(BulkError::invalid_target(
                index,
                target,
                "target refers to the bulk endpoint itself",
            ));
        }
        if !has_valid_escapes(&target) {
            return Err(BulkError::invalid_target(
                index,
                target,
                "malformed percent-encoding",
            ));
        }

        let absolute = format!("{}{}", ctx.base_url(&self.bulk_path), target);
        let mut uri = Uri::try_from(absolute.as_str()).map_err(|err| {
            BulkError::invalid_target(index, target.clone(), format!("not a valid URI: {}", err))
        })?;

        if let Some(transform) = &self.transform {
            uri = transform.transform(uri);
            let endpoint = normalize_mount_path(&format!(
                "{}{}",
                ctx.mount_prefix(&self.bulk_path),
                self.bulk_path
            ));
            if is_within(&remove_dot_segments(uri.path()), &endpoint) {
                return Err(BulkError::invalid_target(
                    index,
                    target,
                    "rewritten target refers to the bulk endpoint",
                ));
            }
        }

        Ok(ResolvedTarget { uri, path })
    }
}

/// `path` equals `prefix` or lies beneath it.
fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Resolves `.` and `..` segments of an absolute path (RFC 3986 §5.2.4),
/// including their percent-encoded spellings. `..` never climbs above the
/// root.
pub fn remove_dot_segments(path: &str) -> String {
    let segments: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();
    let last = segments.len() - 1;

    let mut output: Vec<&str> = Vec::with_capacity(segments.len());
    let mut trailing_slash = false;
    for (i, segment) in segments.iter().enumerate() {
        match dot_segment(segment) {
            Some(DotSegment::Current) => trailing_slash = i == last,
            Some(DotSegment::Parent) => {
                output.pop();
                trailing_slash = i == last;
            }
            None => output.push(segment),
        }
    }

    let mut resolved = String::with_capacity(path.len());
    for segment in &output {
        resolved.push('/');
        resolved.push_str(segment);
    }
    if trailing_slash || resolved.is_empty() {
        resolved.push('/');
    }
    resolved
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    let is_dot = |s: &str| s == "." || s.eq_ignore_ascii_case("%2e");
    if is_dot(segment) {
        return Some(DotSegment::Current);
    }
    let parent = ["..", ".%2e", "%2e.", "%2e%2e"];
    parent
        .iter()
        .any(|p| segment.eq_ignore_ascii_case(p))
        .then_some(DotSegment::Parent)
}

/// Trims whitespace and guarantees a leading `/`.
pub fn normalize_target(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Leading `/`, no trailing `/` (except for the root itself).
pub fn normalize_mount_path(raw: &str) -> String {
    let normalized = normalize_target(raw);
    match normalized.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// The path part of a target: everything before `?` or `#`.
pub fn strip_query(target: &str) -> &str {
    match target.find(['?', '#']) {
        Some(end) => &target[..end],
        None => target,
    }
}

fn has_valid_escapes(target: &str) -> bool {
    let bytes = target.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new("http", "localhost:8080", "/bulk")
    }

    fn builder() -> TargetUriBuilder {
        TargetUriBuilder::new("/bulk")
    }

    #[test]
    fn relative_and_rooted_targets_resolve_identically() {
        let a = builder().build(0, Some("home"), &ctx()).unwrap();
        let b = builder().build(0, Some("/home"), &ctx()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.uri.to_string(), "http://localhost:8080/home");
        assert_eq!(a.path, "/home");
    }

    #[test]
    fn query_string_is_preserved_but_not_matched() {
        let t = builder()
            .build(0, Some("/getwithparameter?abc=query_param"), &ctx())
            .unwrap();
        assert_eq!(
            t.uri.to_string(),
            "http://localhost:8080/getwithparameter?abc=query_param"
        );
        assert_eq!(t.path, "/getwithparameter");
    }

    #[test]
    fn mount_prefix_of_the_bulk_request_is_kept() {
        let ctx = RequestContext::new("https", "api.example.com", "/v1/bulk");
        let t = builder().build(0, Some("users/7"), &ctx).unwrap();
        assert_eq!(t.uri.to_string(), "https://api.example.com/v1/users/7");
        assert_eq!(t.path, "/users/7");
    }

    #[test]
    fn empty_targets_are_rejected() {
        for raw in [None, Some(""), Some("   ")] {
            let err = builder().build(3, raw, &ctx()).unwrap_err();
            assert!(matches!(err, BulkError::InvalidTarget { index: 3, .. }));
        }
    }

    #[test]
    fn bulk_endpoint_and_its_sub_paths_are_rejected() {
        for raw in ["/bulk", "bulk", " /bulk ", "/bulk/", "/bulk/nested", "/bulk?x=1"] {
            assert!(
                builder().build(0, Some(raw), &ctx()).is_err(),
                "{raw} should be rejected"
            );
        }
        assert!(builder().build(0, Some("/bulky"), &ctx()).is_ok());
        assert!(builder().build(0, Some("/other/bulk"), &ctx()).is_ok());
    }

    #[test]
    fn malformed_targets_are_rejected() {
        for raw in [
            "http://0:0:0:0:0:0:0:1%0:8080/home",
            "/home%zz",
            "/home%4",
            "/with space",
            "/tab\there",
        ] {
            let err = builder().build(0, Some(raw), &ctx()).unwrap_err();
            assert!(matches!(err, BulkError::InvalidTarget { .. }), "{raw}");
        }
        assert!(builder().build(0, Some("/caf%C3%A9"), &ctx()).is_ok());
    }

    #[test]
    fn transform_hook_rewrites_resolved_uri() {
        let builder = builder().with_transform(Arc::new(|uri: Uri| {
            let rewritten = format!("http://internal:9000{}", uri.path());
            Uri::try_from(rewritten).unwrap_or(uri)
        }));
        let t = builder.build(0, Some("/home"), &ctx()).unwrap();
        assert_eq!(t.uri.to_string(), "http://internal:9000/home");
        assert_eq!(t.path, "/home");
    }

    #[test]
    fn upstream_rebase_swaps_scheme_and_authority() {
        let rebase = UpstreamRebase::new(&Uri::from_static("https://svc.internal:8443")).unwrap();
        let uri = rebase.transform(Uri::from_static("http://localhost:3000/a/b?c=d"));
        assert_eq!(uri.to_string(), "https://svc.internal:8443/a/b?c=d");
        assert!(UpstreamRebase::new(&Uri::from_static("/relative")).is_none());
    }

    #[test]
    fn dot_segments_cannot_reach_the_bulk_endpoint() {
        for raw in [
            "/files/../bulk",
            "/./bulk",
            "files/../bulk/x",
            "/a/b/../../bulk?x=1",
            "/files/%2e%2e/bulk",
            "/files/.%2E/bulk",
            "/../../bulk",
        ] {
            let err = builder().build(0, Some(raw), &ctx()).unwrap_err();
            assert!(
                matches!(err, BulkError::InvalidTarget { index: 0, .. }),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn dot_segments_are_resolved_in_uri_and_path() {
        let t = builder()
            .build(0, Some("/files/./a/../home?q=1"), &ctx())
            .unwrap();
        assert_eq!(t.path, "/files/home");
        assert_eq!(t.uri.to_string(), "http://localhost:8080/files/home?q=1");

        let ctx = RequestContext::new("http", "localhost:8080", "/api/bulk");
        let t = builder().build(0, Some("/../users"), &ctx).unwrap();
        assert_eq!(t.uri.to_string(), "http://localhost:8080/api/users");
    }

    #[test]
    fn backslashes_are_rejected() {
        assert!(builder().build(0, Some("/files\\..\\bulk"), &ctx()).is_err());
    }

    #[test]
    fn transform_into_the_bulk_endpoint_is_rejected() {
        let builder = builder().with_transform(Arc::new(|uri: Uri| {
            let rewritten = format!("http://localhost:8080/api/bulk{}", uri.path());
            Uri::try_from(rewritten).unwrap_or(uri)
        }));
        let ctx = RequestContext::new("http", "localhost:8080", "/api/bulk");
        let err = builder.build(0, Some("/home"), &ctx).unwrap_err();
        assert!(matches!(err, BulkError::InvalidTarget { .. }));
    }

    #[test]
    fn dot_segment_removal() {
        assert_eq!(remove_dot_segments("/a/b/c/./../../g"), "/a/g");
        assert_eq!(remove_dot_segments("/a/b/"), "/a/b/");
        assert_eq!(remove_dot_segments("/a/."), "/a/");
        assert_eq!(remove_dot_segments("/a/.."), "/");
        assert_eq!(remove_dot_segments("/.."), "/");
        assert_eq!(remove_dot_segments("/"), "/");
        assert_eq!(remove_dot_segments("/a//b"), "/a//b");
        assert_eq!(remove_dot_segments("/a/.hidden/..x"), "/a/.hidden/..x");
    }

    #[test]
    fn mount_path_normalization() {
        assert_eq!(normalize_mount_path("bulk"), "/bulk");
        assert_eq!(normalize_mount_path("/bulk/"), "/bulk");
        assert_eq!(normalize_mount_path("/"), "/");
        assert_eq!(TargetUriBuilder::new("batch/").bulk_path(), "/batch");
    }

    proptest! {
        #[test]
        fn anything_under_the_bulk_path_is_rejected(suffix in "(/[a-zA-Z0-9_-]{0,8}){0,4}") {
            let raw = format!("/bulk{}", suffix);
            prop_assert!(builder().build(0, Some(&raw), &ctx()).is_err());
        }

        #[test]
        fn resolved_paths_have_no_dot_segments(raw in "(/(\\.|\\.\\.|[a-z]{1,3})){0,6}/?") {
            let resolved = remove_dot_segments(&format!("/{}", raw.trim_start_matches('/')));
            prop_assert!(resolved.starts_with('/'));
            prop_assert!(resolved.split('/').all(|s| s != "." && s != ".."));
            prop_assert_eq!(remove_dot_segments(&resolved), resolved.clone());
        }

        #[test]
        fn normalization_is_idempotent(raw in "[ ]{0,2}/?[a-z0-9/?=&]{0,16}[ ]{0,2}") {
            let once = normalize_target(&raw);
            prop_assert!(once.starts_with('/'));
            prop_assert_eq!(normalize_target(&once), once.clone());
        }
    }
}
