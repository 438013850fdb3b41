//! Read-only view over the host's registered routes.
//!
//! The host describes each endpoint with a [`RouteDescriptor`] and exposes
//! the full list through the [`RouteCatalog`] trait. Patterns use the same
//! syntax as axum 0.8 routes: literal segments, `{name}` for one segment and
//! a trailing `{*name}` for the remainder of the path.

use std::path::Path;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Metadata for one host endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Path pattern, e.g. `/users/{id}/orders`.
    pub pattern: String,
    /// Method this route answers; `None` answers every method.
    #[serde(default, with = "optional_method")]
    pub method: Option<Method>,
    /// The route's group is exposed through the bulk endpoint at all.
    #[serde(default)]
    pub bulk_eligible: bool,
    /// Every route of the group is eligible without a per-route marker.
    #[serde(default = "default_auto_apply")]
    pub auto_apply: bool,
    /// Per-route opt-in marker, consulted when `auto_apply` is off.
    #[serde(default)]
    pub accept_bulk: bool,
    /// The handler consumes a structured (JSON) body.
    #[serde(default)]
    pub expects_body: bool,
}

fn default_auto_apply() -> bool {
    true
}

impl RouteDescriptor {
    /// A route that is not exposed through the bulk endpoint.
    pub fn new(pattern: impl Into<String>, method: Method) -> Self {
        RouteDescriptor {
            pattern: pattern.into(),
            method: Some(method),
            bulk_eligible: false,
            auto_apply: true,
            accept_bulk: false,
            expects_body: false,
        }
    }

    /// A route answering every method.
    pub fn any_method(pattern: impl Into<String>) -> Self {
        RouteDescriptor {
            method: None,
            ..RouteDescriptor::new(pattern, Method::GET)
        }
    }

    /// Marks the route's group as bulk-eligible. With `auto_apply` false the
    /// route also needs [`RouteDescriptor::accept_bulk`].
    pub fn bulkable(mut self, auto_apply: bool) -> Self {
        self.bulk_eligible = true;
        self.auto_apply = auto_apply;
        self
    }

    pub fn accept_bulk(mut self) -> Self {
        self.accept_bulk = true;
        self
    }

    pub fn with_body(mut self) -> Self {
        self.expects_body = true;
        self
    }

    /// Whether the eligibility policy admits this route.
    pub fn is_bulk_eligible(&self) -> bool {
        self.bulk_eligible && (self.auto_apply || self.accept_bulk)
    }

    /// Whether this route answers `method`.
    pub fn accepts_method(&self, method: &Method) -> bool {
        match &self.method {
            Some(m) => m == method,
            None => true,
        }
    }

    /// Matches `path` against the pattern, returning how specific the match
    /// was. `path` must not carry a query string.
    pub fn match_path(&self, path: &str) -> Option<Specificity> {
        let pattern = parse_pattern(&self.pattern).ok()?;
        let parts = path_segments(path);

        let mut literals = 0;
        let mut catch_all = false;
        let mut consumed = 0;
        for segment in &pattern {
            match segment {
                Segment::Literal(lit) => {
                    if parts.get(consumed) != Some(lit) {
                        return None;
                    }
                    literals += 1;
                    consumed += 1;
                }
                Segment::Param => {
                    match parts.get(consumed) {
                        Some(part) if !part.is_empty() => consumed += 1,
                        _ => return None,
                    }
                }
                Segment::CatchAll => {
                    if consumed >= parts.len() {
                        return None;
                    }
                    consumed = parts.len();
                    catch_all = true;
                }
            }
        }

        (consumed == parts.len()).then_some(Specificity {
            literals,
            exact: !catch_all,
            method_bound: self.method.is_some(),
        })
    }
}

/// Ranking of a pattern match. Larger is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    literals: usize,
    exact: bool,
    method_bound: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Param,
    CatchAll,
}

fn path_segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment<'_>>, String> {
    if !pattern.starts_with('/') {
        return Err("pattern must start with '/'".to_string());
    }

    let parts = path_segments(pattern);
    let mut segments = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(name) => {
                if let Some(rest) = name.strip_prefix('*') {
                    if rest.is_empty() {
                        return Err("catch-all parameter needs a name".to_string());
                    }
                    if i + 1 != parts.len() {
                        return Err("catch-all parameter must be the last segment".to_string());
                    }
                    Segment::CatchAll
                } else if name.is_empty() || name.contains(['{', '}']) {
                    return Err(format!("malformed parameter segment '{}'", part));
                } else {
                    Segment::Param
                }
            }
            None if part.contains(['{', '}']) => {
                return Err(format!(
                    "segment '{}' mixes literal text and a parameter",
                    part
                ));
            }
            None => Segment::Literal(part),
        };
        segments.push(segment);
    }
    Ok(segments)
}

/// Finds the most specific route answering `path` with `method`.
pub fn find_route<'a>(
    routes: &'a [RouteDescriptor],
    path: &str,
    method: &Method,
) -> Option<&'a RouteDescriptor> {
    routes
        .iter()
        .filter(|route| route.accepts_method(method))
        .filter_map(|route| route.match_path(path).map(|rank| (rank, route)))
        .max_by_key(|(rank, _)| *rank)
        .map(|(_, route)| route)
}

/// Source of the host's route descriptors.
///
/// The engine only reads from the catalog; implementations backed by live
/// routing tables must return a consistent snapshot per call.
pub trait RouteCatalog: Send + Sync {
    fn routes(&self) -> Vec<RouteDescriptor>;
}

/// A fixed, validated list of routes.
#[derive(Debug, Clone, Default)]
pub struct StaticRouteCatalog {
    routes: Vec<RouteDescriptor>,
}

impl StaticRouteCatalog {
    /// Builds a catalog, rejecting malformed patterns up front.
    pub fn new(routes: Vec<RouteDescriptor>) -> Result<Self, CatalogError> {
        for route in &routes {
            parse_pattern(&route.pattern).map_err(|reason| CatalogError::InvalidPattern {
                pattern: route.pattern.clone(),
                reason,
            })?;
        }
        Ok(StaticRouteCatalog { routes })
    }

    /// Parses a JSON array of descriptors.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let routes: Vec<RouteDescriptor> = serde_json::from_str(json)?;
        Self::new(routes)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteCatalog for StaticRouteCatalog {
    fn routes(&self) -> Vec<RouteDescriptor> {
        self.routes.clone()
    }
}

mod optional_method {
    use http::Method;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::model::standard_method;

    pub fn serialize<S: Serializer>(method: &Option<Method>, s: S) -> Result<S::Ok, S::Error> {
        match method {
            Some(m) => s.serialize_some(m.as_str()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Method>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|name| {
            standard_method(&name)
                .ok_or_else(|| D::Error::custom(format!("unknown HTTP method '{}'", name)))
        })
        .transpose()
    }
}
