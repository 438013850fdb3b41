//! Bulk eligibility policy.
//!
//! [`EligibilityResolver`] looks up the route answering a (path, method) pair
//! and decides whether it may be invoked through the bulk endpoint. Verdicts
//! are memoized per pair; the catalog itself is never modified.

use std::sync::Arc;

use dashmap::DashMap;
use http::Method;

use crate::catalog::{find_route, RouteCatalog};

/// Memoized verdicts beyond this count are dropped wholesale, so paths with
/// unbounded parameter values cannot grow the cache without limit.
const CACHE_CAPACITY: usize = 4096;

/// Verdict for one (path, method) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EligibilityResult {
    pub eligible: bool,
    /// The matched route consumes a JSON body. Always false when ineligible.
    pub expects_body: bool,
}

impl EligibilityResult {
    pub const INELIGIBLE: EligibilityResult = EligibilityResult {
        eligible: false,
        expects_body: false,
    };
}

/// Resolves bulk eligibility against a host route catalog.
pub struct EligibilityResolver {
    catalog: Arc<dyn RouteCatalog>,
    cache: DashMap<(String, Method), EligibilityResult>,
}

impl EligibilityResolver {
    pub fn new(catalog: Arc<dyn RouteCatalog>) -> Self {
        EligibilityResolver {
            catalog,
            cache: DashMap::new(),
        }
    }

    /// Decides whether `path` (without query string) may be called with
    /// `method` through the bulk endpoint.
    pub fn resolve(&self, path: &str, method: &Method) -> EligibilityResult {
        let key = (path.to_string(), method.clone());
        if let Some(hit) = self.cache.get(&key) {
            return *hit;
        }

        let verdict = self.evaluate(path, method);
        if self.cache.len() >= CACHE_CAPACITY {
            self.cache.clear();
        }
        self.cache.insert(key, verdict);
        verdict
    }

    /// Drops memoized verdicts. Hosts whose catalog changes at runtime call
    /// this after each change.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    fn evaluate(&self, path: &str, method: &Method) -> EligibilityResult {
        let routes = self.catalog.routes();
        match find_route(&routes, path, method) {
            Some(route) if route.is_bulk_eligible() => EligibilityResult {
                eligible: true,
                expects_body: route.expects_body,
            },
            _ => EligibilityResult::INELIGIBLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::catalog::{RouteDescriptor, StaticRouteCatalog};

    fn resolver() -> EligibilityResolver {
        let catalog = StaticRouteCatalog::new(vec![
            RouteDescriptor::any_method("/home").bulkable(true),
            RouteDescriptor::new("/home2/{name}/ccc", Method::PUT).bulkable(true),
            RouteDescriptor::new("/home3", Method::PUT),
            RouteDescriptor::new("/home4", Method::POST).bulkable(false).accept_bulk(),
            RouteDescriptor::new("/home5", Method::GET).bulkable(false),
            RouteDescriptor::new("/list", Method::POST).bulkable(true).with_body(),
        ])
        .unwrap();
        EligibilityResolver::new(Arc::new(catalog))
    }

    #[test]
    fn auto_apply_group_is_eligible() {
        let r = resolver();
        assert!(r.resolve("/home", &Method::GET).eligible);
        assert!(r.resolve("/home", &Method::DELETE).eligible);
        assert!(r.resolve("/home2/AAA/ccc", &Method::PUT).eligible);
    }

    #[test]
    fn route_outside_bulk_group_is_ineligible() {
        let r = resolver();
        assert_eq!(r.resolve("/home3", &Method::PUT), EligibilityResult::INELIGIBLE);
    }

    #[test]
    fn opt_in_marker_enables_route_in_disabled_group() {
        let r = resolver();
        assert!(r.resolve("/home4", &Method::POST).eligible);
        assert!(!r.resolve("/home5", &Method::GET).eligible);
    }

    #[test]
    fn unknown_path_or_method_is_ineligible() {
        let r = resolver();
        assert!(!r.resolve("/nowhere", &Method::GET).eligible);
        assert!(!r.resolve("/home4", &Method::GET).eligible);
        assert!(!r.resolve("/home2/AAA/ccc", &Method::GET).eligible);
    }

    #[test]
    fn expects_body_follows_matched_route() {
        let r = resolver();
        assert_eq!(
            r.resolve("/list", &Method::POST),
            EligibilityResult {
                eligible: true,
                expects_body: true
            }
        );
        assert!(!r.resolve("/home4", &Method::POST).expects_body);
    }

    struct CountingCatalog {
        inner: StaticRouteCatalog,
        calls: AtomicUsize,
    }

    impl RouteCatalog for CountingCatalog {
        fn routes(&self) -> Vec<RouteDescriptor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.routes()
        }
    }

    #[test]
    fn verdicts_are_memoized_until_invalidated() {
        let catalog = Arc::new(CountingCatalog {
            inner: StaticRouteCatalog::new(vec![
                RouteDescriptor::new("/home", Method::GET).bulkable(true)
            ])
            .unwrap(),
            calls: AtomicUsize::new(0),
        });
        let r = EligibilityResolver::new(catalog.clone());

        assert!(r.resolve("/home", &Method::GET).eligible);
        assert!(r.resolve("/home", &Method::GET).eligible);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);

        r.invalidate();
        assert!(r.resolve("/home", &Method::GET).eligible);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }

    proptest! {
        #[test]
        fn resolving_twice_gives_the_same_verdict(
            path in "/[a-z0-9/]{0,24}",
            method in prop::sample::select(vec![
                Method::GET, Method::POST, Method::PUT, Method::DELETE,
            ]),
        ) {
            let r = resolver();
            let first = r.resolve(&path, &method);
            let second = r.resolve(&path, &method);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first, resolver().resolve(&path, &method));
        }
    }
}
