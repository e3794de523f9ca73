//! Route table for proxied paths
//!
//! Each entry pairs an anchored path regex and its allowed methods with the
//! backend that serves it. Ids are matched by shape so a malformed id never
//! reaches a backend.

use hyper::Method;
use regex::Regex;

/// Item, link and user ids: three-letter prefix plus 22 base-62 chars
const ITEM_ID: &str = "[a-z]{3}_[0-9A-Za-z]{22}";
const LINK_ID: &str = "lnk_[0-9A-Za-z]{22}";
const CLAIM_ID: &str = "claim_[0-9A-Za-z]{22}";
const ORG_ID: &str = "org_[0-9A-Za-z]{22}";
const PURCHASE_ID: &str = "[A-Z]{3}-[0-9]{6}";
const SEGMENT: &str = "[^/]+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Users,
    Items,
    Search,
    Categories,
    Payments,
}

#[derive(Debug)]
pub struct Route {
    pattern: Regex,
    methods: Vec<Method>,
    pub backend: Backend,
    /// Reject anonymous callers at the gateway with 401
    pub requires_auth: bool,
}

#[derive(Debug)]
pub enum RouteMatch<'a> {
    Matched(&'a Route),
    MethodNotAllowed,
    NotFound,
}

pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(webhook_path: &str) -> Result<Self, regex::Error> {
        use Backend::*;
        use Method as M;

        let specs: Vec<(String, Vec<Method>, Backend, bool)> = vec![
            // Users and organisations
            ("/me".into(), vec![M::GET, M::PATCH, M::DELETE], Users, true),
            ("/me/api-key".into(), vec![M::POST, M::DELETE], Users, true),
            ("/me/orgs".into(), vec![M::GET], Users, true),
            ("/orgs".into(), vec![M::GET, M::POST], Users, false),
            (format!("/org/{ORG_ID}"), vec![M::GET, M::PATCH, M::DELETE], Users, false),
            (format!("/org/{ORG_ID}/users"), vec![M::GET, M::POST], Users, false),
            // Items
            ("/items".into(), vec![M::GET, M::POST], Items, false),
            ("/items/info".into(), vec![M::GET], Items, false),
            (format!("/item/{ITEM_ID}"), vec![M::GET, M::PATCH, M::DELETE], Items, false),
            (format!("/item/{ITEM_ID}/approval"), vec![M::POST], Items, false),
            (format!("/item/{ITEM_ID}/availability"), vec![M::POST], Items, false),
            (format!("/item/{ITEM_ID}/claim-ownership"), vec![M::POST], Items, false),
            (format!("/item/{ITEM_ID}/links"), vec![M::GET, M::POST], Items, false),
            (format!("/item-link/{LINK_ID}"), vec![M::DELETE], Items, false),
            ("/item-collections".into(), vec![M::GET, M::POST], Items, false),
            (format!("/item-collection/{SEGMENT}"), vec![M::GET, M::DELETE], Items, false),
            (
                format!("/item-collection/{SEGMENT}/item/{ITEM_ID}"),
                vec![M::PUT, M::DELETE],
                Items,
                false,
            ),
            ("/ownership-claims".into(), vec![M::GET], Items, false),
            (format!("/ownership-claim/{CLAIM_ID}"), vec![M::DELETE], Items, false),
            (format!("/ownership-claim/{CLAIM_ID}/status"), vec![M::POST], Items, false),
            (format!("/tag/{SEGMENT}"), vec![M::GET], Items, false),
            // Search and categories
            ("/search/.+".into(), vec![M::GET], Search, false),
            ("/categories".into(), vec![M::GET], Categories, false),
            (format!("/category/{SEGMENT}"), vec![M::GET], Categories, false),
            // Payments
            ("/purchases".into(), vec![M::GET, M::POST], Payments, true),
            (format!("/purchase/{PURCHASE_ID}"), vec![M::GET], Payments, true),
            (regex::escape(webhook_path), vec![M::POST], Payments, false),
        ];

        let routes = specs
            .into_iter()
            .map(|(pattern, methods, backend, requires_auth)| {
                Ok(Route {
                    pattern: Regex::new(&format!("^{}$", pattern))?,
                    methods,
                    backend,
                    requires_auth,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { routes })
    }

    /// Find the route for a request; a path match with the wrong method is 405
    pub fn resolve(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let mut path_matched = false;
        for route in self.routes.iter().filter(|r| r.pattern.is_match(path)) {
            if route.methods.contains(method) {
                return RouteMatch::Matched(route);
            }
            path_matched = true;
        }
        if path_matched {
            RouteMatch::MethodNotAllowed
        } else {
            RouteMatch::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = "htl_0123456789abcdefghijKL";

    fn table() -> RouteTable {
        RouteTable::new("/webhooks/stripe").unwrap()
    }

    fn backend(method: Method, path: &str) -> Option<Backend> {
        match table().resolve(&method, path) {
            RouteMatch::Matched(route) => Some(route.backend),
            _ => None,
        }
    }

    #[test]
    fn test_item_routes() {
        assert_eq!(backend(Method::GET, "/items"), Some(Backend::Items));
        assert_eq!(backend(Method::PATCH, &format!("/item/{}", ITEM)), Some(Backend::Items));
        assert_eq!(
            backend(Method::PUT, &format!("/item-collection/shopping/item/{}", ITEM)),
            Some(Backend::Items)
        );
        assert_eq!(backend(Method::GET, "/item/not-an-id"), None);
    }

    #[test]
    fn test_method_not_allowed_and_not_found() {
        let table = table();
        assert!(matches!(
            table.resolve(&Method::PUT, "/items"),
            RouteMatch::MethodNotAllowed
        ));
        assert!(matches!(table.resolve(&Method::GET, "/nowhere"), RouteMatch::NotFound));
    }

    #[test]
    fn test_auth_flags_and_webhook() {
        let table = table();
        match table.resolve(&Method::GET, "/me") {
            RouteMatch::Matched(route) => assert!(route.requires_auth),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(backend(Method::POST, "/webhooks/stripe"), Some(Backend::Payments));
        assert_eq!(backend(Method::GET, "/purchase/ABC-123456"), Some(Backend::Payments));
        assert_eq!(backend(Method::GET, "/search/geo"), Some(Backend::Search));
    }
}
