//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store route bindings registered at startup
//! - Look up the handler chain for a method and path
//! - Return matched chain, method mismatch, or explicit not-found
//!
//! # Design Decisions
//! - Immutable after `build()` (shared across requests without locks)
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Longest prefix wins; equal prefixes keep registration order

use std::sync::Arc;

use axum::http::Method;

use crate::pipeline::handler::{HandlerChain, SharedHandler};
use crate::routing::matcher::{MethodMatcher, PathPrefixMatcher};

/// Registration function supplied by the embedding application.
pub type RouteRegistrar = Arc<dyn Fn(&mut RouteTableBuilder) + Send + Sync>;

/// One path prefix bound to a handler chain.
#[derive(Debug, Clone)]
pub struct RouteBinding {
    path: PathPrefixMatcher,
    methods: MethodMatcher,
    chain: HandlerChain,
}

impl RouteBinding {
    pub fn prefix(&self) -> &str {
        self.path.prefix()
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }
}

/// Outcome of a route lookup.
#[derive(Debug)]
pub enum Resolution<'a> {
    Matched(&'a RouteBinding),
    /// The path matched but no binding accepts the method.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// Collects bindings during startup.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    bindings: Vec<RouteBinding>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a prefix for every method.
    pub fn route(&mut self, prefix: impl Into<String>, chain: impl Into<HandlerChain>) -> &mut Self {
        self.push(prefix, MethodMatcher::any(), chain.into())
    }

    /// Bind a prefix for the listed methods only.
    pub fn route_methods(
        &mut self,
        prefix: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
        chain: impl Into<HandlerChain>,
    ) -> &mut Self {
        self.push(prefix, MethodMatcher::only(methods), chain.into())
    }

    pub fn get(&mut self, prefix: impl Into<String>, handler: SharedHandler) -> &mut Self {
        self.route_methods(prefix, [Method::GET], handler)
    }

    pub fn post(&mut self, prefix: impl Into<String>, handler: SharedHandler) -> &mut Self {
        self.route_methods(prefix, [Method::POST], handler)
    }

    fn push(&mut self, prefix: impl Into<String>, methods: MethodMatcher, chain: HandlerChain) -> &mut Self {
        self.bindings.push(RouteBinding {
            path: PathPrefixMatcher::new(prefix),
            methods,
            chain,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Freeze the table.
    pub fn build(self) -> RouteTable {
        RouteTable {
            bindings: self.bindings.into(),
        }
    }
}

/// Frozen prefix → handler chain table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    bindings: Arc<[RouteBinding]>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    /// Build a table by running a registration function.
    pub fn from_registrar(registrar: &RouteRegistrar) -> Self {
        let mut builder = RouteTableBuilder::new();
        registrar(&mut builder);
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let mut best: Option<&RouteBinding> = None;
        let mut path_matched = false;
        let mut allowed: Vec<Method> = Vec::new();

        for binding in self.bindings.iter() {
            if !binding.path.matches(path) {
                continue;
            }
            path_matched = true;

            if !binding.methods.matches(method) {
                for m in binding.methods.allowed() {
                    if !allowed.contains(m) {
                        allowed.push(m.clone());
                    }
                }
                continue;
            }

            // Strictly longer only: the earlier registration wins ties.
            if best.map_or(true, |b| binding.path.specificity() > b.path.specificity()) {
                best = Some(binding);
            }
        }

        match best {
            Some(binding) => Resolution::Matched(binding),
            None if path_matched => Resolution::MethodNotAllowed(allowed),
            None => Resolution::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::handler::{handler_fn, Flow};

    fn tagged(tag: &'static str) -> SharedHandler {
        handler_fn(move |ctx| {
            ctx.state.insert("tag".into(), tag.into());
            Ok(Flow::Next)
        })
    }

    fn prefix_of(resolution: Resolution<'_>) -> Option<String> {
        match resolution {
            Resolution::Matched(b) => Some(b.prefix().to_string()),
            _ => None,
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let mut builder = RouteTable::builder();
        builder.route("/api", tagged("api")).route("/api/v1", tagged("v1"));
        let table = builder.build();

        assert_eq!(prefix_of(table.resolve(&Method::GET, "/api/v1/users")).as_deref(), Some("/api/v1"));
        assert_eq!(prefix_of(table.resolve(&Method::GET, "/api/v2")).as_deref(), Some("/api"));
        assert!(matches!(table.resolve(&Method::GET, "/other"), Resolution::NotFound));
    }

    #[test]
    fn equal_prefixes_resolve_to_first_registered() {
        let mut builder = RouteTable::builder();
        builder.route("/dup", tagged("first")).route("/dup", tagged("second"));
        let table = builder.build();

        let Resolution::Matched(binding) = table.resolve(&Method::GET, "/dup") else {
            panic!("expected a match");
        };
        let mut ctx = crate::pipeline::RequestContext::for_test(Method::GET, "/dup");
        futures_util::FutureExt::now_or_never(binding.chain().run(&mut ctx))
            .expect("sync handler")
            .unwrap();
        assert_eq!(ctx.state["tag"], "first");
    }

    #[test]
    fn method_mismatch_reports_allowed_methods() {
        let mut builder = RouteTable::builder();
        builder.get("/items", tagged("list")).post("/items", tagged("create"));
        let table = builder.build();

        assert!(matches!(table.resolve(&Method::POST, "/items"), Resolution::Matched(_)));
        match table.resolve(&Method::DELETE, "/items/3") {
            Resolution::MethodNotAllowed(allowed) => assert_eq!(allowed, vec![Method::GET, Method::POST]),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn registrar_populates_table() {
        let registrar: RouteRegistrar = Arc::new(|routes: &mut RouteTableBuilder| {
            routes.route("/a", tagged("a"));
            routes.route("/b", tagged("b"));
        });
        let table = RouteTable::from_registrar(&registrar);
        assert_eq!(table.len(), 2);
    }
}
