//! Route matching logic.
//!
//! # Responsibilities
//! - Match path prefixes on segment boundaries (case-sensitive)
//! - Match request methods against an optional allow-list
//!
//! # Design Decisions
//! - `/api` matches `/api` and `/api/...`, never `/apiary`
//! - A prefix ending in `/` matches anything below it
//! - No regex to guarantee O(n) matching

use axum::http::Method;

/// Matches the request path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher. A missing leading `/` is added.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix.starts_with('/') {
            prefix
        } else {
            format!("/{prefix}")
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of bytes matched; longer means more specific.
    pub fn specificity(&self) -> usize {
        self.prefix.len()
    }

    pub fn matches(&self, path: &str) -> bool {
        if !path.starts_with(&self.prefix) {
            return false;
        }
        self.prefix.ends_with('/')
            || path.len() == self.prefix.len()
            || path.as_bytes()[self.prefix.len()] == b'/'
    }
}

/// Matches request methods. An empty list accepts every method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodMatcher {
    allowed: Vec<Method>,
}

impl MethodMatcher {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn only(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            allowed: methods.into_iter().collect(),
        }
    }

    pub fn allowed(&self) -> &[Method] {
        &self.allowed
    }

    pub fn matches(&self, method: &Method) -> bool {
        // HEAD is served wherever GET is.
        self.allowed.is_empty()
            || self.allowed.contains(method)
            || (*method == Method::HEAD && self.allowed.contains(&Method::GET))
    }
}
