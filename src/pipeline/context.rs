//! Per-request context passed through filters and handlers.
//!
//! # Responsibilities
//! - Carry method, path, query, headers and the request id
//! - Hold the decoded body once the decode stage has run
//! - Collect the response produced by handlers
//!
//! # Design Decisions
//! - Owned by a single request invocation, never shared
//! - Handlers communicate through `state`, a free-form JSON map

use axum::body::Bytes;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::body::DecodedBody;
use crate::http::response::Reply;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Transient request state owned by one pipeline invocation.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub request_id: String,
    pub body: DecodedBody,
    /// Prefix of the route that matched, once routing has run.
    pub matched_prefix: Option<String>,
    /// Scratch space shared between the steps of this request.
    pub state: Map<String, Value>,
    response: Option<Reply>,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts) -> Self {
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            request_id,
            body: DecodedBody::default(),
            matched_prefix: None,
            state: Map::new(),
            response: None,
        }
    }

    /// Context for a request without headers or body.
    pub fn for_test(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: None,
            headers: HeaderMap::new(),
            request_id: "test".to_string(),
            body: DecodedBody::default(),
            matched_prefix: None,
            state: Map::new(),
            response: None,
        }
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH).and_then(|v| v.trim().parse().ok())
    }

    /// Set a plain-text or binary response, replacing any previous one.
    pub fn respond(&mut self, status: StatusCode, body: impl Into<Bytes>) {
        self.response = Some(Reply::new(status, body.into()));
    }

    /// Set a JSON response.
    pub fn json<T: Serialize>(&mut self, status: StatusCode, value: &T) -> Result<(), serde_json::Error> {
        self.response = Some(Reply::json(status, value)?);
        Ok(())
    }

    /// Add a header to the current response. No-op when nothing responded yet.
    pub fn set_response_header(&mut self, name: HeaderName, value: HeaderValue) {
        if let Some(reply) = self.response.as_mut() {
            reply.headers.insert(name, value);
        }
    }

    pub fn response(&self) -> Option<&Reply> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Reply> {
        self.response.as_mut()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|r| r.status)
    }

    pub(crate) fn set_reply(&mut self, reply: Reply) {
        self.response = Some(reply);
    }

    pub(crate) fn take_reply(&mut self) -> Option<Reply> {
        self.response.take()
    }
}
