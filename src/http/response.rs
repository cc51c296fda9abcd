//! Response building.
//!
//! # Responsibilities
//! - Hold the response produced by a handler (`Reply`)
//! - Map pipeline failures (decode, routing, handler) to status codes
//! - Render error bodies as `{"error": kind, "message": ...}`
//!
//! # Design Decisions
//! - Clients always receive a well-formed response; rendering cannot fail
//! - Raw body bytes of failed decodes are logged, never echoed back

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::body::DecodeError;

/// A response assembled by the pipeline.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn new(status: StatusCode, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self { status, headers, body }
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            status,
            headers,
            body: Bytes::from(body),
        })
    }

    /// Error reply with a machine-readable kind.
    pub fn error(status: StatusCode, kind: &str, message: &str) -> Self {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            error: &'a str,
            message: &'a str,
        }

        // Serializing two strings cannot fail.
        Self::json(status, &ErrorBody { error: kind, message })
            .unwrap_or_else(|_| Self::new(status, Bytes::from(kind.to_string())))
    }

    pub fn decode_failure(err: &DecodeError) -> Self {
        Self::error(err.status, err.kind.as_str(), &err.message)
    }

    pub fn not_found(path: &str) -> Self {
        Self::error(
            StatusCode::NOT_FOUND,
            "RouteNotFound",
            &format!("no route for {path}"),
        )
    }

    pub fn method_not_allowed(allowed: &[axum::http::Method]) -> Self {
        let allow = allowed
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut reply = Self::error(
            StatusCode::METHOD_NOT_ALLOWED,
            "MethodNotAllowed",
            "method not allowed for this route",
        );
        if let Ok(value) = HeaderValue::from_str(&allow) {
            reply.headers.insert(header::ALLOW, value);
        }
        reply
    }

    pub fn internal_error() -> Self {
        Self::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "HandlerFailure",
            "internal server error",
        )
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
