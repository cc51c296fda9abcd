//! Request pipeline composition.
//!
//! # Data Flow
//! ```text
//! before-filters → body decode → route resolution → handler chain → after-filters
//! ```
//!
//! # Design Decisions
//! - `Flow::Halt` from any filter or handler ends the pipeline with the
//!   response set so far
//! - Decode failures and route misses become responses and still pass
//!   through the after-filters
//! - Handler errors and panics are contained here and become one 500

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::body::Bytes;
use futures_util::{FutureExt, Stream};

use crate::body::decode;
use crate::config::BodyConfig;
use crate::http::response::Reply;
use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::pipeline::handler::{run_steps, Flow, HandlerResult, SharedHandler};
use crate::routing::{Resolution, RouteTable};

/// Ordered filters run around route handling.
#[derive(Clone, Default)]
pub struct Filters {
    pub before: Vec<SharedHandler>,
    pub after: Vec<SharedHandler>,
}

impl std::fmt::Debug for Filters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filters")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

/// The assembled request-handling function of a worker.
#[derive(Debug)]
pub struct RequestPipeline {
    filters: Filters,
    routes: RouteTable,
    body: BodyConfig,
}

impl RequestPipeline {
    pub fn new(filters: Filters, routes: RouteTable, body: BodyConfig) -> Self {
        Self { filters, routes, body }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Run the pipeline for one request. Always produces a reply.
    pub async fn handle<S, E>(&self, mut ctx: RequestContext, body: S) -> Reply
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
        E: std::fmt::Display,
    {
        let outcome = AssertUnwindSafe(self.run(&mut ctx, body)).catch_unwind().await;

        match outcome {
            Ok(Ok(_)) => ctx
                .take_reply()
                .unwrap_or_else(|| Reply::not_found(&ctx.path)),
            Ok(Err(err)) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    method = %ctx.method,
                    path = %ctx.path,
                    error = %err,
                    "Handler failed"
                );
                metrics::record_handler_failure("error");
                Reply::internal_error()
            }
            Err(panic) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    method = %ctx.method,
                    path = %ctx.path,
                    panic = %panic_message(panic.as_ref()),
                    "Handler panicked"
                );
                metrics::record_handler_failure("panic");
                Reply::internal_error()
            }
        }
    }

    async fn run<S, E>(&self, ctx: &mut RequestContext, body: S) -> HandlerResult
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
        E: std::fmt::Display,
    {
        if run_steps(&self.filters.before, ctx).await? == Flow::Halt {
            return Ok(Flow::Halt);
        }

        let content_type = ctx.content_type().map(str::to_string);
        let content_length = ctx.content_length();
        ctx.body = decode(body, content_type.as_deref(), content_length, &self.body).await;

        if let Some(err) = ctx.body.error() {
            tracing::warn!(
                request_id = %ctx.request_id,
                kind = %err.kind,
                raw_len = err.raw.len(),
                error = %err.message,
                "Request body rejected"
            );
            metrics::record_decode_error(err.kind.as_str());
            let reply = Reply::decode_failure(err);
            ctx.set_reply(reply);
        } else {
            match self.routes.resolve(&ctx.method, &ctx.path) {
                Resolution::Matched(binding) => {
                    ctx.matched_prefix = Some(binding.prefix().to_string());
                    if binding.chain().run(ctx).await? == Flow::Halt {
                        return Ok(Flow::Halt);
                    }
                }
                Resolution::MethodNotAllowed(allowed) => {
                    ctx.set_reply(Reply::method_not_allowed(&allowed));
                }
                Resolution::NotFound => {
                    tracing::debug!(request_id = %ctx.request_id, path = %ctx.path, "No route matched");
                    let reply = Reply::not_found(&ctx.path);
                    ctx.set_reply(reply);
                }
            }
        }

        run_steps(&self.filters.after, ctx).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
