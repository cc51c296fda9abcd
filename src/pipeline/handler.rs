//! Handler and filter abstraction.
//!
//! Filters and route handlers share one trait. Each step receives the mutable
//! request context and decides whether the pipeline continues.

use std::future::{ready, Future};
use std::pin::Pin;
use std::sync::Arc;

use crate::pipeline::context::RequestContext;

/// Boxed future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure raised by a handler. Converted to a 500 response by the pipeline.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<Flow, HandlerError>;

/// What the pipeline does after a step returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next step.
    Next,
    /// Skip every remaining filter and handler; the current response is final.
    Halt,
}

/// A pipeline step: before/after filter or route handler.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult>;
}

pub type SharedHandler = Arc<dyn Handler>;

/// Adapter for synchronous closures.
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult> {
        Box::pin(ready((self.0)(ctx)))
    }
}

/// Wrap a synchronous closure as a handler.
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Ordered handlers bound to one route.
#[derive(Clone, Default)]
pub struct HandlerChain {
    steps: Vec<SharedHandler>,
}

impl HandlerChain {
    pub fn new(steps: Vec<SharedHandler>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order, stopping at the first `Halt` or error.
    pub async fn run(&self, ctx: &mut RequestContext) -> HandlerResult {
        run_steps(&self.steps, ctx).await
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerChain").field("steps", &self.steps.len()).finish()
    }
}

impl From<SharedHandler> for HandlerChain {
    fn from(handler: SharedHandler) -> Self {
        Self::new(vec![handler])
    }
}

impl From<Vec<SharedHandler>> for HandlerChain {
    fn from(steps: Vec<SharedHandler>) -> Self {
        Self::new(steps)
    }
}

pub(crate) async fn run_steps(steps: &[SharedHandler], ctx: &mut RequestContext) -> HandlerResult {
    for step in steps {
        if step.call(ctx).await? == Flow::Halt {
            return Ok(Flow::Halt);
        }
    }
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};

    fn recorder(tag: &'static str, flow: Flow) -> SharedHandler {
        handler_fn(move |ctx| {
            let seen = ctx.state.entry("seen").or_insert_with(|| serde_json::json!([]));
            if let Some(list) = seen.as_array_mut() {
                list.push(tag.into());
            }
            Ok(flow)
        })
    }

    #[tokio::test]
    async fn chain_runs_in_order() {
        let chain = HandlerChain::new(vec![recorder("a", Flow::Next), recorder("b", Flow::Next)]);
        let mut ctx = RequestContext::for_test(Method::GET, "/");
        assert_eq!(chain.run(&mut ctx).await.unwrap(), Flow::Next);
        assert_eq!(ctx.state["seen"], serde_json::json!(["a", "b"]));
    }

    #[tokio::test]
    async fn halt_skips_remaining_steps() {
        let chain = HandlerChain::new(vec![
            recorder("a", Flow::Halt),
            recorder("b", Flow::Next),
        ]);
        let mut ctx = RequestContext::for_test(Method::GET, "/");
        assert_eq!(chain.run(&mut ctx).await.unwrap(), Flow::Halt);
        assert_eq!(ctx.state["seen"], serde_json::json!(["a"]));
    }

    #[tokio::test]
    async fn error_stops_chain() {
        let failing = handler_fn(|_| Err("boom".into()));
        let chain = HandlerChain::new(vec![failing, recorder("after", Flow::Next)]);
        let mut ctx = RequestContext::for_test(Method::GET, "/");
        let err = chain.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(!ctx.state.contains_key("seen"));
        assert_eq!(ctx.status(), None::<StatusCode>);
    }
}
