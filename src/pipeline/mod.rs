//! Request-handling pipeline.
//!
//! # Data Flow
//! ```text
//! axum request
//!     → context.rs (RequestContext from request parts)
//!     → runner.rs (filters, decode, routing, handler chain)
//!     → handler.rs (Handler trait, Flow, HandlerChain)
//!     → Reply
//! ```

pub mod context;
pub mod handler;
pub mod runner;

pub use context::{RequestContext, X_REQUEST_ID};
pub use handler::{
    handler_fn, BoxFuture, Flow, FnHandler, Handler, HandlerChain, HandlerError, HandlerResult,
    SharedHandler,
};
pub use runner::{Filters, RequestPipeline};
