//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum-server)
//!     → server.rs (Axum router, middleware, catch-all dispatch)
//!     → request.rs (request ID assignment and propagation)
//!     → pipeline (filters, body decode, routing, handlers)
//!     → response.rs (Reply → HTTP response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use response::Reply;
pub use server::{build_router, AppState};
