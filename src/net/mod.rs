//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Worker start
//!     → listener.rs (resolve, socket options, bind, listen)
//!     → tls.rs (optional certificate + key → rustls config)
//!     → Hand off to the HTTP server
//! ```
//!
//! # Design Decisions
//! - TLS is optional and handled transparently by axum-server
//! - Credentials are validated when the component is built, not on first handshake

pub mod listener;
pub mod tls;

pub use listener::{bind, BindError, BindOptions};
pub use tls::{Credential, TlsError};
