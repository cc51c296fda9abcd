//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop(force) → StopMode broadcast → server handles / supervisor loop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful stop
//!     stdin EOF in a worker → graceful stop
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: forced close after the grace period
//! - A forced stop may follow a graceful one and cuts the drain short

pub mod shutdown;
pub mod signals;

pub use shutdown::{recv_force, recv_stop, Shutdown, StopMode};
pub use signals::{shutdown_signal, StopCause};
