//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → table.rs (route lookup)
//!     → matcher.rs (evaluate prefix and method conditions)
//!     → Return: matched binding, MethodNotAllowed, or NotFound
//!
//! Route Registration (at startup):
//!     registrar(&mut RouteTableBuilder)
//!     → build()
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod table;

pub use table::{Resolution, RouteBinding, RouteRegistrar, RouteTable, RouteTableBuilder};
