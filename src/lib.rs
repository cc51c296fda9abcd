//! HTTP(S) front-end component.
//!
//! Owns a listening socket, a request pipeline assembled at startup, and an
//! optional master/worker process model.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────── HttpComponent ───────────────────────┐
//!                  │                                                              │
//!   master ────────┼─▶ cluster::ClusterSupervisor ──launch──▶ N worker processes  │
//!                  │        ▲   (counts notifyRequest, 1s snapshots)      │       │
//!                  │        └────────────── stdout IPC ◀──────────────────┘       │
//!                  │                                                              │
//!   worker/single ─┼─▶ worker::WorkerProcess (net + axum-server, TLS optional)    │
//!                  │        │                                                     │
//!                  │        ▼                                                     │
//!                  │   pipeline::RequestPipeline                                  │
//!                  │     before-filters → body::decode → routing::RouteTable      │
//!                  │     → handler chain → after-filters → http::Reply            │
//!                  └──────────────────────────────────────────────────────────────┘
//! ```

// Request handling
pub mod body;
pub mod http;
pub mod pipeline;
pub mod routing;

// Processes
pub mod cluster;
pub mod component;
pub mod net;
pub mod worker;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use component::{ComponentState, HttpComponent, HttpComponentBuilder};
pub use config::{load_config, HttpConfig};
pub use error::{Error, Result};
pub use lifecycle::{Shutdown, StopMode};
pub use worker::{WorkerProcess, WorkerState};
