//! Multi-process clustering.
//!
//! # Data Flow
//! ```text
//! Master (role.rs says Master):
//!     supervisor.rs launches N copies of the binary with a worker index
//!     → monitors read ipc.rs messages from each worker's stdout
//!     → state.rs counts requests per pid
//!
//! Worker (role.rs says Worker):
//!     serves requests → ipc.rs notifier → stdout → master
//!     stdin closed by master → drain and exit
//! ```
//!
//! # Design Decisions
//! - The master never binds a listener or runs the request pipeline
//! - Request counts are best-effort; IPC may drop messages under pressure
//! - Crashed workers are logged and not respawned

pub mod ipc;
pub mod role;
pub mod state;
pub mod supervisor;

pub use ipc::{IpcMessage, IpcNotifier, WORKER_INDEX_ENV};
pub use role::Role;
pub use state::{ClusterSnapshot, ClusterState, WorkerRecord};
pub use supervisor::{ClusterError, ClusterReport, ClusterSupervisor, SupervisorEvent, WorkerCommand};
