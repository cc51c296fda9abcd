//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT / SIGTERM
//! - In workers, also treat the master closing stdin as a stop request
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The caller decides what a second signal means

use std::future::pending;

use crate::cluster::ipc::parent_closed;
use crate::cluster::Role;

/// Why the process is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Interrupt,
    Terminate,
    ParentClosed,
}

/// Resolve on the first stop request for a process in `role`.
pub async fn shutdown_signal(role: Role) -> StopCause {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = pending::<()>();

    let parent = async {
        match role {
            Role::Worker { .. } => parent_closed().await,
            _ => pending::<()>().await,
        }
    };

    let cause = tokio::select! {
        _ = ctrl_c => StopCause::Interrupt,
        _ = terminate => StopCause::Terminate,
        _ = parent => StopCause::ParentClosed,
    };

    tracing::info!(cause = ?cause, role = %role, "Stop requested");
    cause
}
