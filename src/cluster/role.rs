//! Execution role of the current process.

use std::fmt;

use crate::cluster::ipc::WORKER_INDEX_ENV;

/// What this process does in the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Clustering off: this process serves requests itself.
    Single,
    /// Clustering on: launch workers, never serve.
    Master,
    /// Launched by a master; serves requests and reports to it.
    Worker { index: usize },
}

impl Role {
    /// Resolve from config and the process environment.
    pub fn detect(cluster_enabled: bool) -> Self {
        Self::resolve(cluster_enabled, std::env::var(WORKER_INDEX_ENV).ok().as_deref())
    }

    /// A worker index in the environment always wins; the master sets it
    /// whatever the child's own config says.
    pub fn resolve(cluster_enabled: bool, worker_index: Option<&str>) -> Self {
        match worker_index {
            Some(raw) => {
                let index = raw.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!(value = %raw, "Unparseable {WORKER_INDEX_ENV}, assuming 0");
                    0
                });
                Self::Worker { index }
            }
            None if cluster_enabled => Self::Master,
            None => Self::Single,
        }
    }

    /// Whether this process binds a listener and runs the pipeline.
    pub fn serves_requests(&self) -> bool {
        !matches!(self, Self::Master)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Master => "master",
            Self::Worker { .. } => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker { index } => write!(f, "worker[{index}]"),
            other => f.write_str(other.as_str()),
        }
    }
}
