//! Crate-level error type.

use crate::cluster::ClusterError;
use crate::config::ConfigError;
use crate::net::{BindError, TlsError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("cannot {operation} {component} in state {state}")]
    Lifecycle {
        component: &'static str,
        operation: &'static str,
        state: &'static str,
    },
}

impl Error {
    pub(crate) fn lifecycle(component: &'static str, operation: &'static str, state: &'static str) -> Self {
        Self::Lifecycle {
            component,
            operation,
            state,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
