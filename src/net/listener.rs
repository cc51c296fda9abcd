//! TCP listener binding.
//!
//! # Responsibilities
//! - Resolve the configured `host:port`
//! - Create the socket with the options cluster mode needs (SO_REUSEPORT)
//! - Hand a non-blocking std listener to the HTTP server
//!
//! # Design Decisions
//! - Binding is separate from serving so bind failures surface before the
//!   worker reports itself as listening
//! - Shared-port workers each own a socket; the kernel balances accepts

use std::net::{SocketAddr, TcpListener};

use socket2::{Domain, Protocol, Socket, Type};

const LISTEN_BACKLOG: i32 = 1024;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("cannot resolve bind address {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {address}: {source}")]
    Io {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Socket options applied before `bind`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindOptions {
    /// Let several processes bind the same port (Linux/BSD SO_REUSEPORT).
    pub reuse_port: bool,
}

/// Bind `address` and start listening.
pub async fn bind(address: &str, options: BindOptions) -> Result<TcpListener, BindError> {
    let addr = tokio::net::lookup_host(address)
        .await
        .map_err(|source| BindError::Resolve {
            address: address.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| BindError::Resolve {
            address: address.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        })?;

    let listener = bind_socket(addr, options).map_err(|source| BindError::Io { address: addr, source })?;

    tracing::debug!(
        address = %addr,
        reuse_port = options.reuse_port,
        "Listener bound"
    );

    Ok(listener)
}

fn bind_socket(addr: SocketAddr, options: BindOptions) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;

    #[cfg(unix)]
    if options.reuse_port {
        socket.set_reuse_port(true)?;
    }
    #[cfg(not(unix))]
    if options.reuse_port {
        tracing::warn!("SO_REUSEPORT unavailable on this platform, binding exclusively");
    }

    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
