//! One request-serving process.
//!
//! # Responsibilities
//! - Bind the listener (plain or TLS)
//! - Serve every request through the `RequestPipeline`
//! - Report completed requests to the master when clustered
//! - Drain in-flight requests on stop, bounded by the grace period
//!
//! # State Machine
//! ```text
//! Created ──listen──▶ Listening ──stop──▶ Draining ──▶ Stopped
//!    └───────────────────stop───────────────────────────▲
//! ```
//!
//! # Design Decisions
//! - Bind happens before the server task is spawned, so a bind failure is
//!   returned from `listen` instead of surfacing in a background task
//! - Graceful stop hands the grace period to axum-server, which closes
//!   whatever is still open when it expires

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use tokio::task::JoinHandle;

use crate::cluster::IpcNotifier;
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::http::server::{build_router, AppState};
use crate::lifecycle::StopMode;
use crate::net::{self, BindOptions, Credential};
use crate::pipeline::RequestPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Listening,
    Draining,
    Stopped,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct WorkerProcess {
    config: Arc<HttpConfig>,
    app: AppState,
    port: u16,
    bind_options: BindOptions,
    credential: Option<Credential>,
    handle: Handle,
    server: Option<JoinHandle<std::io::Result<()>>>,
    local_addr: Option<SocketAddr>,
    state: WorkerState,
}

impl fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("state", &self.state)
            .field("port", &self.port)
            .field("tls", &self.credential.is_some())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl WorkerProcess {
    pub fn new(config: Arc<HttpConfig>, pipeline: Arc<RequestPipeline>) -> Self {
        let port = config.server.port;
        Self {
            config,
            app: AppState {
                pipeline,
                notifier: None,
            },
            port,
            bind_options: BindOptions::default(),
            credential: None,
            handle: Handle::new(),
            server: None,
            local_addr: None,
            state: WorkerState::Created,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn reuse_port(mut self, reuse_port: bool) -> Self {
        self.bind_options.reuse_port = reuse_port;
        self
    }

    /// Serve HTTPS with this certificate and key.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Report each completed request through `notifier`.
    pub fn notifier(mut self, notifier: IpcNotifier) -> Self {
        self.app.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn scheme(&self) -> &'static str {
        if self.credential.is_some() {
            "https"
        } else {
            "http"
        }
    }

    fn grace_period(&self) -> Duration {
        Duration::from_millis(self.config.timeouts.grace_period_ms)
    }

    /// Bind and start serving. Returns once the listener is accepting.
    pub async fn listen(&mut self) -> Result<SocketAddr> {
        if self.state != WorkerState::Created {
            return Err(Error::lifecycle("worker", "listen", self.state.as_str()));
        }

        let address = self.config.server.bind_address(self.port);
        let listener = net::bind(&address, self.bind_options).await?;

        let router = build_router(self.app.clone(), &self.config);
        let make_service = router.into_make_service();
        let handle = self.handle.clone();

        let server = match &self.credential {
            Some(credential) => {
                let tls = credential.rustls_config().await?;
                let server = axum_server::from_tcp_rustls(listener, tls).handle(handle);
                tokio::spawn(async move { server.serve(make_service).await })
            }
            None => {
                let server = axum_server::from_tcp(listener).handle(handle);
                tokio::spawn(async move { server.serve(make_service).await })
            }
        };
        self.server = Some(server);

        let local_addr = match self.handle.listening().await {
            Some(addr) => addr,
            None => return Err(self.server_failure().await),
        };

        self.local_addr = Some(local_addr);
        self.state = WorkerState::Listening;

        tracing::info!(
            address = %local_addr,
            scheme = self.scheme(),
            reuse_port = self.bind_options.reuse_port,
            max_connections = self.config.server.max_connections,
            "Listening for connections"
        );

        Ok(local_addr)
    }

    async fn server_failure(&mut self) -> Error {
        let error = match self.server.take() {
            Some(task) => match task.await {
                Ok(Err(e)) => e,
                Ok(Ok(())) => std::io::Error::other("server exited before listening"),
                Err(e) => std::io::Error::other(e),
            },
            None => std::io::Error::other("server task missing"),
        };
        self.state = WorkerState::Stopped;
        Error::Serve(error)
    }

    /// Stop accepting and close the listener. Repeated calls are no-ops.
    pub async fn stop(&mut self, mode: StopMode) {
        match self.state {
            WorkerState::Stopped => return,
            WorkerState::Created => {
                self.state = WorkerState::Stopped;
                return;
            }
            WorkerState::Listening | WorkerState::Draining => {}
        }

        self.state = WorkerState::Draining;
        let grace = self.grace_period();
        tracing::info!(
            mode = ?mode,
            grace_ms = grace.as_millis() as u64,
            connections = self.handle.connection_count(),
            "Draining connections"
        );

        match mode {
            StopMode::Graceful => self.handle.graceful_shutdown(Some(grace)),
            StopMode::Force => self.handle.shutdown(),
        }

        // Awaited in place: a cancelled stop leaves the task for the next call.
        if let Some(server) = self.server.as_mut() {
            let result = server.await;
            self.server = None;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Server exited with error"),
                Err(e) => tracing::warn!(error = %e, "Server task failed"),
            }
        }

        self.state = WorkerState::Stopped;
        tracing::info!("Worker stopped");
    }
}
