//! Top-level HTTP component.
//!
//! # Responsibilities
//! - Validate configuration and load TLS credentials at construction
//! - Decide the execution role (single process, cluster master, worker)
//! - Assemble the request pipeline from filters and registered routes
//! - Drive the `Constructed → Started → AfterStarted → Stopped` lifecycle
//!
//! # Data Flow
//! ```text
//! HttpComponent::builder(config)
//!     .before_filter(..) .routes(..) .after_filter(..)
//!     .build()            → Constructed
//! start()                 → Started
//!     Master:         ClusterSupervisor launches workers
//!     Single/Worker:  RouteTable + RequestPipeline → WorkerProcess::listen
//! after_start()           → AfterStarted
//! stop(force)             → Stopped (repeat calls are no-ops)
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cluster::{ClusterReport, ClusterSnapshot, ClusterSupervisor, IpcNotifier, Role, WorkerCommand};
use crate::config::{validate_config, ConfigError, HttpConfig, PortMode, ValidationError};
use crate::error::{Error, Result};
use crate::lifecycle::{Shutdown, StopMode};
use crate::net::Credential;
use crate::pipeline::{Filters, RequestPipeline, SharedHandler};
use crate::routing::{RouteRegistrar, RouteTable, RouteTableBuilder};
use crate::worker::WorkerProcess;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Constructed,
    Started,
    AfterStarted,
    Stopped,
}

impl ComponentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Started => "started",
            Self::AfterStarted => "after-started",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collects everything the component needs before construction.
pub struct HttpComponentBuilder {
    config: HttpConfig,
    filters: Filters,
    registrar: Option<RouteRegistrar>,
    credential: Option<Credential>,
    role: Option<Role>,
    worker_command: Option<WorkerCommand>,
}

impl HttpComponentBuilder {
    /// Append a filter run before body decoding.
    pub fn before_filter(mut self, filter: SharedHandler) -> Self {
        self.filters.before.push(filter);
        self
    }

    /// Append a filter run after the route handlers.
    pub fn after_filter(mut self, filter: SharedHandler) -> Self {
        self.filters.after.push(filter);
        self
    }

    /// Registration function called once at `start` to fill the route table.
    pub fn routes<F>(mut self, registrar: F) -> Self
    where
        F: Fn(&mut RouteTableBuilder) + Send + Sync + 'static,
    {
        self.registrar = Some(Arc::new(registrar));
        self
    }

    /// Serve HTTPS with in-memory credential material.
    ///
    /// Takes precedence over `tls.cert_path`/`tls.key_path`.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Override role detection.
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Command the master uses to launch workers. Defaults to re-executing
    /// the current binary.
    pub fn worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    pub async fn build(self) -> Result<HttpComponent, ConfigError> {
        let supplied_credential = self.credential.is_some();
        if let Err(errors) = validate_config(&self.config) {
            let errors: Vec<ValidationError> = errors
                .into_iter()
                .filter(|e| !(supplied_credential && e.field.starts_with("tls.")))
                .collect();
            if !errors.is_empty() {
                return Err(ConfigError::Validation(errors));
            }
        }

        let role = self.role.unwrap_or_else(|| Role::detect(self.config.cluster.enabled));

        let credential = match (self.credential, self.config.tls.enabled) {
            (Some(credential), _) => Some(credential),
            (None, true) if role.serves_requests() => Some(load_credential(&self.config).await?),
            (None, _) => None,
        };

        tracing::info!(
            role = %role,
            tls = credential.is_some() || self.config.tls.enabled,
            cluster = self.config.cluster.enabled,
            "HTTP component constructed"
        );

        Ok(HttpComponent {
            config: Arc::new(self.config),
            filters: self.filters,
            registrar: self.registrar,
            credential,
            role,
            worker_command: self.worker_command,
            state: ComponentState::Constructed,
            runtime: None,
        })
    }
}

async fn load_credential(config: &HttpConfig) -> Result<Credential, ConfigError> {
    let (Some(cert), Some(key)) = (&config.tls.cert_path, &config.tls.key_path) else {
        return Err(ConfigError::Validation(vec![ValidationError::new(
            "tls",
            "cert_path and key_path are required when tls is enabled",
        )]));
    };
    Ok(Credential::load(cert.as_ref(), key.as_ref()).await?)
}

enum Runtime {
    Worker(WorkerProcess),
    Cluster {
        shutdown: Shutdown,
        task: JoinHandle<ClusterReport>,
        snapshots: watch::Receiver<ClusterSnapshot>,
    },
}

pub struct HttpComponent {
    config: Arc<HttpConfig>,
    filters: Filters,
    registrar: Option<RouteRegistrar>,
    credential: Option<Credential>,
    role: Role,
    worker_command: Option<WorkerCommand>,
    state: ComponentState,
    runtime: Option<Runtime>,
}

impl fmt::Debug for HttpComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpComponent")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("filters", &self.filters)
            .field("tls", &self.credential.is_some())
            .finish()
    }
}

impl HttpComponent {
    pub fn builder(config: HttpConfig) -> HttpComponentBuilder {
        HttpComponentBuilder {
            config,
            filters: Filters::default(),
            registrar: None,
            credential: None,
            role: None,
            worker_command: None,
        }
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Bound address when this process serves requests.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.runtime {
            Some(Runtime::Worker(worker)) => worker.local_addr(),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.credential.is_some() {
            "https"
        } else {
            "http"
        }
    }

    /// Aggregate request counts, published by the master every report interval.
    pub fn cluster_snapshots(&self) -> Option<watch::Receiver<ClusterSnapshot>> {
        match &self.runtime {
            Some(Runtime::Cluster { snapshots, .. }) => Some(snapshots.clone()),
            _ => None,
        }
    }

    fn expect_state(&self, expected: ComponentState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::lifecycle("component", operation, self.state.as_str()))
        }
    }

    /// Build the pipeline and start serving (or launch workers when master).
    ///
    /// Returns once the listener is bound or every worker is launched.
    pub async fn start(&mut self) -> Result<()> {
        self.expect_state(ComponentState::Constructed, "start")?;
        let registrar = self.registrar.clone().ok_or(ConfigError::MissingRoutes)?;

        let runtime = match self.role {
            Role::Master => self.start_cluster()?,
            Role::Single | Role::Worker { .. } => self.start_worker(&registrar).await?,
        };

        self.runtime = Some(runtime);
        self.state = ComponentState::Started;
        Ok(())
    }

    fn start_cluster(&self) -> Result<Runtime> {
        let command = match &self.worker_command {
            Some(command) => command.clone(),
            None => WorkerCommand::current_exe()?,
        };
        let workers = self.config.cluster.worker_count();

        let mut supervisor = ClusterSupervisor::from_config(&self.config);
        supervisor.spawn_workers(workers, &command)?;

        tracing::info!(
            workers,
            port = self.config.server.port,
            port_mode = ?self.config.cluster.port_mode,
            "Cluster master started"
        );

        let shutdown = Shutdown::new();
        let snapshots = supervisor.subscribe_snapshots();
        let task = tokio::spawn(supervisor.run(shutdown.subscribe()));

        Ok(Runtime::Cluster {
            shutdown,
            task,
            snapshots,
        })
    }

    async fn start_worker(&self, registrar: &RouteRegistrar) -> Result<Runtime> {
        let routes = RouteTable::from_registrar(registrar);
        tracing::info!(routes = routes.len(), "Routes registered");

        let pipeline = Arc::new(RequestPipeline::new(
            self.filters.clone(),
            routes,
            self.config.body.clone(),
        ));

        let base_port = self.config.server.port;
        let (port, reuse_port) = match self.role {
            Role::Worker { index } => match self.config.cluster.port_mode {
                PortMode::Shared => (base_port, true),
                PortMode::Offset => (offset_port(base_port, index)?, false),
            },
            _ => (base_port, false),
        };

        let mut worker = WorkerProcess::new(self.config.clone(), pipeline)
            .port(port)
            .reuse_port(reuse_port);
        if let Some(credential) = &self.credential {
            worker = worker.credential(credential.clone());
        }
        if let Role::Worker { .. } = self.role {
            worker = worker.notifier(IpcNotifier::connect_parent());
        }

        worker.listen().await?;
        Ok(Runtime::Worker(worker))
    }

    /// Post-listen hook for deferred initialization.
    pub async fn after_start(&mut self) -> Result<()> {
        self.expect_state(ComponentState::Started, "run after_start on")?;
        self.state = ComponentState::AfterStarted;

        match self.local_addr() {
            Some(addr) => tracing::info!(
                address = %addr,
                scheme = self.scheme(),
                role = %self.role,
                "HTTP component ready"
            ),
            None => tracing::info!(role = %self.role, "HTTP component ready"),
        }
        Ok(())
    }

    /// Close the listener(s). Without `force`, in-flight requests drain first.
    ///
    /// Calling again after the component stopped succeeds without effect.
    pub async fn stop(&mut self, force: bool) -> Result<()> {
        match self.state {
            ComponentState::Stopped => {
                tracing::debug!("HTTP component already stopped");
                return Ok(());
            }
            ComponentState::Constructed => {
                return Err(Error::lifecycle("component", "stop", self.state.as_str()));
            }
            ComponentState::Started | ComponentState::AfterStarted => {}
        }

        // The runtime stays in place until the stop completes, so a stop
        // cancelled mid-drain can be followed by a forced one.
        let mode = StopMode::from_force(force);
        match self.runtime.as_mut() {
            Some(Runtime::Worker(worker)) => worker.stop(mode).await,
            Some(Runtime::Cluster { shutdown, task, .. }) => {
                shutdown.trigger(mode);
                match task.await {
                    Ok(report) => tracing::info!(
                        workers = report.workers.len(),
                        total_requests = report.total_requests(),
                        counts = ?report.counts(),
                        "Cluster stopped"
                    ),
                    Err(e) => tracing::error!(error = %e, "Cluster supervisor task failed"),
                }
            }
            None => {}
        }
        self.runtime = None;

        self.state = ComponentState::Stopped;
        tracing::info!(force, "HTTP component stopped");
        Ok(())
    }
}

fn offset_port(base: u16, index: usize) -> Result<u16, ConfigError> {
    u16::try_from(index)
        .ok()
        .and_then(|index| base.checked_add(index))
        .ok_or_else(|| {
            ConfigError::Validation(vec![ValidationError::new(
                "server.port",
                format!("port {base} + worker index {index} exceeds 65535"),
            )])
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{handler_fn, BoxFuture, Flow, Handler, HandlerResult, RequestContext};
    use axum::http::StatusCode;
    use std::time::{Duration, Instant};

    struct Stall(Duration);

    impl Handler for Stall {
        fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                tokio::time::sleep(self.0).await;
                ctx.respond(StatusCode::OK, "finished");
                Ok(Flow::Next)
            })
        }
    }

    fn config() -> HttpConfig {
        let mut config = HttpConfig::default();
        config.server.port = 0;
        config.timeouts.grace_period_ms = 500;
        config
    }

    fn ping_routes(routes: &mut RouteTableBuilder) {
        routes.get(
            "/ping",
            handler_fn(|ctx| {
                ctx.respond(StatusCode::OK, "pong");
                Ok(Flow::Next)
            }),
        );
    }

    #[tokio::test]
    async fn full_lifecycle_with_repeated_stop() {
        let mut component = HttpComponent::builder(config())
            .role(Role::Single)
            .routes(ping_routes)
            .build()
            .await
            .unwrap();
        assert_eq!(component.state(), ComponentState::Constructed);

        component.start().await.unwrap();
        assert_eq!(component.state(), ComponentState::Started);
        let addr = component.local_addr().unwrap();

        component.after_start().await.unwrap();
        assert_eq!(component.state(), ComponentState::AfterStarted);

        let body = reqwest::get(format!("http://{addr}/ping")).await.unwrap().text().await.unwrap();
        assert_eq!(body, "pong");

        for _ in 0..3 {
            component.stop(false).await.unwrap();
            assert_eq!(component.state(), ComponentState::Stopped);
        }
        assert!(component.local_addr().is_none());
    }

    #[tokio::test]
    async fn forced_stop_after_cancelled_graceful_stop_cuts_in_flight_requests() {
        let mut config = config();
        config.timeouts.grace_period_ms = 10_000;
        let mut component = HttpComponent::builder(config)
            .role(Role::Single)
            .routes(|routes| {
                routes.get("/stall", Arc::new(Stall(Duration::from_secs(3))));
            })
            .build()
            .await
            .unwrap();
        component.start().await.unwrap();
        component.after_start().await.unwrap();
        let addr = component.local_addr().unwrap();

        let in_flight = tokio::spawn(async move { reqwest::get(format!("http://{addr}/stall")).await });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let cancelled = tokio::time::timeout(Duration::from_millis(100), component.stop(false)).await;
        assert!(cancelled.is_err());
        assert_eq!(component.state(), ComponentState::AfterStarted);

        let started = Instant::now();
        component.stop(true).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(component.state(), ComponentState::Stopped);

        let outcome = in_flight.await.unwrap();
        assert!(outcome.is_err(), "in-flight request outlived the forced stop");
    }

    #[tokio::test]
    async fn start_without_routes_is_config_error() {
        let mut component = HttpComponent::builder(config()).role(Role::Single).build().await.unwrap();
        let err = component.start().await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::MissingRoutes)));
        assert_eq!(component.state(), ComponentState::Constructed);
    }

    #[tokio::test]
    async fn transitions_cannot_be_skipped() {
        let mut component = HttpComponent::builder(config())
            .role(Role::Single)
            .routes(ping_routes)
            .build()
            .await
            .unwrap();

        assert!(matches!(component.after_start().await, Err(Error::Lifecycle { .. })));
        assert!(matches!(component.stop(false).await, Err(Error::Lifecycle { .. })));

        component.start().await.unwrap();
        assert!(matches!(component.start().await, Err(Error::Lifecycle { .. })));
        component.stop(true).await.unwrap();
        assert!(matches!(component.after_start().await, Err(Error::Lifecycle { .. })));
    }

    #[tokio::test]
    async fn tls_without_paths_fails_construction() {
        let mut config = config();
        config.tls.enabled = true;
        let err = HttpComponent::builder(config).role(Role::Single).build().await.unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[tokio::test]
    async fn unreadable_credentials_fail_construction() {
        let mut config = config();
        config.tls.enabled = true;
        config.tls.cert_path = Some("/nonexistent/cert.pem".into());
        config.tls.key_path = Some("/nonexistent/key.pem".into());
        let err = HttpComponent::builder(config).role(Role::Single).build().await.unwrap_err();
        assert!(matches!(err, ConfigError::Credential(_)));
    }

    #[tokio::test]
    async fn supplied_credential_enables_https() {
        let credential = Credential::from_pem(
            include_bytes!("../tests/fixtures/cert.pem").to_vec(),
            include_bytes!("../tests/fixtures/key.pem").to_vec(),
        )
        .unwrap();
        let mut component = HttpComponent::builder(config())
            .role(Role::Single)
            .credential(credential)
            .routes(ping_routes)
            .build()
            .await
            .unwrap();

        component.start().await.unwrap();
        assert_eq!(component.scheme(), "https");
        assert!(component.local_addr().is_some());
        component.stop(true).await.unwrap();
    }

    #[test]
    fn offset_ports() {
        assert_eq!(offset_port(3000, 2).unwrap(), 3002);
        assert!(offset_port(65535, 1).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn master_supervises_without_listening() {
        let mut config = config();
        config.cluster.enabled = true;
        config.cluster.workers = Some(2);
        config.cluster.report_interval_ms = 20;

        let mut component = HttpComponent::builder(config)
            .role(Role::Master)
            .worker_command(WorkerCommand::new("sh").arg("-c").arg("exec cat >/dev/null"))
            .routes(ping_routes)
            .build()
            .await
            .unwrap();

        component.start().await.unwrap();
        assert!(component.local_addr().is_none());

        let mut snapshots = component.cluster_snapshots().unwrap();
        let snapshot = tokio::time::timeout(std::time::Duration::from_secs(5), snapshots.wait_for(|s| s.alive == 2))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(snapshot.total(), 0);

        component.after_start().await.unwrap();
        component.stop(false).await.unwrap();
        component.stop(false).await.unwrap();
        assert_eq!(component.state(), ComponentState::Stopped);
    }
}
