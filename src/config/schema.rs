//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the HTTP
//! front-end. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::body::ByteSize;

/// Root configuration for the HTTP component.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind settings.
    pub server: ServerConfig,

    /// HTTPS settings.
    pub tls: TlsConfig,

    /// Multi-process settings.
    pub cluster: ClusterConfig,

    /// Request body ingestion settings.
    pub body: BodyConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host or IP to bind.
    pub host: String,

    /// Port to bind. In `offset` cluster mode this is the base port.
    pub port: u16,

    /// Maximum concurrent connections per worker (backpressure).
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            max_connections: 10_000,
        }
    }
}

impl ServerConfig {
    /// `host:port` with IPv6 hosts bracketed.
    pub fn bind_address(&self, port: u16) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, port)
        } else {
            format!("{}:{}", self.host, port)
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Serve HTTPS instead of plain HTTP.
    pub enabled: bool,

    /// Path to certificate file (PEM).
    pub cert_path: Option<String>,

    /// Path to private key file (PEM).
    pub key_path: Option<String>,
}

/// How clustered workers share the listening address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    /// Every worker binds the same port with `SO_REUSEPORT`.
    #[default]
    Shared,
    /// Worker `i` binds `port + i`.
    Offset,
}

/// Cluster (master/worker) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Run a master process that launches workers.
    pub enabled: bool,

    /// Number of workers. Defaults to the available CPU parallelism.
    pub workers: Option<usize>,

    /// Port sharing strategy.
    pub port_mode: PortMode,

    /// Interval between aggregate request-count reports, in milliseconds.
    pub report_interval_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            workers: None,
            port_mode: PortMode::Shared,
            report_interval_ms: 1000,
        }
    }
}

impl ClusterConfig {
    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Body reader configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Maximum body size (`"1mb"`, `"512kb"`, or a byte count).
    pub limit: ByteSize,

    /// Text encoding used to read bodies.
    pub encoding: String,

    /// Only accept objects and arrays as top-level JSON.
    pub strict_json: bool,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            limit: ByteSize::mib(1),
            encoding: "utf8".to_string(),
            strict_json: true,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time allowed for in-flight requests to finish on graceful stop.
    pub grace_period_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            grace_period_ms: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
