//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that HTTPS settings come with credential paths
//! - Validate value ranges (limits > 0, known encodings, worker counts)
//! - Check the metrics listener address when metrics are enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HttpConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::body::Encoding;
use crate::config::schema::HttpConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &HttpConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::new("server.host", "must not be empty"));
    }
    if config.server.max_connections == 0 {
        errors.push(ValidationError::new("server.max_connections", "must be greater than 0"));
    }

    if config.tls.enabled {
        if config.tls.cert_path.is_none() {
            errors.push(ValidationError::new("tls.cert_path", "required when tls is enabled"));
        }
        if config.tls.key_path.is_none() {
            errors.push(ValidationError::new("tls.key_path", "required when tls is enabled"));
        }
    }

    if config.cluster.enabled {
        if config.cluster.workers == Some(0) {
            errors.push(ValidationError::new("cluster.workers", "must be greater than 0"));
        }
        if config.cluster.report_interval_ms == 0 {
            errors.push(ValidationError::new("cluster.report_interval_ms", "must be greater than 0"));
        }
        let last_port = u32::from(config.server.port)
            + (config.cluster.worker_count() as u32).saturating_sub(1);
        if config.cluster.port_mode == crate::config::PortMode::Offset && last_port > u32::from(u16::MAX) {
            errors.push(ValidationError::new("server.port", "port offset range exceeds 65535"));
        }
    }

    if config.body.limit.as_u64() == 0 {
        errors.push(ValidationError::new("body.limit", "must be greater than 0"));
    }
    if Encoding::parse(&config.body.encoding).is_none() {
        errors.push(ValidationError::new(
            "body.encoding",
            format!("unsupported encoding {:?}", config.body.encoding),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
