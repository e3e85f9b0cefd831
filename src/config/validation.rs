//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Backend targets must be `ip:port`
//! - Value ranges (intervals and timeouts > 0, probe ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Weights are clamped, not rejected

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::error::ConfigurationError;
use crate::load_balancer::backend::parse_target;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("backends[{index}]: {source}")]
    Target {
        index: usize,
        #[source]
        source: ConfigurationError,
    },

    #[error("backends[{index}].health_check.port must be non-zero")]
    ProbePort { index: usize },

    #[error("backends[{index}].health_check.path {path:?} must start with '/'")]
    ProbePath { index: usize, path: String },

    #[error("backends[{index}].health_check.timeout_secs must be greater than zero")]
    ProbeTimeout { index: usize },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.pool.probe_interval_secs == 0 {
        errors.push(ValidationError::Zero("pool.probe_interval_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }

    for (index, backend) in config.backends.iter().enumerate() {
        if let Err(source) = parse_target(&backend.address) {
            errors.push(ValidationError::Target { index, source });
        }

        if let Some(check) = &backend.health_check {
            if check.port == 0 {
                errors.push(ValidationError::ProbePort { index });
            }
            if !check.path.starts_with('/') {
                errors.push(ValidationError::ProbePath {
                    index,
                    path: check.path.clone(),
                });
            }
            if check.timeout_secs == 0 {
                errors.push(ValidationError::ProbeTimeout { index });
            }
        }

        if !(0..=100).contains(&backend.weight) {
            tracing::warn!(
                index,
                weight = backend.weight,
                "Backend weight outside 0..=100 will be clamped"
            );
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
