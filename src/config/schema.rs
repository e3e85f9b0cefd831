//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatcher.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::backend::{BackendOptions, ProbeConfig};
use crate::load_balancer::PolicyKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Pool-wide settings (policy, probe interval).
    pub pool: PoolConfig,

    /// Backend server definitions, in pool order.
    pub backends: Vec<BackendConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Selection policy.
    pub policy: PolicyKind,

    /// Seconds between probe cycles.
    pub probe_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Random,
            probe_interval_secs: 5,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Optional label for logs and metrics; defaults to the address.
    #[serde(default)]
    pub name: Option<String>,

    /// Backend address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Weight for weighted selection (default: 1, clamped to 0..=100).
    #[serde(default = "default_weight")]
    pub weight: i64,

    /// Health probe; omitted means the backend is always considered healthy.
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
}

fn default_weight() -> i64 {
    1
}

impl BackendConfig {
    /// Build backend options, applying the shared timeouts.
    pub fn options(&self, timeouts: &TimeoutConfig) -> BackendOptions {
        let mut options = BackendOptions::new()
            .with_weight(self.weight)
            .with_request_timeout(Duration::from_secs(timeouts.request_secs))
            .with_connect_timeout(Duration::from_secs(timeouts.connect_secs));

        if let Some(name) = &self.name {
            options = options.with_name(name.clone());
        }
        if let Some(check) = &self.health_check {
            options = options.with_probe(ProbeConfig::new(
                check.port,
                check.path.clone(),
                Duration::from_secs(check.timeout_secs),
            ));
        }
        options
    }
}

/// Per-backend health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Port the health endpoint listens on.
    pub port: u16,

    /// Path to probe.
    #[serde(default = "default_health_path")]
    pub path: String,

    /// Probe timeout in seconds.
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_timeout() -> u64 {
    5
}

/// Timeout configuration for forwarding.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Seconds to wait for the upstream response head.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
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
