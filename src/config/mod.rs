//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → Pool::from_config / HttpServer::new
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; backends added later go through the pool API
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig, PoolConfig,
    ProxyConfig, TimeoutConfig,
};
