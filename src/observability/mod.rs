//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pool, prober, dispatcher
//!     → logging.rs (tracing events, EnvFilter)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
