//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe every backend concurrently (Backend::probe)
//!     → Join all probes
//!     → Pool::record_health updates the unhealthy set
//! ```
//!
//! # Design Decisions
//! - Probes only report; the pool owns the unhealthy set
//! - A backend without probe configuration is always healthy
//! - Health is polled, so dispatch may briefly disagree with the latest probe

pub mod active;

use crate::error::ProbeError;

/// Outcome of a single probe.
#[derive(Debug)]
pub enum HealthResult {
    Healthy,
    Unhealthy(ProbeError),
}

impl HealthResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthResult::Healthy)
    }
}
