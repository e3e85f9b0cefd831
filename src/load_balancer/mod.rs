//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → pool.rs (snapshot of backends + unhealthy set)
//!     → SelectionPolicy:
//!         - random.rs (uniform draw)
//!         - round_robin.rs (rotate through backends)
//!         - weighted.rs (draw from weight-expanded multiset)
//!     → backend.rs (forward with in-flight guard)
//! ```
//!
//! # Design Decisions
//! - Policies are pure selectors over a slice; health filtering is the pool's job
//! - The only policy state is the round-robin cursor, advanced atomically
//! - Every policy fails with `NoBackendsError` instead of panicking on empty input

pub mod backend;
pub mod pool;
pub mod random;
pub mod round_robin;
pub mod weighted;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::NoBackendsError;
use self::backend::Backend;
use self::random::Random;
use self::round_robin::RoundRobin;
use self::weighted::WeightedRoundRobin;

/// Backend selection capability.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick one backend out of `backends`.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, NoBackendsError>;
}

/// Policy name as it appears in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Random,
    RoundRobin,
    WeightedRoundRobin,
}

/// The configured selection policy.
#[derive(Debug)]
pub enum SelectionPolicy {
    Random(Random),
    RoundRobin(RoundRobin),
    WeightedRoundRobin(WeightedRoundRobin),
}

impl SelectionPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            SelectionPolicy::Random(_) => PolicyKind::Random,
            SelectionPolicy::RoundRobin(_) => PolicyKind::RoundRobin,
            SelectionPolicy::WeightedRoundRobin(_) => PolicyKind::WeightedRoundRobin,
        }
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::Random(Random)
    }
}

impl From<PolicyKind> for SelectionPolicy {
    fn from(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Random => SelectionPolicy::Random(Random),
            PolicyKind::RoundRobin => SelectionPolicy::RoundRobin(RoundRobin::new()),
            PolicyKind::WeightedRoundRobin => SelectionPolicy::WeightedRoundRobin(WeightedRoundRobin),
        }
    }
}

impl LoadBalancer for SelectionPolicy {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, NoBackendsError> {
        match self {
            SelectionPolicy::Random(lb) => lb.next_server(backends),
            SelectionPolicy::RoundRobin(lb) => lb.next_server(backends),
            SelectionPolicy::WeightedRoundRobin(lb) => lb.next_server(backends),
        }
    }
}
