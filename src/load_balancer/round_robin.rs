//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::NoBackendsError;
use crate::load_balancer::{backend::Backend, LoadBalancer};

/// Round-robin selector.
///
/// Each call advances the cursor and returns the backend at the new
/// position, so a fresh selector starts at index 1.
///
/// The cursor is read and advanced in one atomic read-modify-write, so
/// concurrent callers are serialized on it and never see an out-of-range
/// index. When the backend count changes the cursor is reduced modulo the new
/// count; the resulting drift is accepted.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, NoBackendsError> {
        let len = backends.len();
        if len == 0 {
            return Err(NoBackendsError);
        }

        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c % len + 1) % len))
            .unwrap_or_else(|c| c);
        let index = (previous % len + 1) % len;

        Ok(backends[index].clone())
    }
}
