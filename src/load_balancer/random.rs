//! Uniform random load balancing strategy.

use std::sync::Arc;

use rand::Rng;

use crate::error::NoBackendsError;
use crate::load_balancer::{backend::Backend, LoadBalancer};

/// Picks every backend with equal probability. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl LoadBalancer for Random {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, NoBackendsError> {
        if backends.is_empty() {
            return Err(NoBackendsError);
        }
        let index = rand::thread_rng().gen_range(0..backends.len());
        Ok(backends[index].clone())
    }
}
