//! Weighted load balancing strategy.
//!
//! Expands the backend slice into a multiset where backend `i` appears
//! `weight_i` times and draws uniformly from it, so selection frequency is
//! proportional to weight. Weights are bounded by `MAX_WEIGHT`.

use std::sync::Arc;

use rand::Rng;

use crate::error::NoBackendsError;
use crate::load_balancer::{backend::Backend, LoadBalancer};

#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRoundRobin;

impl LoadBalancer for WeightedRoundRobin {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, NoBackendsError> {
        let expanded: Vec<usize> = backends
            .iter()
            .enumerate()
            .flat_map(|(i, b)| std::iter::repeat(i).take(b.weight() as usize))
            .collect();

        // Empty input and all-zero weights end up here alike.
        if expanded.is_empty() {
            return Err(NoBackendsError);
        }

        let slot = rand::thread_rng().gen_range(0..expanded.len());
        Ok(backends[expanded[slot]].clone())
    }
}
