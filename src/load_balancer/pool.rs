//! Backend pool management.
//!
//! # Responsibilities
//! - Own the ordered backend set and the unhealthy set
//! - Select a live backend through the configured policy
//! - Run the probe loop for the pool's lifetime
//! - Drain in-flight work on stop
//!
//! # Concurrency
//! The backend list is an `ArcSwap` snapshot: readers never block and
//! structural changes publish a new `Vec`. The unhealthy set sits behind a
//! single mutex; every read and write of it, and every structural change that
//! could orphan an entry, happens while holding that mutex.
//!
//! # Lifecycle
//! ```text
//! Created ──start()──▶ Running ──stop()──▶ Stopping ──drained──▶ Stopped
//!    └───────────────────stop()──────────────▲
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::error::{ConfigurationError, LifecycleError, NoBackendsError, PoolError};
use crate::health::{active::{self, HealthMonitor}, HealthResult};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{
    backend::{Backend, BackendOptions, InFlight},
    LoadBalancer, SelectionPolicy,
};
use crate::observability::metrics;

/// Default interval between probe cycles.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Pool lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl From<u8> for PoolState {
    fn from(val: u8) -> Self {
        match val {
            0 => PoolState::Created,
            1 => PoolState::Running,
            2 => PoolState::Stopping,
            _ => PoolState::Stopped,
        }
    }
}

/// A flat pool of backends with health tracking.
#[derive(Debug)]
pub struct Pool {
    backends: ArcSwap<Vec<Arc<Backend>>>,
    unhealthy: Mutex<HashSet<Uuid>>,
    policy: SelectionPolicy,
    state: AtomicU8,
    probe_interval: Duration,
    /// Stops the probe loop.
    shutdown: Shutdown,
}

impl Pool {
    /// Create an empty pool.
    pub fn new(policy: SelectionPolicy, probe_interval: Duration) -> Self {
        Self {
            backends: ArcSwap::from_pointee(Vec::new()),
            unhealthy: Mutex::new(HashSet::new()),
            policy,
            state: AtomicU8::new(PoolState::Created as u8),
            probe_interval,
            shutdown: Shutdown::new(),
        }
    }

    /// Build a pool and all of its configured backends.
    ///
    /// Fails on the first backend whose target does not parse.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigurationError> {
        let pool = Self::new(
            SelectionPolicy::from(config.pool.policy),
            Duration::from_secs(config.pool.probe_interval_secs),
        );

        for backend_config in &config.backends {
            let options = backend_config.options(&config.timeouts);
            let backend = Backend::new(&backend_config.address, options)?;
            pool.push(Arc::new(backend));
        }

        Ok(pool)
    }

    // --- Membership ---

    /// Parse `target` and append a new backend.
    pub fn add_backend(&self, target: &str, options: BackendOptions) -> Result<Arc<Backend>, PoolError> {
        let backend = Backend::new(target, options)?;
        self.add(backend)
    }

    /// Append an already constructed backend.
    pub fn add(&self, backend: Backend) -> Result<Arc<Backend>, PoolError> {
        if self.is_stopped() {
            return Err(LifecycleError::AlreadyStopped.into());
        }
        let backend = Arc::new(backend);
        self.push(backend.clone());
        Ok(backend)
    }

    fn push(&self, backend: Arc<Backend>) {
        tracing::info!(
            backend = %backend.name(),
            id = %backend.id(),
            addr = %backend.addr(),
            weight = backend.weight(),
            "Adding backend to pool"
        );
        metrics::record_backend_health(backend.name(), true);
        self.backends.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(backend.clone());
            next
        });
    }

    /// Remove a backend and wait for its in-flight requests to finish.
    pub async fn remove_backend(&self, id: Uuid) -> Result<(), PoolError> {
        let removed = {
            let mut unhealthy = self.lock_unhealthy();
            let current = self.backends.load_full();
            let Some(removed) = current.iter().find(|b| b.id() == id).cloned() else {
                return Err(PoolError::UnknownBackend(id));
            };
            self.backends.rcu(|current| {
                current
                    .iter()
                    .filter(|b| b.id() != id)
                    .cloned()
                    .collect::<Vec<_>>()
            });
            unhealthy.remove(&id);
            removed
        };

        tracing::info!(backend = %removed.name(), id = %id, "Removing backend, waiting for drain");
        removed.drained().await;
        tracing::info!(backend = %removed.name(), id = %id, "Backend removed");
        Ok(())
    }

    /// Snapshot of the current backends, in insertion order.
    pub fn backends(&self) -> Arc<Vec<Arc<Backend>>> {
        self.backends.load_full()
    }

    pub fn len(&self) -> usize {
        self.backends.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    // --- Health ---

    fn lock_unhealthy(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.unhealthy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_healthy(&self, id: Uuid) -> bool {
        !self.lock_unhealthy().contains(&id)
    }

    pub fn unhealthy_count(&self) -> usize {
        self.lock_unhealthy().len()
    }

    /// Apply a probe result to the unhealthy set.
    ///
    /// Results for backends that have left the pool are dropped.
    pub fn record_health(&self, backend: &Backend, result: &HealthResult) {
        let id = backend.id();
        let mut unhealthy = self.lock_unhealthy();

        if !self.backends.load().iter().any(|b| b.id() == id) {
            tracing::debug!(backend = %backend.name(), "Ignoring probe result for removed backend");
            return;
        }

        match result {
            HealthResult::Healthy => {
                if unhealthy.remove(&id) {
                    tracing::info!(backend = %backend.name(), id = %id, "Backend is healthy again");
                } else {
                    tracing::debug!(backend = %backend.name(), "Backend is healthy");
                }
            }
            HealthResult::Unhealthy(reason) => {
                if unhealthy.insert(id) {
                    tracing::warn!(backend = %backend.name(), id = %id, reason = %reason, "Backend is unhealthy");
                } else {
                    tracing::debug!(backend = %backend.name(), reason = %reason, "Backend still unhealthy");
                }
            }
        }
        metrics::record_backend_health(backend.name(), result.is_healthy());
    }

    /// Run a single probe cycle immediately.
    pub async fn probe_cycle(&self) {
        active::check_all(self).await;
    }

    // --- Selection ---

    /// Select a backend that is not marked unhealthy and claim an in-flight
    /// slot on it.
    ///
    /// The slot is taken before the stopped flag is checked a second time:
    /// either `stop` sees the slot and waits for it, or this call sees the
    /// flag and releases the slot.
    pub fn pick_healthy(&self) -> Result<InFlight, PoolError> {
        if self.is_stopped() {
            return Err(LifecycleError::AlreadyStopped.into());
        }

        let in_flight = self.select_live()?.track();
        if self.is_stopped() {
            return Err(LifecycleError::AlreadyStopped.into());
        }
        Ok(in_flight)
    }

    /// The policy is consulted over the full backend list at most once per
    /// backend. If every draw lands on an unhealthy backend, the policy is
    /// asked once more over the live subset, so the call is bounded and fails
    /// with `NoBackends` only when nothing live is selectable.
    fn select_live(&self) -> Result<Arc<Backend>, PoolError> {
        let backends = self.backends.load();
        let unhealthy = self.lock_unhealthy();

        for _ in 0..backends.len() {
            let candidate = self.policy.next_server(&backends)?;
            if !unhealthy.contains(&candidate.id()) {
                return Ok(candidate);
            }
        }

        let live: Vec<Arc<Backend>> = backends
            .iter()
            .filter(|b| !unhealthy.contains(&b.id()))
            .cloned()
            .collect();
        if live.is_empty() {
            return Err(NoBackendsError.into());
        }
        Ok(self.policy.next_server(&live)?)
    }

    // --- Lifecycle ---

    pub fn state(&self) -> PoolState {
        PoolState::from(self.state.load(Ordering::SeqCst))
    }

    /// True once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        matches!(self.state(), PoolState::Stopping | PoolState::Stopped)
    }

    /// Run the probe loop until [`stop`](Self::stop) is called.
    pub async fn start(self: &Arc<Self>) -> Result<(), PoolError> {
        let transition = self.state.compare_exchange(
            PoolState::Created as u8,
            PoolState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if let Err(current) = transition {
            return Err(match PoolState::from(current) {
                PoolState::Running => LifecycleError::AlreadyRunning,
                _ => LifecycleError::AlreadyStopped,
            }
            .into());
        }

        HealthMonitor::new(self.clone(), self.probe_interval)
            .run(self.shutdown.subscribe())
            .await;
        Ok(())
    }

    /// Reject new dispatch, stop probing and wait for every backend to drain.
    ///
    /// A second call fails with `AlreadyStopped` and does not wait again.
    pub async fn stop(&self) -> Result<(), PoolError> {
        let transition = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| match PoolState::from(s) {
                PoolState::Created | PoolState::Running => Some(PoolState::Stopping as u8),
                PoolState::Stopping | PoolState::Stopped => None,
            });
        if transition.is_err() {
            return Err(LifecycleError::AlreadyStopped.into());
        }

        tracing::info!("Stopping pool");
        self.shutdown.trigger();

        tracing::info!("Waiting for backends to drain");
        for backend in self.backends().iter() {
            if backend.in_flight() > 0 {
                tracing::debug!(backend = %backend.name(), in_flight = backend.in_flight(), "Draining backend");
            }
            backend.drained().await;
        }

        self.state.store(PoolState::Stopped as u8, Ordering::SeqCst);
        tracing::info!("Pool stopped");
        Ok(())
    }
}
