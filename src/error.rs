//! Error taxonomy for the pool and dispatch path.
//!
//! # Propagation
//! - `ConfigurationError` and `LifecycleError` are returned to the caller
//!   of the offending operation and are never retried.
//! - `NoBackendsError`, `ForwardError` are per-request and get translated to
//!   an HTTP status at the dispatcher boundary (`DispatchError`).
//! - `ProbeError` only ever feeds the unhealthy set and the logs.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

/// Invalid backend definition supplied at construction time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unable to parse address {0}: missing port")]
    MissingPort(String),

    #[error("unable to parse IP address {host} in {target}")]
    InvalidHost { target: String, host: String },

    #[error("unable to parse port {port} in {target}")]
    InvalidPort { target: String, port: String },
}

/// Operation invoked in the wrong pool lifecycle state.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("pool is already stopped")]
    AlreadyStopped,

    #[error("pool is already running")]
    AlreadyRunning,
}

/// No live backend could be selected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no healthy backends available")]
pub struct NoBackendsError;

/// Errors surfaced by [`Pool`](crate::load_balancer::pool::Pool) operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    NoBackends(#[from] NoBackendsError),

    #[error("backend {0} is not part of the pool")]
    UnknownBackend(Uuid),
}

/// Failure of a single forwarding attempt.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The client's Host header carried no usable port.
    #[error("unable to derive X-Forwarded-Port from {0:?}")]
    ForwardedPort(String),

    #[error("unable to build forwarded request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    /// Status returned to the client for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Reason a health probe marked a backend unhealthy.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("healthcheck failed with status {0}")]
    Status(StatusCode),

    #[error("error sending healthcheck request: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("healthcheck timed out after {0:?}")]
    Timeout(Duration),

    #[error("error creating healthcheck request: {0}")]
    InvalidUrl(String),
}

/// Outcome of a rejected dispatch, rendered as an HTTP error response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("server is stopped")]
    Stopped,

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Pool(PoolError::NoBackends(_)) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Pool(PoolError::Lifecycle(_)) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Forward(e) => e.status_code(),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
