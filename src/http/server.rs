//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a catch-all dispatch handler
//! - Wire up middleware (tracing)
//! - Bind server to listener
//! - Run the pool's probe loop alongside the server
//! - Stop and drain the pool on shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, ProxyConfig};
use crate::http::dispatcher::Dispatcher;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::pool::Pool;

/// HTTP front end for a [`Pool`].
pub struct HttpServer {
    router: Router,
    pool: Arc<Pool>,
}

impl HttpServer {
    /// Build the pool described by `config` and a server in front of it.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let pool = Pool::from_config(&config)?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    /// Serve an existing pool.
    pub fn with_pool(pool: Arc<Pool>) -> Self {
        let router = Self::build_router(Dispatcher::new(pool.clone()));
        Self { router, pool }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(dispatcher: Dispatcher) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(dispatcher)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Run the server until `shutdown` fires, then drain.
    ///
    /// The pool is stopped as soon as the signal arrives, so requests still
    /// reaching the handler get 503 while open connections finish.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let Self { router, pool } = self;
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = pool.len(),
            policy = ?pool.policy().kind(),
            "HTTP server starting"
        );

        let prober = {
            let pool = pool.clone();
            tokio::spawn(async move {
                if let Err(e) = pool.start().await {
                    tracing::warn!(error = %e, "Health monitor not started");
                }
            })
        };

        let drain = {
            let pool = pool.clone();
            let mut signal = shutdown.clone();
            tokio::spawn(async move {
                signal.wait().await;
                tracing::info!("Shutdown requested, draining pool");
                if let Err(e) = pool.stop().await {
                    tracing::warn!(error = %e, "Pool stop failed");
                }
            })
        };

        let app = router.into_make_service_with_connect_info::<SocketAddr>();
        let mut signal = shutdown;
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.wait().await })
            .await;

        if let Err(e) = served {
            drain.abort();
            if let Err(stop) = pool.stop().await {
                tracing::debug!(error = %stop, "Pool already stopping");
            }
            let _ = prober.await;
            return Err(e);
        }

        if let Err(e) = drain.await {
            tracing::error!(error = %e, "Drain task failed");
        }
        if let Err(e) = prober.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler; every method and path goes to the dispatcher.
async fn proxy_handler(
    State(dispatcher): State<Dispatcher>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    dispatcher.handle(request, remote).await
}
