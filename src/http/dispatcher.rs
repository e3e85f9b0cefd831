//! Per-request dispatch: select a live backend and relay through it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};

use crate::error::DispatchError;
use crate::load_balancer::{backend::InFlight, pool::Pool};
use crate::observability::metrics;

/// Entry point handed to the HTTP layer.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pool: Arc<Pool>,
}

impl Dispatcher {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Dispatch one request. Failures become error responses; this never fails.
    pub async fn handle(&self, request: Request<Body>, remote: SocketAddr) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let in_flight = match self.select() {
            Ok(in_flight) => in_flight,
            Err(e) => {
                tracing::warn!(method = %method, path = %path, error = %e, "Request rejected");
                let response = e.into_response();
                metrics::record_request(method.as_str(), response.status().as_u16(), "none", start);
                return response;
            }
        };

        let backend = in_flight.name().to_string();
        tracing::debug!(
            method = %method,
            path = %path,
            remote = %remote,
            backend = %backend,
            "Dispatching request"
        );

        let response = match in_flight.forward(request, remote.ip()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    backend = %backend,
                    error = %e,
                    "Upstream error"
                );
                DispatchError::from(e).into_response()
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), &backend, start);
        response
    }

    fn select(&self) -> Result<InFlight, DispatchError> {
        if self.pool.is_stopped() {
            return Err(DispatchError::Stopped);
        }
        Ok(self.pool.pick_healthy()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::{
        backend::BackendOptions,
        pool::DEFAULT_PROBE_INTERVAL,
        SelectionPolicy,
    };
    use axum::http::{header, StatusCode};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Pool::new(
            SelectionPolicy::default(),
            DEFAULT_PROBE_INTERVAL,
        )))
    }

    fn request() -> Request<Body> {
        Request::builder()
            .uri("/")
            .header(header::HOST, "localhost:8080")
            .body(Body::empty())
            .unwrap()
    }

    fn remote() -> SocketAddr {
        "10.0.0.1:40000".parse().unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_stopped_pool_returns_503() {
        let dispatcher = dispatcher();
        dispatcher.pool().stop().await.unwrap();

        let response = dispatcher.handle(request(), remote()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "server is stopped");
    }

    #[tokio::test]
    async fn test_empty_pool_returns_503() {
        let response = dispatcher().handle(request(), remote()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "no healthy backends available");
    }

    #[tokio::test]
    async fn test_connection_refused_returns_502() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dispatcher = dispatcher();
        let backend = dispatcher
            .pool()
            .add_backend(&format!("127.0.0.1:{}", port), BackendOptions::new())
            .unwrap();

        let response = dispatcher.handle(request(), remote()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_missing_forwarded_port_returns_502() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dispatcher = dispatcher();
        dispatcher
            .pool()
            .add_backend(&format!("127.0.0.1:{}", port), BackendOptions::new())
            .unwrap();

        let request = Request::builder()
            .uri("/")
            .header(header::HOST, "localhost")
            .body(Body::empty())
            .unwrap();
        let response = dispatcher.handle(request, remote()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
