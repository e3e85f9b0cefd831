//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server (identity, target, weight)
//! - Track in-flight requests for graceful drain
//! - Probe the backend's health endpoint
//! - Forward a request to the backend and stream its response back

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ops::Deref;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    http::{uri::PathAndQuery, Method, Request, Response, StatusCode, Uri, Version},
};
use hyper::body::{Body as HttpBody, Bytes, Frame, Incoming, SizeHint};
use tokio::sync::Notify;
use tokio::time;
use url::Url;
use uuid::Uuid;

use crate::error::{ConfigurationError, ForwardError, ProbeError};
use crate::health::HealthResult;
use crate::http::client::{build_client, HttpClient};
use crate::http::forward::forwarded_headers;
use crate::observability::metrics;

/// Upper bound for a backend's weight.
pub const MAX_WEIGHT: u32 = 100;

/// Health probe settings for a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Port the health endpoint listens on (may differ from the target port).
    pub port: u16,
    /// Path of the health endpoint, e.g. `/health`.
    pub path: String,
    /// Upper bound for a single probe.
    pub timeout: Duration,
}

impl ProbeConfig {
    pub fn new(port: u16, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            port,
            path: path.into(),
            timeout,
        }
    }
}

/// Construction options for a [`Backend`].
#[derive(Debug, Clone)]
pub struct BackendOptions {
    name: Option<String>,
    weight: u32,
    probe: Option<ProbeConfig>,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            name: None,
            weight: 1,
            probe: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Human readable label used in logs and metrics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the weight, clamped to `[0, MAX_WEIGHT]`.
    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight.clamp(0, MAX_WEIGHT as i64) as u32;
        self
    }

    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    id: Uuid,
    addr: SocketAddr,
    /// Pre-calculated base URL, reused for probe URLs.
    base_url: Url,
    name: String,
    weight: u32,
    probe: Option<ProbeConfig>,
    request_timeout: Duration,
    client: HttpClient,

    /// Number of requests currently being forwarded.
    in_flight: AtomicUsize,
    /// Woken whenever `in_flight` drops to zero.
    drained: Notify,
}

impl Backend {
    /// Create a backend for a `host:port` target.
    ///
    /// The host must be an IP literal; a bad host or port is reported here,
    /// never at dispatch time.
    pub fn new(target: &str, options: BackendOptions) -> Result<Self, ConfigurationError> {
        let addr = parse_target(target)?;
        let base_url = Url::parse(&format!("http://{}", addr))
            .map_err(|_| ConfigurationError::InvalidHost {
                target: target.to_string(),
                host: addr.ip().to_string(),
            })?;

        Ok(Self {
            id: Uuid::new_v4(),
            addr,
            base_url,
            name: options.name.unwrap_or_else(|| addr.to_string()),
            weight: options.weight,
            probe: options.probe,
            request_timeout: options.request_timeout,
            client: build_client(options.connect_timeout),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Current number of in-flight requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Mark one request in flight until the returned guard is dropped.
    ///
    /// The increment is sequentially consistent with the pool's state
    /// transitions, so a pool that observes zero after flagging itself
    /// stopped can never see this guard succeed.
    pub fn track(self: &Arc<Self>) -> InFlight {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_in_flight(&self.name, current);
        InFlight {
            backend: self.clone(),
        }
    }

    /// Resolve once no request is in flight.
    pub async fn drained(&self) {
        loop {
            // Register before checking so a concurrent release cannot be missed.
            let notified = self.drained.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        metrics::record_in_flight(&self.name, previous - 1);
        if previous == 1 {
            self.drained.notify_waiters();
        }
    }

    // --- Health ---

    /// Probe the backend's health endpoint.
    ///
    /// A backend without probe configuration is assumed healthy.
    pub async fn probe(&self) -> HealthResult {
        let Some(probe) = &self.probe else {
            tracing::debug!(backend = %self.name, "No healthcheck configured, assuming healthy");
            return HealthResult::Healthy;
        };

        let uri = match self.probe_uri(probe) {
            Ok(uri) => uri,
            Err(e) => return HealthResult::Unhealthy(e),
        };

        let request = match Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("user-agent", "lb-dispatch-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => return HealthResult::Unhealthy(ProbeError::InvalidUrl(e.to_string())),
        };

        match time::timeout(probe.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => HealthResult::Healthy,
            Ok(Ok(response)) => HealthResult::Unhealthy(ProbeError::Status(response.status())),
            Ok(Err(e)) => HealthResult::Unhealthy(ProbeError::Transport(e)),
            Err(_) => HealthResult::Unhealthy(ProbeError::Timeout(probe.timeout)),
        }
    }

    fn probe_uri(&self, probe: &ProbeConfig) -> Result<Uri, ProbeError> {
        let mut url = self.base_url.clone();
        url.set_port(Some(probe.port))
            .map_err(|_| ProbeError::InvalidUrl(format!("invalid probe port {}", probe.port)))?;
        match probe.path.split_once('?') {
            Some((path, query)) => {
                url.set_path(path);
                url.set_query(Some(query));
            }
            None => url.set_path(&probe.path),
        }

        url.as_str()
            .parse::<Uri>()
            .map_err(|e| ProbeError::InvalidUrl(e.to_string()))
    }

    fn upstream_uri(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, ForwardError> {
        let path_and_query = path_and_query.map(PathAndQuery::as_str).unwrap_or("/");
        Ok(Uri::builder()
            .scheme("http")
            .authority(self.addr.to_string())
            .path_and_query(path_and_query)
            .build()?)
    }
}

/// Parse a `host:port` target whose host is an IP literal.
///
/// IPv6 hosts must be bracketed (`[::1]:80`); IPv4 hosts must not be.
pub fn parse_target(target: &str) -> Result<SocketAddr, ConfigurationError> {
    let invalid_host = |host: &str| ConfigurationError::InvalidHost {
        target: target.to_string(),
        host: host.to_string(),
    };
    let missing_port = || ConfigurationError::MissingPort(target.to_string());

    let (ip, port) = match target.strip_prefix('[') {
        Some(rest) => {
            let (host, after) = rest.split_once(']').ok_or_else(|| invalid_host(target))?;
            let port = after.strip_prefix(':').ok_or_else(missing_port)?;
            let ip: Ipv6Addr = host.parse().map_err(|_| invalid_host(host))?;
            (IpAddr::V6(ip), port)
        }
        None => {
            let (host, port) = target.rsplit_once(':').ok_or_else(missing_port)?;
            let ip: Ipv4Addr = host.parse().map_err(|_| invalid_host(host))?;
            (IpAddr::V4(ip), port)
        }
    };

    let port: u16 = port.parse().map_err(|_| ConfigurationError::InvalidPort {
        target: target.to_string(),
        port: port.to_string(),
    })?;

    Ok(SocketAddr::new(ip, port))
}

/// Owned guard over one in-flight request.
///
/// Handed out by the pool at selection time and carried through the
/// upstream exchange into the response body.
#[derive(Debug)]
pub struct InFlight {
    backend: Arc<Backend>,
}

impl InFlight {
    /// Forward `request`, received from `remote`, to the held backend.
    ///
    /// The request timeout bounds the wait for the response head. The body is
    /// streamed back and the guard is released once it is fully relayed or
    /// dropped.
    pub async fn forward(
        self,
        request: Request<Body>,
        remote: IpAddr,
    ) -> Result<Response<Body>, ForwardError> {
        let (parts, body) = request.into_parts();
        let headers = forwarded_headers(&parts.headers, &parts.uri, remote)?;
        let uri = self.upstream_uri(parts.uri.path_and_query())?;

        let mut outbound = Request::builder()
            .method(parts.method)
            .uri(uri)
            .version(Version::HTTP_11)
            .body(body)?;
        *outbound.headers_mut() = headers;

        let response = match time::timeout(self.request_timeout, self.client.request(outbound)).await {
            Ok(result) => result?,
            Err(_) => return Err(ForwardError::Timeout(self.request_timeout)),
        };

        let (parts, body) = response.into_parts();
        let body = GuardedBody {
            inner: body,
            _in_flight: self,
        };
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl Deref for InFlight {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.backend.release();
    }
}

/// Upstream response body holding its request's in-flight slot.
struct GuardedBody {
    inner: Incoming,
    _in_flight: InFlight,
}

impl HttpBody for GuardedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering every connection with `status`.
    async fn status_server(status_line: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status_line
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("127.0.0.1:9100").unwrap(),
            "127.0.0.1:9100".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_target("[::1]:80").unwrap(),
            "[::1]:80".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_parse_target_errors() {
        assert!(matches!(
            parse_target("127.0.0.1"),
            Err(ConfigurationError::MissingPort(_))
        ));
        assert!(matches!(
            parse_target("not-an-ip:80"),
            Err(ConfigurationError::InvalidHost { .. })
        ));
        assert!(matches!(
            parse_target("127.0.0.1:http"),
            Err(ConfigurationError::InvalidPort { .. })
        ));
        assert!(matches!(
            parse_target("127.0.0.1:70000"),
            Err(ConfigurationError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_parse_target_requires_brackets_for_ipv6_only() {
        assert!(matches!(
            parse_target("::1:80"),
            Err(ConfigurationError::InvalidHost { .. })
        ));
        assert!(matches!(
            parse_target("[1.2.3.4]:80"),
            Err(ConfigurationError::InvalidHost { .. })
        ));
        assert!(matches!(
            parse_target("[::1]"),
            Err(ConfigurationError::MissingPort(_))
        ));
        assert!(matches!(
            parse_target("[::1:80"),
            Err(ConfigurationError::InvalidHost { .. })
        ));
    }

    #[test]
    fn test_weight_clamped() {
        let opts = |w| BackendOptions::new().with_weight(w);
        assert_eq!(Backend::new("127.0.0.1:1", opts(-5)).unwrap().weight(), 0);
        assert_eq!(Backend::new("127.0.0.1:1", opts(250)).unwrap().weight(), MAX_WEIGHT);
        assert_eq!(Backend::new("127.0.0.1:1", opts(7)).unwrap().weight(), 7);
        assert_eq!(Backend::new("127.0.0.1:1", BackendOptions::default()).unwrap().weight(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Backend::new("127.0.0.1:1", BackendOptions::default()).unwrap();
        let b = Backend::new("127.0.0.1:1", BackendOptions::default()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_in_flight_guard() {
        let backend = Arc::new(Backend::new("127.0.0.1:1", BackendOptions::default()).unwrap());
        {
            let a = backend.track();
            let b = backend.track();
            assert_eq!(backend.in_flight(), 2);
            assert_eq!(a.id(), backend.id());
            drop(b);
            assert_eq!(backend.in_flight(), 1);
        }
        assert_eq!(backend.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drained_waits_for_guard() {
        let backend = Arc::new(Backend::new("127.0.0.1:1", BackendOptions::default()).unwrap());
        backend.drained().await;

        let done = Arc::new(AtomicUsize::new(0));
        let guard_backend = backend.clone();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let holder = tokio::spawn(async move {
            let _guard = guard_backend.track();
            let _ = rx.await;
        });

        while backend.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let waiter_backend = backend.clone();
        let waiter_done = done.clone();
        let waiter = tokio::spawn(async move {
            waiter_backend.drained().await;
            waiter_done.store(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(done.load(Ordering::SeqCst), 0);

        tx.send(()).unwrap();
        holder.await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drain should complete")
            .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_unconfigured_is_healthy() {
        let backend = Backend::new("127.0.0.1:1", BackendOptions::default()).unwrap();
        assert!(backend.probe().await.is_healthy());
    }

    #[tokio::test]
    async fn test_probe_ok() {
        let addr = status_server("200 OK").await;
        let backend = Backend::new(
            &addr.to_string(),
            BackendOptions::new().with_probe(ProbeConfig::new(addr.port(), "/health", Duration::from_secs(1))),
        )
        .unwrap();
        assert!(backend.probe().await.is_healthy());
    }

    #[tokio::test]
    async fn test_probe_server_error_is_unhealthy() {
        let addr = status_server("500 Internal Server Error").await;
        let backend = Backend::new(
            &addr.to_string(),
            BackendOptions::new().with_probe(ProbeConfig::new(addr.port(), "/health", Duration::from_secs(1))),
        )
        .unwrap();
        match backend.probe().await {
            HealthResult::Unhealthy(ProbeError::Status(status)) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("unexpected probe result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_timeout_is_unhealthy() {
        // Accepts but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let backend = Backend::new(
            &addr.to_string(),
            BackendOptions::new().with_probe(ProbeConfig::new(addr.port(), "/health", Duration::from_millis(100))),
        )
        .unwrap();
        assert!(matches!(
            backend.probe().await,
            HealthResult::Unhealthy(ProbeError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_connection_refused_is_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let backend = Backend::new(
            &format!("127.0.0.1:{}", port),
            BackendOptions::new().with_probe(ProbeConfig::new(port, "/health", Duration::from_secs(1))),
        )
        .unwrap();
        assert!(!backend.probe().await.is_healthy());
    }

    #[test]
    fn test_probe_uri_uses_probe_port_and_path() {
        let backend = Backend::new("10.0.0.7:8082", BackendOptions::default()).unwrap();
        let probe = ProbeConfig::new(9100, "/healthz", Duration::from_secs(1));
        assert_eq!(backend.probe_uri(&probe).unwrap(), "http://10.0.0.7:9100/healthz");
    }

    #[test]
    fn test_health_check_uri_keeps_query() {
        let backend = Backend::new("10.0.0.7:8082", BackendOptions::default()).unwrap();
        let probe = ProbeConfig::new(9100, "/health?deep=1", Duration::from_secs(1));
        assert_eq!(
            backend.probe_uri(&probe).unwrap(),
            "http://10.0.0.7:9100/health?deep=1"
        );
    }

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let backend = Backend::new("10.0.0.7:8082", BackendOptions::default()).unwrap();
        let uri: Uri = "/a/b?c=d".parse().unwrap();
        assert_eq!(
            backend.upstream_uri(uri.path_and_query()).unwrap(),
            "http://10.0.0.7:8082/a/b?c=d"
        );
        assert_eq!(backend.upstream_uri(None).unwrap(), "http://10.0.0.7:8082/");
    }

    #[tokio::test]
    async fn test_forward_releases_counter_on_error() {
        let backend = Arc::new(Backend::new("127.0.0.1:1", BackendOptions::default()).unwrap());
        let request = Request::builder()
            .uri("/")
            .header("host", "lb.local")
            .body(Body::empty())
            .unwrap();
        let err = backend
            .track()
            .forward(request, "5.6.7.8".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::ForwardedPort(_)));
        assert_eq!(backend.in_flight(), 0);
    }
}
