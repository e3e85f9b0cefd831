//! Outbound HTTP client used for forwarding and health probes.

use std::time::Duration;

use axum::body::Body;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

/// Plain-HTTP client with connection pooling.
pub type HttpClient = Client<HttpConnector, Body>;

/// Build a client whose connect phase is bounded by `connect_timeout`.
pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new()).build(connector)
}
