//! Forwarded header contract.
//!
//! # Rules
//! - All inbound headers are copied verbatim, except `Host` which the client
//!   re-derives from the backend target.
//! - `X-Forwarded-For`: set to the client IP, or `<existing>,<client ip>`.
//! - `X-Forwarded-Port`: port of the `Host` the client used to reach us. A
//!   Host without a parsable port fails the request.

use std::net::IpAddr;
use std::str::FromStr;

use axum::http::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    uri::Authority,
    Uri,
};

use crate::error::ForwardError;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");

/// Build the outbound header map for a request received from `remote`.
pub fn forwarded_headers(
    inbound: &HeaderMap,
    uri: &Uri,
    remote: IpAddr,
) -> Result<HeaderMap, ForwardError> {
    let port = forwarded_port(inbound, uri)?;

    let mut headers = inbound.clone();
    headers.remove(header::HOST);

    let forwarded_for = match inbound.get(X_FORWARDED_FOR) {
        Some(existing) if !existing.is_empty() => {
            let mut value = existing.as_bytes().to_vec();
            value.push(b',');
            value.extend_from_slice(remote.to_string().as_bytes());
            HeaderValue::from_bytes(&value)
                .map_err(|e| ForwardError::Request(e.into()))?
        }
        _ => HeaderValue::from_str(&remote.to_string())
            .map_err(|e| ForwardError::Request(e.into()))?,
    };
    headers.insert(X_FORWARDED_FOR, forwarded_for);
    headers.insert(X_FORWARDED_PORT, HeaderValue::from(port));

    Ok(headers)
}

/// Port of the authority the client connected to.
///
/// Prefers the `Host` header and falls back to the request URI authority
/// (HTTP/2 clients send `:authority` instead of `Host`).
pub fn forwarded_port(headers: &HeaderMap, uri: &Uri) -> Result<u16, ForwardError> {
    let host = match headers.get(header::HOST) {
        Some(value) => match value.to_str() {
            Ok(host) => host.to_string(),
            Err(_) => {
                let raw = String::from_utf8_lossy(value.as_bytes()).into_owned();
                return Err(ForwardError::ForwardedPort(raw));
            }
        },
        None => uri
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| ForwardError::ForwardedPort(String::new()))?,
    };

    Authority::from_str(&host)
        .ok()
        .and_then(|authority| authority.port_u16())
        .ok_or(ForwardError::ForwardedPort(host))
}
