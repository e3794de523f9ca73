//! Small request-scoped helpers used ahead of routing

use std::net::{IpAddr, SocketAddr};

use hyper::header::HeaderMap;

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket
pub fn real_ip(headers: &HeaderMap, addr: SocketAddr) -> IpAddr {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()))
        .unwrap_or_else(|| addr.ip())
}
