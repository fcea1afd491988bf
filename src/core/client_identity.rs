//! Client identity resolution for rate limiting
//!
//! The identity is taken from the first `X-Forwarded-For` entry, then from
//! `X-Real-IP`, and only then from the transport peer address. Proxies in
//! front of the server therefore decide the perceived identity; keep that
//! ordering in mind when deploying without one.

use log::{debug, trace};
use std::net::SocketAddr;
use warp::http::HeaderMap;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";
const UNKNOWN_IDENTITY: &str = "unknown";

/// Resolve the identity used to key rate limiter buckets
pub fn client_identity(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, FORWARDED_FOR) {
        // "client, proxy1, proxy2": the leftmost entry is the original client
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            trace!("Client identity from X-Forwarded-For: {}", first);
            return first.to_string();
        }
    }

    if let Some(real_ip) = header_str(headers, REAL_IP) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            trace!("Client identity from X-Real-IP: {}", real_ip);
            return real_ip.to_string();
        }
    }

    match remote_addr {
        Some(addr) => addr.ip().to_string(),
        None => {
            debug!("No forwarding headers or peer address, using shared identity");
            UNKNOWN_IDENTITY.to_string()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
