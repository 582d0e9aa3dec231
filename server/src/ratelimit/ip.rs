//! Client IP resolution for the per-IP limit.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::http::HeaderMap;

use crate::ratelimit::IPV6_PREFIX_SEGMENTS;

/// Resolves the rate limit identifier for the client behind a request.
///
/// Proxy headers are only consulted when `trust_proxy` is set; otherwise a
/// client could pick its own identifier. Without a peer address the
/// identifier falls back to the IPv4 loopback.
pub fn client_ip_identifier(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy: bool,
) -> String {
    let ip = trust_proxy
        .then(|| forwarded_ip(headers))
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    normalize_ip(ip)
}

/// First parseable address from `X-Forwarded-For`, then `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_forwarded_for = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    from_forwarded_for.or_else(|| {
        headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    })
}

/// Normalizes an address for use as an identifier.
///
/// IPv4-mapped IPv6 addresses collapse to their IPv4 form; other IPv6
/// addresses are truncated to their /64 so one allocation counts as one client.
pub fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return v4.to_string();
            }
            let segments = v6.segments();
            let prefix = segments[..IPV6_PREFIX_SEGMENTS]
                .iter()
                .map(|s| format!("{s:x}"))
                .collect::<Vec<_>>()
                .join(":");
            format!("{prefix}::/64")
        }
    }
}
