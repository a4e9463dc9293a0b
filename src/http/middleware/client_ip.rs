//! Client address resolution behind proxies.
//!
//! Precedence:
//! 1. Neither `X-Real-Ip` nor `X-Forwarded-For` set: peer address with the
//!    trailing `:port` removed
//! 2. `X-Forwarded-For` set: its first comma-separated entry
//! 3. Otherwise `X-Real-Ip` as given
//!
//! The port strip splits on the rightmost colon and nothing else, so an
//! unbracketed IPv6 literal loses its last group. Callers rely on this exact
//! behaviour.

use axum::http::HeaderMap;

pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the originating client address for a request.
pub fn resolve_client_ip(headers: &HeaderMap, peer_addr: &str) -> String {
    let real_ip = header_str(headers, X_REAL_IP);
    let forwarded_for = header_str(headers, X_FORWARDED_FOR);

    match (real_ip, forwarded_for) {
        ("", "") => strip_port(peer_addr).to_string(),
        (_, forwarded) if !forwarded.is_empty() => forwarded
            .split(',')
            .map(str::trim)
            .next()
            .unwrap_or_default()
            .to_string(),
        (real, _) => real.to_string(),
    }
}

/// Drop everything from the rightmost colon on: `"[::1]:58292"` → `"[::1]"`.
pub fn strip_port(addr: &str) -> &str {
    match addr.rfind(':') {
        Some(idx) => &addr[..idx],
        None => addr,
    }
}

// First value only; missing or non-UTF-8 reads as empty.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
