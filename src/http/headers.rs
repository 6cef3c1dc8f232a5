//! Header sanitation across the proxy boundary.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip headers that break proxying (CSP, encodings, browser cookies)
//! - Keep cookies inside the session jar: no `Cookie` upstream, no
//!   `Set-Cookie` back to the browser

use axum::http::header::{self, HeaderMap, HeaderName};

/// Headers meaningful only to a single transport leg.
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Headers that stop a rewritten page from working through the proxy.
pub const PROXY_BREAKING: [&str; 4] = [
    "content-security-policy",
    "content-security-policy-report-only",
    "accept-encoding",
    "cookie",
];

/// Remove hop-by-hop and proxy-breaking headers, including any extra
/// hop-by-hop names listed in `Connection`.
pub fn sanitize(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP.iter().chain(PROXY_BREAKING.iter()) {
        headers.remove(*name);
    }
}

/// Headers to send upstream for an inbound browser request. `Host` and
/// `Content-Length` are recomputed by the upstream client.
pub fn upstream_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    sanitize(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers
}

/// Headers to relay to the browser for an upstream response.
pub fn browser_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    sanitize(&mut headers);
    headers.remove(header::SET_COOKIE);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.append(*k, HeaderValue::from_static(v));
        }
        headers
    }

    #[test]
    fn test_upstream_headers_drop_cookie_and_hop_by_hop() {
        let inbound = map(&[
            ("host", "proxy.local:8080"),
            ("cookie", "gopee=abc"),
            ("accept-encoding", "gzip"),
            ("connection", "keep-alive, x-private"),
            ("x-private", "1"),
            ("te", "trailers"),
            ("content-length", "4"),
            ("user-agent", "test"),
            ("authorization", "Bearer t"),
        ]);
        let out = upstream_request_headers(&inbound);
        for gone in ["host", "cookie", "accept-encoding", "connection", "x-private", "te", "content-length"] {
            assert!(!out.contains_key(gone), "{gone} should be stripped");
        }
        assert_eq!(out["user-agent"], "test");
        assert_eq!(out["authorization"], "Bearer t");
    }

    #[test]
    fn test_browser_headers_drop_csp_and_set_cookie() {
        let upstream = map(&[
            ("content-security-policy", "default-src 'self'"),
            ("content-security-policy-report-only", "default-src 'self'"),
            ("transfer-encoding", "chunked"),
            ("keep-alive", "timeout=5"),
            ("set-cookie", "sid=1"),
            ("content-type", "text/html"),
            ("cache-control", "no-cache"),
        ]);
        let out = browser_response_headers(&upstream);
        for name in HOP_BY_HOP.iter().chain(PROXY_BREAKING.iter()) {
            assert!(!out.contains_key(*name));
        }
        assert!(!out.contains_key("set-cookie"));
        assert_eq!(out["content-type"], "text/html");
        assert_eq!(out["cache-control"], "no-cache");
    }
}
