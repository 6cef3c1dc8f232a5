//! Working out which upstream URL an inbound path refers to.
//!
//! Paths are either one of our tokens or, for requests the rewriter never
//! saw (scripted requests, dynamically built paths), a literal reference.
//! Literal relative references are resolved against the page the browser
//! was on: first the token in `Referer`, then the page-base cookie.

use axum::http::{header, HeaderMap};
use url::Url;

use crate::codec;
use crate::session::store::cookie_value;

/// Cookie recording the last HTML page served to this browser.
pub const PAGE_BASE_COOKIE: &str = "gopee-page";

/// Resolve an inbound path (with leading `/`) and query into an upstream URL.
pub fn resolve_target(path: &str, query: Option<&str>, headers: &HeaderMap) -> Option<Url> {
    let segment = path.strip_prefix('/').unwrap_or(path);

    match codec::decode(segment) {
        Ok(url) => return Some(url),
        Err(e) => tracing::trace!(path = %path, reason = %e, "Path is not a token"),
    }

    let literal = match query {
        Some(query) => format!("{}?{}", segment, query),
        None => segment.to_string(),
    };
    if literal.is_empty() {
        return None;
    }

    match Url::parse(&literal) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => return Some(url),
        Ok(_) => return None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(_) => return None,
    }

    let base = referer_base(headers).or_else(|| page_base(headers))?;
    base.join(&literal).ok()
}

/// The page URL encoded in the referring request's own token.
fn referer_base(headers: &HeaderMap) -> Option<Url> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let referer = Url::parse(referer).ok()?;
    let segment = referer.path().strip_prefix('/')?;
    codec::decode(segment).ok()
}

fn page_base(headers: &HeaderMap) -> Option<Url> {
    let value = cookie_value(headers, PAGE_BASE_COOKIE)?;
    Url::parse(&value).ok()
}
