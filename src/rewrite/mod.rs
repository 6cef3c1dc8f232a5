//! In-page reference rewriting.
//!
//! Scans fetched HTML and CSS bodies for URL-bearing spans and replaces each
//! with a root-relative proxy path (`/` + token) so that follow-on requests
//! come back through the proxy.
//!
//! # Design Decisions
//! - Regex scanning over raw bytes, no DOM. URLs inside inline scripts,
//!   comments or oddly quoted attributes may be rewritten wrongly or missed.
//! - Fail-open: a span that cannot be resolved is left as it was.
//! - `<base href>` changes the current base for the rest of one response only.

pub mod patterns;

use std::borrow::Cow;

use regex::bytes::{Captures, Regex};
use url::Url;

use crate::codec;
use patterns::{BASE_HREF_RE, CSS_URL_RE, HTML_ATTR_RE};

/// Which grammar applies to a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    Css,
}

impl DocumentKind {
    /// Classify by `Content-Type`. Anything else is passed through untouched.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("text/html") {
            Some(DocumentKind::Html)
        } else if content_type.contains("text/css") {
            Some(DocumentKind::Css)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Html => "html",
            DocumentKind::Css => "css",
        }
    }
}

/// Rewrite a body of the given kind. For HTML, `base` is replaced by the
/// document's `<base href>` if it declares one.
pub fn rewrite(kind: DocumentKind, body: &[u8], base: &mut Url) -> Vec<u8> {
    match kind {
        DocumentKind::Html => rewrite_html(body, base),
        DocumentKind::Css => rewrite_css(body, base),
    }
}

/// Rewrite `src`, `href` and `action` attributes.
pub fn rewrite_html(body: &[u8], base: &mut Url) -> Vec<u8> {
    if let Some(declared) = find_base_href(body, base) {
        tracing::debug!(base = %declared, "Document declares base href");
        *base = declared;
    }
    rewrite_spans(&HTML_ATTR_RE, body, base)
}

/// Rewrite `url(...)` arguments.
pub fn rewrite_css(body: &[u8], base: &Url) -> Vec<u8> {
    rewrite_spans(&CSS_URL_RE, body, base)
}

/// The document's `<base href>`, resolved against `current` when relative.
pub fn find_base_href(body: &[u8], current: &Url) -> Option<Url> {
    let caps = BASE_HREF_RE.captures(body)?;
    let href = std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?;
    current.join(href).ok()
}

/// The replacement for one matched span, or `None` to leave it untouched.
///
/// Fragments, `javascript:` and `data:` spans are skipped, as are absolute
/// URLs with schemes the proxy cannot fetch (`mailto:`, `tel:`...). Relative
/// spans are resolved against `base` first.
pub fn rewrite_reference(span: &[u8], base: &Url) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(span).ok()?;
    if text.is_empty() || text.starts_with('#') || has_scheme(text, "javascript") || has_scheme(text, "data") {
        return None;
    }

    let absolute: Cow<'_, str> = match Url::parse(text) {
        Ok(url) if is_fetchable(&url) => Cow::Borrowed(text),
        Ok(_) => return None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let resolved = base.join(text).ok()?;
            if !is_fetchable(&resolved) {
                return None;
            }
            Cow::Owned(resolved.into())
        }
        Err(_) => return None,
    };

    let mut replacement = Vec::with_capacity(absolute.len() * 4 / 3 + 8);
    replacement.push(b'/');
    replacement.extend_from_slice(codec::encode(absolute.as_bytes()).as_bytes());
    Some(replacement)
}

fn rewrite_spans(re: &Regex, body: &[u8], base: &Url) -> Vec<u8> {
    re.replace_all(body, |caps: &Captures<'_>| -> Vec<u8> {
        let whole = &caps[0];
        let Some(span) = (1..caps.len()).find_map(|i| caps.get(i)) else {
            return whole.to_vec();
        };
        let Some(replacement) = rewrite_reference(span.as_bytes(), base) else {
            return whole.to_vec();
        };

        let offset = caps.get(0).map_or(0, |m| m.start());
        let (start, end) = (span.start() - offset, span.end() - offset);
        let mut out = Vec::with_capacity(whole.len() - (end - start) + replacement.len());
        out.extend_from_slice(&whole[..start]);
        out.extend_from_slice(&replacement);
        out.extend_from_slice(&whole[end..]);
        out
    })
    .into_owned()
}

fn has_scheme(text: &str, scheme: &str) -> bool {
    text.len() > scheme.len()
        && text.as_bytes()[scheme.len()] == b':'
        && text[..scheme.len()].eq_ignore_ascii_case(scheme)
}

fn is_fetchable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
