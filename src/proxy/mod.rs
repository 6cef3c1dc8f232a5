//! Fetch orchestration for proxied requests.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → target.rs (token decode, or literal path + Referer / page cookie)
//!     → session store (resolve browser's upstream client)
//!     → UpstreamClient::execute (sanitized headers, HTTP/1.1, redirects)
//!     → redirected?  → 302 to the token of the final URL
//!     → text/html    → rewrite, set page-base cookie
//!     → text/css     → rewrite
//!     → otherwise    → stream through unchanged
//! ```
//!
//! Every browser request maps to exactly one upstream attempt. Nothing here
//! times out: a stalled origin holds only its own request.

pub mod target;

use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderMap, Response, StatusCode};
use axum::response::IntoResponse;
use cookie::Cookie;
use futures_util::{stream, StreamExt};
use thiserror::Error;
use url::Url;

use crate::http::headers::{browser_response_headers, upstream_request_headers};
use crate::http::request::is_programmatic;
use crate::http::response::{append_set_cookie, redirect_to_token};
use crate::observability::metrics;
use crate::rewrite::{self, DocumentKind};
use crate::session::{
    RequestBody, SessionError, SessionStore, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse,
};

pub use target::{resolve_target, PAGE_BASE_COOKIE};

/// Why a proxied request failed. Every variant maps to a visible status.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no upstream target for this path")]
    NotFound,

    #[error("unable to start session: {0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = match self {
            ProxyError::NotFound => "404 page not found".to_string(),
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

/// Per-request state: the inbound request, the target as currently
/// resolved, and the upstream response once fetched.
#[derive(Debug)]
pub struct ProxyContext {
    pub request: Parts,
    pub target: Url,
    pub upstream: Option<UpstreamResponse>,
}

impl ProxyContext {
    pub fn new(request: Parts, target: Url) -> Self {
        Self {
            request,
            target,
            upstream: None,
        }
    }

    /// Perform the single upstream request for this context.
    pub async fn fetch(&mut self, client: &UpstreamClient, body: RequestBody) -> Result<(), UpstreamError> {
        let request = UpstreamRequest {
            method: self.request.method.clone(),
            url: self.target.clone(),
            headers: upstream_request_headers(&self.request.headers),
            body,
        };

        let start = Instant::now();
        let result = client.execute(request).await;
        metrics::record_upstream(start);

        match result {
            Ok(upstream) => {
                self.upstream = Some(upstream);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(url = %self.target, error = %e, "Upstream fetch failed");
                Err(e)
            }
        }
    }

    /// Turn the fetched upstream response into the browser response.
    pub async fn respond(mut self) -> Result<Response<Body>, ProxyError> {
        let Some(upstream) = self.upstream.take() else {
            return Err(ProxyError::NotFound);
        };

        if upstream.was_redirected(&self.target) {
            tracing::debug!(from = %self.target, to = %upstream.final_url, "Remapping upstream redirect");
            metrics::record_request("redirected");
            return Ok(redirect_to_token(&upstream.final_url));
        }

        let response = upstream.response;
        let status = response.status();
        let mut headers = browser_response_headers(response.headers());
        let kind = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(DocumentKind::from_content_type);

        let Some(kind) = kind else {
            metrics::record_request("passthrough");
            return Ok(build_response(status, headers, Body::from_stream(response.bytes_stream())));
        };

        let body = response.bytes().await.map_err(UpstreamError::from)?;
        let rewritten = rewrite::rewrite(kind, &body, &mut self.target);
        headers.remove(header::CONTENT_LENGTH);
        metrics::record_rewrite(kind.as_str());
        metrics::record_request("rewritten");

        let mut out = build_response(status, headers, Body::from(rewritten));
        if kind == DocumentKind::Html && !is_programmatic(&self.request.headers) {
            append_set_cookie(&mut out, &page_base_cookie(&self.target));
        }
        Ok(out)
    }
}

/// Run the full pipeline for one inbound request.
pub async fn proxy_request(
    sessions: &SessionStore,
    max_body_size: usize,
    request: axum::http::Request<Body>,
) -> Response<Body> {
    let (parts, body) = request.into_parts();

    let target = match resolve_target(parts.uri.path(), parts.uri.query(), &parts.headers) {
        Some(target) => target,
        None => {
            tracing::debug!(path = %parts.uri.path(), "No target for path");
            metrics::record_request("not_found");
            return ProxyError::NotFound.into_response();
        }
    };

    let session = match sessions.resolve(sessions.session_id_from_headers(&parts.headers).as_deref()) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Session creation failed");
            metrics::record_request("error");
            return ProxyError::from(e).into_response();
        }
    };

    let mut response = match forward(parts, body, target, &session.client, max_body_size).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_request("error");
            e.into_response()
        }
    };

    if let Some(id) = &session.issued {
        append_set_cookie(&mut response, &sessions.session_cookie(id));
    }
    response
}

async fn forward(
    parts: Parts,
    body: Body,
    target: Url,
    client: &UpstreamClient,
    max_body_size: usize,
) -> Result<Response<Body>, ProxyError> {
    let body = read_body(body, max_body_size).await?;

    let mut ctx = ProxyContext::new(parts, target);
    ctx.fetch(client, body).await?;
    ctx.respond().await
}

/// Buffer the inbound body so redirects can replay it. Past `max_buffered`
/// bytes, stop buffering and stream the rest upstream behind what was read.
pub async fn read_body(body: Body, max_buffered: usize) -> Result<RequestBody, axum::Error> {
    let mut data = body.into_data_stream();
    let mut buffered = Vec::new();

    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        if buffered.len() + chunk.len() > max_buffered {
            tracing::debug!(buffered = buffered.len(), "Request body over buffer limit, streaming");
            let head = stream::iter([Ok(Bytes::from(buffered)), Ok(chunk)]);
            return Ok(RequestBody::Streamed(reqwest::Body::wrap_stream(head.chain(data))));
        }
        buffered.extend_from_slice(&chunk);
    }

    Ok(RequestBody::Buffered(Bytes::from(buffered)))
}

/// Cookie naming the page just served, fragment removed.
pub fn page_base_cookie(page: &Url) -> String {
    let mut page = page.clone();
    page.set_fragment(None);
    Cookie::build((PAGE_BASE_COOKIE, page.to_string()))
        .path("/")
        .http_only(true)
        .build()
        .encoded()
        .to_string()
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(ProxyError::NotFound.status(), StatusCode::NOT_FOUND);
        let err = ProxyError::Upstream(UpstreamError::TooManyRedirects(10));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "stopped after 10 redirects");
    }

    #[test]
    fn test_page_base_cookie_drops_fragment() {
        let page = Url::parse("http://x.test/a/b.html?q=1#section").unwrap();
        let cookie = page_base_cookie(&page);
        assert!(cookie.starts_with("gopee-page="));
        assert!(!cookie.contains("section"));
        let parsed = Cookie::parse_encoded(cookie).unwrap();
        assert_eq!(parsed.value(), "http://x.test/a/b.html?q=1");
    }

    #[tokio::test]
    async fn test_small_body_is_buffered() {
        match read_body(Body::from("name=value"), 1024).await.unwrap() {
            RequestBody::Buffered(bytes) => assert_eq!(bytes, Bytes::from_static(b"name=value")),
            RequestBody::Streamed(_) => panic!("expected a buffered body"),
        }
    }

    #[tokio::test]
    async fn test_oversized_body_is_streamed() {
        let body = Body::from(vec![7u8; 4096]);
        assert!(matches!(read_body(body, 1024).await.unwrap(), RequestBody::Streamed(_)));
    }

    #[tokio::test]
    async fn test_respond_without_fetch_is_not_found() {
        let (parts, _) = axum::http::Request::new(Body::empty()).into_parts();
        let ctx = ProxyContext::new(parts, Url::parse("http://x.test/").unwrap());
        assert!(matches!(ctx.respond().await, Err(ProxyError::NotFound)));
    }
}
