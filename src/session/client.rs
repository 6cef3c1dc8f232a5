//! Session-bound upstream HTTP client.
//!
//! Every session owns one of these. It wraps a reqwest client with a private
//! cookie jar and follows redirects itself so that the original request
//! headers can be re-sent on every hop and the final URL is known.

use std::sync::Arc;

use axum::body::Bytes;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode, Version};
use thiserror::Error;
use url::Url;

/// Failure talking to the upstream origin.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("{0} redirect needs the streamed request body again")]
    BodyNotReplayable(StatusCode),
}

/// An upstream request body. Buffered bodies can be re-sent on 307/308;
/// streamed ones go out once.
#[derive(Debug)]
pub enum RequestBody {
    Buffered(Bytes),
    Streamed(reqwest::Body),
}

/// A request as it will be sent upstream.
#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// The last response of a redirect chain together with the URL that produced it.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub final_url: Url,
    pub response: reqwest::Response,
}

impl UpstreamResponse {
    /// True if at least one redirect was followed.
    pub fn was_redirected(&self, requested: &Url) -> bool {
        self.final_url.as_str() != requested.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    jar: Arc<Jar>,
    max_redirects: usize,
}

impl UpstreamClient {
    /// Build a client with a fresh, empty cookie jar.
    pub fn new(max_redirects: usize) -> Result<Self, reqwest::Error> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .redirect(reqwest::redirect::Policy::none())
            .http1_only()
            .build()?;

        Ok(Self {
            http,
            jar,
            max_redirects,
        })
    }

    /// Cookies the jar would send to `url`, as a single `Cookie` header value.
    pub fn cookies_for(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }

    /// Send the request, following up to `max_redirects` redirects.
    pub async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let UpstreamRequest {
            mut method,
            mut url,
            mut headers,
            body,
        } = request;
        let mut body = Some(body);
        let mut stream_sent = false;
        let mut redirects = 0;

        loop {
            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .version(Version::HTTP_11)
                .headers(headers.clone());
            match body.take() {
                Some(RequestBody::Buffered(bytes)) => {
                    if !bytes.is_empty() {
                        builder = builder.body(bytes.clone());
                    }
                    body = Some(RequestBody::Buffered(bytes));
                }
                Some(RequestBody::Streamed(stream)) => {
                    builder = builder.body(stream);
                    stream_sent = true;
                }
                None => {}
            }

            let response = builder.send().await?;
            let status = response.status();

            let next = follow_status(status)
                .then(|| redirect_target(&url, response.headers()))
                .flatten();
            let Some(next) = next else {
                return Ok(UpstreamResponse {
                    final_url: url,
                    response,
                });
            };

            if redirects >= self.max_redirects {
                tracing::warn!(url = %url, redirects, "Redirect cap reached");
                return Err(UpstreamError::TooManyRedirects(redirects));
            }
            redirects += 1;

            if rewrites_to_get(status) && method != Method::GET && method != Method::HEAD {
                method = Method::GET;
                body = None;
                stream_sent = false;
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            } else if stream_sent {
                tracing::warn!(url = %url, status = %status, "Cannot replay streamed body");
                return Err(UpstreamError::BodyNotReplayable(status));
            }

            tracing::debug!(from = %url, to = %next, status = %status, "Following upstream redirect");
            url = next;
        }
    }
}

fn follow_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn rewrites_to_get(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
    )
}

fn redirect_target(current: &Url, headers: &HeaderMap) -> Option<Url> {
    let location = headers.get(LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}
