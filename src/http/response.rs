//! Response helpers shared by the home and proxy handlers.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use url::Url;

use crate::codec;

/// Proxy path for an absolute URL: `/` followed by its token.
pub fn proxy_path(url: &Url) -> String {
    format!("/{}", codec::encode_url(url))
}

/// A 302 to the proxy path of `url`.
pub fn redirect_to_token(url: &Url) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(location) = HeaderValue::from_str(&proxy_path(url)) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

/// Append a `Set-Cookie` header. Values that are not valid header text are dropped.
pub fn append_set_cookie(response: &mut Response<Body>, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Dropping unrepresentable cookie"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_to_token() {
        let url = Url::parse("http://x.test/b").unwrap();
        let response = redirect_to_token(&url);
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert_eq!(codec::decode(location.trim_start_matches('/')).unwrap(), url);
    }

    #[test]
    fn test_append_set_cookie_keeps_existing() {
        let mut response = Response::new(Body::empty());
        append_set_cookie(&mut response, "a=1; Path=/");
        append_set_cookie(&mut response, "b=2; Path=/");
        assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }
}
