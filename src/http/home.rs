//! Home page and the "enter a URL" form.

use std::path::Path;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    response::{Html, IntoResponse, Response},
};
use url::{form_urlencoded, Url};

use crate::http::response::redirect_to_token;
use crate::http::server::AppState;

const BUILTIN_HOME: &str = include_str!("../../templates/home.html");

/// The home page, loaded once at startup.
#[derive(Debug, Clone)]
pub struct HomePage {
    html: String,
}

impl HomePage {
    /// Load from `path`, or use the built-in page when no path is given.
    pub fn load(path: Option<&Path>) -> std::io::Result<Self> {
        match path {
            Some(path) => Ok(Self {
                html: std::fs::read_to_string(path)?,
            }),
            None => Ok(Self::builtin()),
        }
    }

    pub fn builtin() -> Self {
        Self {
            html: BUILTIN_HOME.to_string(),
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

/// `GET/POST /`: redirect to the proxied form of `url` if given, else show the page.
pub async fn home_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let mut entered = parts
        .uri
        .query()
        .and_then(|q| form_value(q.as_bytes(), "url"));

    if parts.method == Method::POST {
        match axum::body::to_bytes(body, state.max_body_size).await {
            Ok(bytes) => {
                if let Some(value) = form_value(&bytes, "url") {
                    entered = Some(value);
                }
            }
            Err(e) => tracing::debug!(error = %e, "Unreadable home form body"),
        }
    }

    match entered.as_deref().and_then(normalize_entered_url) {
        Some(url) => {
            tracing::info!(url = %url, "Starting proxied browsing");
            redirect_to_token(&url)
        }
        None => Html(state.home.html().to_string()).into_response(),
    }
}

/// First non-empty value of `name` in an urlencoded form.
pub fn form_value(form: &[u8], name: &str) -> Option<String> {
    form_urlencoded::parse(form)
        .find(|(k, v)| k == name && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

/// Turn what a user typed into an absolute URL, defaulting the scheme to http.
pub fn normalize_entered_url(input: &str) -> Option<Url> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let candidate = if input.contains("://") {
        input.to_string()
    } else if let Some(rest) = input.strip_prefix("//") {
        format!("http://{}", rest)
    } else {
        format!("http://{}", input)
    };
    Url::parse(&candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_entered_url() {
        assert_eq!(normalize_entered_url("example.com").unwrap().as_str(), "http://example.com/");
        assert_eq!(
            normalize_entered_url("  https://example.com/a?b=1 ").unwrap().as_str(),
            "https://example.com/a?b=1"
        );
        assert_eq!(
            normalize_entered_url("example.com:8080/x").unwrap().as_str(),
            "http://example.com:8080/x"
        );
        assert_eq!(normalize_entered_url("//cdn.test/").unwrap().as_str(), "http://cdn.test/");
        assert!(normalize_entered_url("   ").is_none());
        assert!(normalize_entered_url("http://").is_none());
    }

    #[test]
    fn test_form_value() {
        assert_eq!(form_value(b"a=1&url=http%3A%2F%2Fx.test%2F", "url").as_deref(), Some("http://x.test/"));
        assert_eq!(form_value(b"url=&url=x.test", "url").as_deref(), Some("x.test"));
        assert!(form_value(b"other=1", "url").is_none());
    }

    #[test]
    fn test_builtin_home_has_form() {
        let home = HomePage::load(None).unwrap();
        assert!(home.html().contains(r#"name="url""#));
    }
}
