//! Shared utilities for integration tests: a mock origin and a running proxy.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{any, get},
    Router,
};
use gopee::codec;
use gopee::config::ProxyConfig;
use gopee::http::home::HomePage;
use gopee::session::SessionStore;
use gopee::{HttpServer, Shutdown};
use tokio::net::TcpListener;

/// Start an axum app on an ephemeral port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A pretend website exercising every path through the proxy.
pub fn origin() -> Router {
    Router::new()
        .route(
            "/a/page.html",
            get(|| async {
                (
                    [
                        (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                        (header::CONTENT_SECURITY_POLICY, "default-src 'self'"),
                    ],
                    r##"<html><body><a href="b.html">b</a> <a href="#top">top</a> <img src="/img/logo.png"></body></html>"##,
                )
            }),
        )
        .route(
            "/css/site.css",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/css")],
                    r#"body{background:url("../img/bg.png")}"#,
                )
            }),
        )
        .route(
            "/bin",
            get(|| async { ([(header::CONTENT_TYPE, "application/octet-stream")], vec![0u8, 159, 146, 150, 255]) }),
        )
        .route(
            "/set",
            get(|| async { ([(header::SET_COOKIE, "upstream_sid=42; Path=/")], "set") }),
        )
        .route(
            "/echo-cookie",
            get(|headers: HeaderMap| async move {
                headers
                    .get(header::COOKIE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string()
            }),
        )
        .route(
            "/headers",
            any(|headers: HeaderMap| async move {
                let mut names: Vec<_> = headers.keys().map(|k| k.as_str().to_string()).collect();
                names.sort();
                (
                    [
                        (header::CONNECTION, "keep-alive"),
                        (header::CONTENT_SECURITY_POLICY, "default-src 'none'"),
                        (header::HeaderName::from_static("x-upstream"), "yes"),
                    ],
                    names.join(","),
                )
            }),
        )
        .route("/redirect", get(|| async { Redirect::to("/target") }))
        .route("/target", get(|| async { "target body" }))
        .route("/loop", get(|| async { Redirect::to("/loop") }))
        .route(
            "/auth-redirect",
            get(|| async { Redirect::temporary("/auth-check") }),
        )
        .route(
            "/auth-check",
            get(|headers: HeaderMap| async move {
                match headers.get(header::AUTHORIZATION) {
                    Some(_) => (StatusCode::OK, "authorized").into_response(),
                    None => (StatusCode::UNAUTHORIZED, "missing").into_response(),
                }
            }),
        )
        .route(
            "/app/api/items",
            get(|uri: axum::http::Uri| async move { format!("items:{}", uri.query().unwrap_or("")) }),
        )
}

/// Start the proxy with `config` on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let (addr, shutdown, _) = start_proxy_with_store(config).await;
    (addr, shutdown)
}

/// Like [`start_proxy`], also handing back the live session store.
pub async fn start_proxy_with_store(mut config: ProxyConfig) -> (SocketAddr, Shutdown, Arc<SessionStore>) {
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;

    let listener = TcpListener::bind(config.listener.bind_address()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, HomePage::builtin());
    let sessions = server.sessions();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown, sessions)
}

/// A browser that never follows redirects and keeps no cookies of its own.
pub fn browser() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Proxy URL for an absolute target.
pub fn proxied(proxy: SocketAddr, target: &str) -> String {
    format!("http://{}/{}", proxy, codec::encode(target.as_bytes()))
}

/// Root-relative proxy path for an absolute target.
pub fn proxy_path(target: &str) -> String {
    format!("/{}", codec::encode(target.as_bytes()))
}

/// The `name=value` pair of a `Set-Cookie` header for `name`, as sent.
#[allow(dead_code)]
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .map(|v| v.split(';').next().unwrap_or(v).to_string())
}
