//! Session issuance, reuse and isolation through the running proxy.

use std::collections::HashSet;

use axum::http::header;
use cookie::Cookie;
use gopee::config::ProxyConfig;

mod common;

#[tokio::test]
async fn test_requests_without_cookie_get_distinct_sessions() {
    let origin = common::serve(common::origin()).await;
    let (proxy, shutdown) = common::start_proxy(ProxyConfig::default()).await;
    let client = common::browser();
    let url = common::proxied(proxy, &format!("http://{}/target", origin));

    let first = client.get(&url).send().await.unwrap();
    let second = client.get(&url).send().await.unwrap();

    let a = common::set_cookie(&first, "gopee").unwrap();
    let b = common::set_cookie(&second, "gopee").unwrap();
    assert_ne!(a, b);

    let raw = first
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .find(|v| v.starts_with("gopee="))
        .unwrap();
    assert!(raw.contains("Path=/"));
    assert!(raw.contains("HttpOnly"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_session_cookie_reuses_upstream_jar() {
    let origin = common::serve(common::origin()).await;
    let (proxy, shutdown) = common::start_proxy(ProxyConfig::default()).await;
    let client = common::browser();

    let set = client
        .get(common::proxied(proxy, &format!("http://{}/set", origin)))
        .send()
        .await
        .unwrap();
    let session = common::set_cookie(&set, "gopee").unwrap();
    // the upstream cookie stays in the session jar
    assert!(common::set_cookie(&set, "upstream_sid").is_none());

    let echo = client
        .get(common::proxied(proxy, &format!("http://{}/echo-cookie", origin)))
        .header(header::COOKIE, &session)
        .send()
        .await
        .unwrap();
    assert!(common::set_cookie(&echo, "gopee").is_none(), "live session is reused");
    assert_eq!(echo.text().await.unwrap(), "upstream_sid=42");

    // a different browser does not see it
    let other = client
        .get(common::proxied(proxy, &format!("http://{}/echo-cookie", origin)))
        .send()
        .await
        .unwrap();
    assert_eq!(other.text().await.unwrap(), "none");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_session_cookie_is_replaced() {
    let origin = common::serve(common::origin()).await;
    let (proxy, shutdown) = common::start_proxy(ProxyConfig::default()).await;
    let client = common::browser();

    let res = client
        .get(common::proxied(proxy, &format!("http://{}/target", origin)))
        .header(header::COOKIE, "gopee=expired-or-forged")
        .send()
        .await
        .unwrap();
    let issued = common::set_cookie(&res, "gopee").unwrap();
    assert_ne!(issued, "gopee=expired-or-forged");

    shutdown.trigger();
}

#[tokio::test]
async fn test_concurrent_browsers() {
    let origin = common::serve(common::origin()).await;
    let (proxy, shutdown) = common::start_proxy(ProxyConfig::default()).await;
    let client = common::browser();
    let url = common::proxied(proxy, &format!("http://{}/target", origin));

    let concurrency = 20;
    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let first = client.get(&url).send().await.unwrap();
            let session = common::set_cookie(&first, "gopee").unwrap();
            for _ in 0..5 {
                let res = client
                    .get(&url)
                    .header(header::COOKIE, &session)
                    .send()
                    .await
                    .unwrap();
                assert!(res.status().is_success());
                assert!(common::set_cookie(&res, "gopee").is_none());
            }
            session
        }));
    }

    let mut sessions = HashSet::new();
    for task in tasks {
        sessions.insert(task.await.unwrap());
    }
    assert_eq!(sessions.len(), concurrency);

    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_cookies_stay_in_their_own_jar() {
    let origin = common::serve(common::origin()).await;
    let (proxy, shutdown, sessions) = common::start_proxy_with_store(ProxyConfig::default()).await;
    let client = common::browser();
    let origin_url = url::Url::parse(&format!("http://{}/echo-cookie", origin)).unwrap();

    let with_cookie = client
        .get(common::proxied(proxy, &format!("http://{}/set", origin)))
        .send()
        .await
        .unwrap();
    let without_cookie = client
        .get(common::proxied(proxy, &format!("http://{}/target", origin)))
        .send()
        .await
        .unwrap();

    let session_id = |res: &reqwest::Response| {
        let pair = common::set_cookie(res, "gopee").unwrap();
        Cookie::parse_encoded(pair).unwrap().value().to_string()
    };
    let a = sessions.get(&session_id(&with_cookie)).unwrap();
    let b = sessions.get(&session_id(&without_cookie)).unwrap();

    let jar_a = a.cookies_for(&origin_url).unwrap();
    assert_eq!(jar_a.to_str().unwrap(), "upstream_sid=42");
    assert!(b.cookies_for(&origin_url).is_none());

    shutdown.trigger();
}
