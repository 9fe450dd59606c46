//! End-to-end admission tests against a real listener.

use reqwest::header::{COOKIE, HOST, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

use camp_gate::config::RateLimitRule;

mod common;

const ALPHA: &str = "alpha.example.org";
const BRAVO: &str = "bravo.example.org";

/// Fetch a CSRF token the way a browser would: from the first response.
async fn csrf_token(gate: &common::TestGate, host: &str) -> String {
    let res = gate
        .client
        .get(gate.url("/"))
        .header(HOST, host)
        .send()
        .await
        .unwrap();
    common::set_cookie_value(&res, "csrf_token").expect("csrf cookie on first contact")
}

async fn login(gate: &common::TestGate, host: &str, email: &str, csrf: &str) -> reqwest::Response {
    gate.client
        .post(gate.url("/auth/login"))
        .header(HOST, host)
        .header(COOKIE, format!("csrf_token={csrf}"))
        .form(&[("email", email), ("password", common::PASSWORD), ("csrf_token", csrf)])
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_login_session_logout_flow() {
    let gate = common::start_gate(common::base_config(), common::seeded_directory()).await;

    // Anonymous request: 401, but the CSRF cookie is handed out.
    let csrf = csrf_token(&gate, ALPHA).await;
    assert_eq!(csrf.len(), 43);

    let res = login(&gate, ALPHA, "owner@example.org", &csrf).await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = common::set_cookie_value(&res, "stinky_token").unwrap();

    let cookies = format!("stinky_token={token}; csrf_token={csrf}");
    let res = gate
        .client
        .get(gate.url("/api/session"))
        .header(HOST, ALPHA)
        .header(COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["tenant"]["subdomain"], "alpha");
    assert_eq!(json["user"]["email"], "owner@example.org");

    // Logout without echoing the CSRF token is refused.
    let res = gate
        .client
        .post(gate.url("/auth/logout"))
        .header(HOST, ALPHA)
        .header(COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = gate
        .client
        .post(gate.url("/auth/logout"))
        .header(HOST, ALPHA)
        .header(COOKIE, &cookies)
        .header("x-csrf-token", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(common::set_cookie_value(&res, "stinky_token").as_deref(), Some(""));

    gate.shutdown.trigger();
}

#[tokio::test]
async fn test_editor_isolated_to_their_tenant() {
    let gate = common::start_gate(common::base_config(), common::seeded_directory()).await;

    // The editor of bravo cannot even log in on alpha.
    let csrf = csrf_token(&gate, ALPHA).await;
    let res = login(&gate, ALPHA, "editor@example.org", &csrf).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = login(&gate, BRAVO, "editor@example.org", &csrf).await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = common::set_cookie_value(&res, "stinky_token").unwrap();

    // A bravo session presented to alpha, directly or via override, is refused.
    let res = gate
        .client
        .get(gate.url("/"))
        .header(HOST, ALPHA)
        .header(COOKIE, format!("stinky_token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = gate
        .client
        .get(gate.url("/api/session?site_id=1"))
        .header(HOST, BRAVO)
        .header(COOKIE, format!("stinky_token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn test_login_rate_limited() {
    let mut config = common::base_config();
    config.rate_limit.rules = vec![RateLimitRule {
        name: "login".into(),
        path_prefix: "/auth/login".into(),
        capacity: 2,
        interval_secs: 60,
    }];
    let gate = common::start_gate(config, common::seeded_directory()).await;
    let csrf = csrf_token(&gate, ALPHA).await;

    for remaining in ["1", "0"] {
        let res = login(&gate, ALPHA, "owner@example.org", &csrf).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-limit"], "2");
        assert_eq!(res.headers()["x-ratelimit-remaining"], remaining);
    }

    let res = login(&gate, ALPHA, "owner@example.org", &csrf).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()[RETRY_AFTER], "60");

    // Other clients have their own bucket.
    let res = gate
        .client
        .post(gate.url("/auth/login"))
        .header(HOST, ALPHA)
        .header("x-forwarded-for", "198.51.100.20")
        .header(COOKIE, format!("csrf_token={csrf}"))
        .form(&[("email", "owner@example.org"), ("password", common::PASSWORD), ("csrf_token", csrf.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_tenant_and_allowlist() {
    let gate = common::start_gate(common::base_config(), common::seeded_directory()).await;

    let res = gate
        .client
        .get(gate.url("/"))
        .header(HOST, "ghost.example.org")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let from = |ip: &'static str| {
        gate.client
            .post(gate.url("/auth/login"))
            .header(HOST, "charlie.example.org")
            .header("x-forwarded-for", ip)
            .header(COOKIE, "csrf_token=t")
            .header("x-csrf-token", "t")
            .send()
    };

    let res = from("192.168.1.1").await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Inside the allowlist admission passes and the login handler rejects
    // the empty body.
    let res = from("10.0.0.100").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn test_blocklist_hot_reload_and_shutdown() {
    let gate = common::start_gate(common::base_config(), common::seeded_directory()).await;
    let probe = || {
        gate.client
            .get(gate.url("/_gate/health"))
            .header("x-forwarded-for", "203.0.113.50")
            .send()
    };

    assert_eq!(probe().await.unwrap().status(), StatusCode::OK);

    let mut reloaded = common::base_config();
    reloaded.ip_filter.global_blocklist = vec!["203.0.113.0/24".into()];
    gate.config_tx.send(reloaded).unwrap();

    let mut blocked = false;
    for _ in 0..50 {
        if probe().await.unwrap().status() == StatusCode::FORBIDDEN {
            blocked = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(blocked, "reloaded blocklist never applied");

    gate.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), gate.handle).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}
