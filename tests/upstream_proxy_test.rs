mod common;

use axum::{
    body::Body,
    http::{Method, StatusCode},
};
use claims::assert_none;
use common::{TestApp, session_token, test_config};
use edge_gateway::infrastructure::config::RuntimeMode;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const HOUR: i64 = 60 * 60;

fn proxied_app(upstream_url: &str) -> TestApp {
    let mut config = test_config(RuntimeMode::Development);
    config.server.upstream_url = Some(upstream_url.to_string());
    TestApp::new(config)
}

#[tokio::test]
async fn public_page_is_proxied_and_hardened() {
    let frontend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-frame-options", "SAMEORIGIN")
                .set_body_string("<html><body>About</body></html>"),
        )
        .expect(1)
        .mount(&frontend)
        .await;

    let app = proxied_app(&frontend.uri());
    let response = app.get("/about").await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.body, "<html><body>About</body></html>");
    response.assert_hardened();
    assert_eq!(response.header("pragma"), Some("no-cache"));
}

#[tokio::test]
async fn authenticated_identity_is_forwarded() {
    let frontend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_string("dashboard"))
        .mount(&frontend)
        .await;

    let app = proxied_app(&frontend.uri());
    let token = session_token("user-42", &["analyst", "editor"], 0, HOUR);
    let response = app.get_json("/dashboard?tab=overview", Some(&token)).await;

    response.assert_status(StatusCode::OK);

    let received = frontend.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let forwarded = &received[0];
    assert_eq!(forwarded.url.query(), Some("tab=overview"));
    assert_eq!(forwarded.headers.get("x-user-id").unwrap(), "user-42");
    assert_eq!(forwarded.headers.get("x-user-roles").unwrap(), r#"["analyst","editor"]"#);
}

#[tokio::test]
async fn forged_identity_headers_are_stripped() {
    let frontend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&frontend)
        .await;

    let app = proxied_app(&frontend.uri());
    let request = TestApp::request(Method::GET, "/about")
        .header("x-user-id", "admin")
        .header("x-user-roles", r#"["admin"]"#)
        .body(Body::empty())
        .unwrap();
    app.send(request).await.assert_status(StatusCode::OK);

    let received = frontend.received_requests().await.unwrap();
    assert_none!(received[0].headers.get("x-user-id"));
    assert_none!(received[0].headers.get("x-user-roles"));
}

#[tokio::test]
async fn inspected_body_is_forwarded_intact() {
    let frontend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/data"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .mount(&frontend)
        .await;

    let app = proxied_app(&frontend.uri());
    let token = session_token("user-9", &["editor"], 0, HOUR);
    let payload = json!({"name": "Quarterly report", "tags": ["finance", "q3"]});
    let request = TestApp::request(Method::POST, "/api/v1/data")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(payload.to_string()))
        .unwrap();

    let response = app.send(request).await;

    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json()["id"], 7);
    assert_eq!(response.header("x-ratelimit-limit"), Some("100"));

    let received = frontend.received_requests().await.unwrap();
    let forwarded: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(forwarded, payload);
}

#[tokio::test]
async fn rejected_requests_never_reach_upstream() {
    let frontend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&frontend)
        .await;

    let app = proxied_app(&frontend.uri());

    app.get_json("/dashboard", None).await.assert_status(StatusCode::UNAUTHORIZED);
    app.get("/about?q=%3Cscript%3E").await.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    // Nothing listens on the discard port
    let app = proxied_app("http://127.0.0.1:9");
    let response = app.get("/about").await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body = response.json();
    assert_eq!(body["error"], "Bad Gateway");
    assert_eq!(body["code"], "UPSTREAM_ERROR");
    response.assert_hardened();
}

#[tokio::test]
async fn production_hides_dev_routes_from_upstream() {
    let frontend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&frontend)
        .await;

    let mut config = test_config(RuntimeMode::Production);
    config.server.upstream_url = Some(frontend.uri());
    let app = TestApp::new(config);

    let response = app.get("/storybook").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert!(response.body.is_empty());
}
