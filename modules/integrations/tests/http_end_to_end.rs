#![allow(clippy::unwrap_used)]

mod common;

use common::params;
use httpmock::MockServer;
use integrations::{IntegrationKind, IntegrationStatus, build_manager};
use serde_json::json;

#[tokio::test]
async fn rest_get_sends_api_key_as_query_parameter() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::GET)
            .path("/v1/orders")
            .query_param("status", "open")
            .query_param("api_key", "k-123");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"orders": [1, 2]}));
    });

    let config = json!({
        "base_url": format!("{}/v1/", server.base_url()),
        "auth": {
            "type": "api_key",
            "key": "k-123",
            "key_name": "api_key",
            "in_header": false,
            "in_query": true
        }
    });
    let manager = build_manager(IntegrationKind::RestApi, &config).unwrap();

    let result = manager
        .execute_action("get", &params(json!({"path": "orders", "params": {"status": "open"}})))
        .await;

    mock.assert();
    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "HTTP 200: OK");
    assert_eq!(result.output.unwrap()["data"], json!({"orders": [1, 2]}));
}

#[tokio::test]
async fn rest_post_sends_json_with_basic_auth() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST)
            .path("/items")
            .header("authorization", "Basic YWRtaW46czNjcmV0")
            .header("content-type", "application/json")
            .json_body(json!({"name": "widget", "qty": 3}));
        then.status(201).body("created");
    });

    let config = json!({
        "base_url": server.base_url(),
        "auth": {"type": "basic", "username": "admin", "password": "s3cret"}
    });
    let manager = build_manager(IntegrationKind::RestApi, &config).unwrap();

    let result = manager
        .execute_action(
            "post",
            &params(json!({"path": "/items", "json": {"name": "widget", "qty": 3}})),
        )
        .await;

    mock.assert();
    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "HTTP 201: Created");
    assert_eq!(result.output.unwrap()["data"], json!("created"));
}

#[tokio::test]
async fn rest_test_connection_against_a_live_server() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/health");
        then.status(204);
    });

    let config = json!({"base_url": format!("{}/health", server.base_url())});
    let manager = build_manager(IntegrationKind::RestApi, &config).unwrap();

    let result = manager.test_connection().await;

    mock.assert();
    assert!(result.success, "{result:?}");
    assert_eq!(result.message, "Connection successful: 204 No Content");
    assert_eq!(manager.status().status, IntegrationStatus::Connected);
}

#[tokio::test]
async fn slack_manager_can_target_a_custom_endpoint() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(httpmock::Method::POST)
            .path("/api/chat.postMessage")
            .header("authorization", "Bearer xoxb-local")
            .json_body(json!({"channel": "C1", "text": "hi"}));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"ok": true, "ts": "1.0"}));
    });

    let config = json!({
        "bot_token": "xoxb-local",
        "base_url": format!("{}/api/", server.base_url())
    });
    let manager = build_manager(IntegrationKind::Slack, &config).unwrap();

    let result = manager
        .execute_action("post_message", &params(json!({"channel": "C1", "text": "hi"})))
        .await;

    mock.assert();
    assert!(result.success, "{result:?}");
    assert_eq!(result.output.unwrap()["ts"], json!("1.0"));
}
