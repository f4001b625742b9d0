//! Public status pages built from agent heartbeats

use pretty_assertions::assert_eq;
use reqwest::Method;
use serde_json::{Value, json};

use crate::helpers::{TestHub, spawn_hub};

async fn report(hub: &TestHub, key: &str, monitor_id: i64, success: bool, response_time_ms: i32) {
    let status_code = if success { 200 } else { 503 };
    let response = hub
        .agent(Method::POST, "/api/agent/http-heartbeats", key)
        .json(&json!({
            "monitorId": monitor_id,
            "success": success,
            "responseTimeMs": response_time_ms,
            "responseStatusCode": status_code,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_public_view_groups_health_per_agent() {
    let hub = spawn_hub().await;
    let fra = hub.register_agent("edge-fra", "eu-central", "fra-1").await;
    let iad = hub.register_agent("edge-iad", "us-east", "iad-1").await;

    let monitor = hub
        .create("/api/http-monitors", json!({ "name": "Storefront", "url": "https://shop.example.com" }))
        .await;
    let monitor_id = monitor["id"].as_i64().unwrap();

    let page = hub
        .create(
            "/api/status-pages",
            json!({ "name": "Shop status", "slug": "shop", "isPublic": true }),
        )
        .await;
    let page_id = page["id"].as_i64().unwrap();
    hub.create(
        &format!("/api/status-pages/{page_id}/items"),
        json!({ "itemType": "HTTP_MONITOR", "itemId": monitor_id, "displayOrder": 1 }),
    )
    .await;

    let settings = hub
        .admin(Method::PUT, &format!("/api/status-pages/{page_id}/settings"))
        .json(&json!({ "headerText": "All systems", "showResponseTimes": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(settings.status(), 200);

    for _ in 0..4 {
        report(&hub, &fra.api_key, monitor_id, true, 120).await;
    }
    report(&hub, &iad.api_key, monitor_id, true, 150).await;
    for _ in 0..3 {
        report(&hub, &iad.api_key, monitor_id, false, 3000).await;
    }

    // no credentials on the public route
    let response = hub.http.get(hub.url("/public/status/shop")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let view: Value = response.json().await.unwrap();

    assert_eq!(view["name"], "Shop status");
    assert_eq!(view["headerText"], "All systems");
    assert_eq!(view["showResponseTimes"], false);
    assert_eq!(view["regions"], json!(["edge-fra", "edge-iad"]));

    let health = &view["monitors"][0]["regionHealth"];
    assert_eq!(view["monitors"][0]["monitorName"], "Storefront");
    assert_eq!(health["edge-fra"]["status"], "UP");
    assert_eq!(health["edge-fra"]["successRate"], 100);
    assert_eq!(health["edge-fra"]["responseTimeMs"], 120);
    assert_eq!(health["edge-iad"]["status"], "DOWN");
    assert_eq!(health["edge-iad"]["successRate"], 25);
}

#[tokio::test]
async fn test_slow_responses_degrade_status() {
    let hub = spawn_hub().await;
    let agent = hub.register_agent("edge-syd", "ap-southeast", "syd-1").await;

    let monitor = hub
        .create(
            "/api/http-monitors",
            json!({ "name": "Search", "url": "https://search.example.com", "responseTimeWarningMs": 200 }),
        )
        .await;
    let monitor_id = monitor["id"].as_i64().unwrap();
    let page = hub
        .create("/api/status-pages", json!({ "name": "Search", "slug": "search", "isPublic": true }))
        .await;
    hub.create(
        &format!("/api/status-pages/{}/items", page["id"]),
        json!({ "itemType": "HTTP", "itemId": monitor_id }),
    )
    .await;

    for _ in 0..3 {
        report(&hub, &agent.api_key, monitor_id, true, 400).await;
    }

    let view: Value = hub
        .http
        .get(hub.url("/public/status/search"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["monitors"][0]["regionHealth"]["edge-syd"]["status"], "WARNING");
}

#[tokio::test]
async fn test_private_and_unknown_pages() {
    let hub = spawn_hub().await;
    hub.create(
        "/api/status-pages",
        json!({ "name": "Internal", "slug": "internal", "isPublic": false }),
    )
    .await;

    let private = hub.http.get(hub.url("/public/status/internal")).send().await.unwrap();
    assert_eq!(private.status(), 403);

    let missing = hub.http.get(hub.url("/public/status/nope")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_items_must_reference_existing_targets() {
    let hub = spawn_hub().await;
    let page = hub
        .create("/api/status-pages", json!({ "name": "Ops", "slug": "ops", "isPublic": true }))
        .await;

    let response = hub
        .admin(Method::POST, &format!("/api/status-pages/{}/items", page["id"]))
        .json(&json!({ "itemType": "HTTP_MONITOR", "itemId": 4242 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let items: Vec<Value> = hub
        .admin(Method::GET, &format!("/api/status-pages/{}/items", page["id"]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(items.is_empty());
}
