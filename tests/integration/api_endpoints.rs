//! Admin and public endpoints over real HTTP

use std::time::Duration;

use futures::StreamExt;
use inframirror::model::{HttpSample, NewHttpHeartbeat};
use pretty_assertions::assert_eq;
use reqwest::Method;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};

use crate::helpers::{ADMIN_TOKEN, spawn_hub};

#[tokio::test]
async fn test_health_is_public() {
    let hub = spawn_hub().await;

    let response = hub.http.get(hub.url("/api/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_admin_routes_require_the_token() {
    let hub = spawn_hub().await;

    let missing = hub.http.get(hub.url("/api/regions")).send().await.unwrap();
    assert_eq!(missing.status(), 401);
    let body: Value = missing.json().await.unwrap();
    assert!(body["error"].is_string());

    let wrong = hub
        .http
        .get(hub.url("/api/regions"))
        .bearer_auth("not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 403);

    let ok = hub.admin(Method::GET, "/api/regions").send().await.unwrap();
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn test_region_crud() {
    let hub = spawn_hub().await;

    let created = hub
        .create("/api/regions", json!({ "name": "Oregon", "regionCode": "us-west-2" }))
        .await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["name"], "Oregon");

    hub.create("/api/regions", json!({ "name": "Virginia" })).await;

    let list = hub.admin(Method::GET, "/api/regions?page=0&size=1").send().await.unwrap();
    assert_eq!(list.status(), 200);
    assert_eq!(list.headers()["x-total-count"], "2");
    let page: Value = list.json().await.unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["total"], 2);

    let patched: Value = hub
        .admin(Method::PATCH, &format!("/api/regions/{id}"))
        .json(&json!({ "groupName": "americas" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(patched["groupName"], "americas");
    assert_eq!(patched["regionCode"], "us-west-2");

    let replaced: Value = hub
        .admin(Method::PUT, &format!("/api/regions/{id}"))
        .json(&json!({ "id": id, "name": "Oregon West" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(replaced["name"], "Oregon West");
    assert!(replaced["regionCode"].is_null());

    let deleted = hub.admin(Method::DELETE, &format!("/api/regions/{id}")).send().await.unwrap();
    assert_eq!(deleted.status(), 204);

    let gone = hub.admin(Method::GET, &format!("/api/regions/{id}")).send().await.unwrap();
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let hub = spawn_hub().await;

    let created = hub.create("/api/regions", json!({ "name": "Sydney" })).await;
    let id = created["id"].as_i64().unwrap();

    let mismatched = hub
        .admin(Method::PUT, &format!("/api/regions/{id}"))
        .json(&json!({ "id": id + 1, "name": "Sydney" }))
        .send()
        .await
        .unwrap();
    assert_eq!(mismatched.status(), 400);

    let blank = hub
        .admin(Method::POST, "/api/regions")
        .json(&json!({ "name": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), 400);

    let malformed = hub
        .admin(Method::POST, "/api/regions")
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);

    let unknown = hub.admin(Method::DELETE, "/api/regions/9999").send().await.unwrap();
    assert_eq!(unknown.status(), 404);
}

#[tokio::test]
async fn test_bad_query_strings_get_json_errors() {
    let hub = spawn_hub().await;

    for path in [
        "/api/regions?page=abc",
        "/api/regions/_search?query=eu&size=-1",
        "/api/audit-trails?page=x",
    ] {
        let response = hub.admin(Method::GET, path).send().await.unwrap();
        assert_eq!(response.status(), 400, "{path}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string(), "{path}");
    }
}

#[tokio::test]
async fn test_search_follows_writes() {
    let hub = spawn_hub().await;

    let monitor = hub
        .create(
            "/api/http-monitors",
            json!({ "name": "Checkout API", "url": "https://shop.example.com/checkout" }),
        )
        .await;
    hub.create(
        "/api/http-monitors",
        json!({ "name": "Marketing site", "url": "https://www.example.com" }),
    )
    .await;

    let found: Value = hub
        .admin(Method::GET, "/api/http-monitors/_search?query=checkout")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["total"], 1);
    assert_eq!(found["items"][0]["id"], monitor["id"]);

    let prefix: Value = hub
        .admin(Method::GET, "/api/http-monitors/_search/prefix?query=mark")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prefix["total"], 1);
    assert_eq!(prefix["items"][0]["name"], "Marketing site");

    let highlighted: Value = hub
        .admin(Method::GET, "/api/http-monitors/_search/highlight?query=checkout")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let snippet = highlighted["items"][0]["highlight"].as_str().unwrap_or_default();
    assert!(snippet.contains("<mark>"), "snippet was {snippet:?}");

    let id = monitor["id"].as_i64().unwrap();
    hub.admin(Method::DELETE, &format!("/api/http-monitors/{id}"))
        .send()
        .await
        .unwrap();

    let after: Value = hub
        .admin(Method::GET, "/api/http-monitors/_search?query=checkout")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["total"], 0);
}

#[tokio::test]
async fn test_api_keys_are_issued_once_and_audited() {
    let hub = spawn_hub().await;

    let issued = hub.create("/api/api-keys", json!({ "name": "ci-runner" })).await;
    let plaintext = issued["apiKey"].as_str().unwrap();
    assert!(plaintext.starts_with("imk_"));
    let id = issued["id"].as_i64().unwrap();

    let fetched: Value = hub
        .admin(Method::GET, &format!("/api/api-keys/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(fetched.get("apiKey").is_none());
    assert!(!fetched.to_string().contains(plaintext));

    let deactivated = hub
        .admin(Method::PUT, &format!("/api/api-keys/{id}/deactivate"))
        .send()
        .await
        .unwrap();
    assert_eq!(deactivated.status(), 200);

    let rejected = hub
        .agent(Method::POST, "/api/agent/heartbeat", plaintext)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 401);

    let trail = hub.admin(Method::GET, "/api/audit-trails").send().await.unwrap();
    assert_eq!(trail.status(), 200);
    let trail: Value = trail.json().await.unwrap();
    assert!(trail["total"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn test_stats_counts_rows() {
    let hub = spawn_hub().await;
    hub.create("/api/regions", json!({ "name": "Tokyo" })).await;

    let stats: Value = hub
        .admin(Method::GET, "/api/stats")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["storage"]["regions"], 1);
    assert_eq!(stats["streamSubscribers"], 0);
    assert!(stats["retention"].is_null());
}

#[tokio::test]
async fn test_stream_delivers_accepted_heartbeats() {
    let hub = spawn_hub().await;
    let monitor = hub
        .create("/api/http-monitors", json!({ "name": "Status", "url": "https://status.example.com" }))
        .await;
    let monitor_id = monitor["id"].as_i64().unwrap();

    let mut request = format!("ws://{}/api/stream", hub.addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {ADMIN_TOKEN}").parse().unwrap());
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    // the subscription starts once the upgrade completes
    for _ in 0..50 {
        if hub.services.heartbeats.subscriber_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut sample = HttpSample::new(monitor_id, true);
    sample.response_time_ms = Some(87);
    hub.services
        .heartbeats
        .submit_http_heartbeat(NewHttpHeartbeat { executed_at: None, sample }, None)
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("no frame within 5s")
        .unwrap()
        .unwrap();
    let text = match frame {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {other:?}"),
    };
    let event: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["type"], "http");
    assert_eq!(event["monitorId"], monitor_id);
    assert_eq!(event["responseTimeMs"], 87);
}
