//! Agent onboarding: registration, liveness, locks and monitor lookup

use inframirror::model::AgentLock;
use pretty_assertions::assert_eq;
use reqwest::Method;
use serde_json::{Value, json};

use crate::helpers::spawn_hub;

#[tokio::test]
async fn test_register_creates_placement_once() {
    let hub = spawn_hub().await;

    let first = hub.register_agent("edge-fra-1", "eu-central", "fra-1").await;
    let second = hub.register_agent("edge-fra-2", "eu-central", "fra-1").await;

    assert_ne!(first.agent_id, second.agent_id);
    assert_ne!(first.api_key, second.api_key);
    assert!(first.api_key.starts_with("agent-"));
    assert_eq!(first.region, "eu-central");
    assert_eq!(first.datacenter, "fra-1");
    assert_eq!(first.status, "REGISTERED");

    for path in ["/api/regions", "/api/datacenters"] {
        let response = hub.admin(Method::GET, path).send().await.unwrap();
        assert_eq!(response.headers()["x-total-count"], "1", "{path}");
    }

    let agent: Value = hub
        .admin(Method::GET, &format!("/api/agents/{}", first.agent_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(agent["name"], "edge-fra-1");
    assert_eq!(agent["tags"]["region"], "eu-central");
    assert!(agent["regionId"].is_i64());
    assert!(agent["datacenterId"].is_i64());
}

#[tokio::test]
async fn test_register_requires_placement_tags() {
    let hub = spawn_hub().await;
    let key = hub.bootstrap_key().await;

    let response = hub
        .agent(Method::POST, "/api/agent/register", &key)
        .json(&json!({ "name": "lost", "tags": { "region": "eu-central" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(
        body["error"].as_str().unwrap().contains("Region and datacenter tags are required"),
        "{body}"
    );

    let agents = hub.admin(Method::GET, "/api/agents").send().await.unwrap();
    assert_eq!(agents.headers()["x-total-count"], "0");
}

#[tokio::test]
async fn test_register_rejects_unusable_placement() {
    let hub = spawn_hub().await;
    let key = hub.bootstrap_key().await;

    for (region, datacenter, field) in [
        ("asia-east", "東京", "datacenter"),
        ("r".repeat(80).as_str(), "tyo-1", "region"),
    ] {
        let response = hub
            .agent(Method::POST, "/api/agent/register", &key)
            .json(&json!({ "name": "tyo", "tags": { "region": region, "datacenter": datacenter } }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "{region}/{datacenter}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains(field), "{body}");
    }

    for path in ["/api/agents", "/api/regions", "/api/datacenters"] {
        let listed = hub.admin(Method::GET, path).send().await.unwrap();
        assert_eq!(listed.headers()["x-total-count"], "0", "{path}");
    }
}

#[tokio::test]
async fn test_agent_routes_require_a_valid_key() {
    let hub = spawn_hub().await;

    let missing = hub.http.post(hub.url("/api/agent/heartbeat")).send().await.unwrap();
    assert_eq!(missing.status(), 401);

    let bogus = hub
        .agent(Method::POST, "/api/agent/heartbeat", "agent-not-a-key")
        .send()
        .await
        .unwrap();
    assert_eq!(bogus.status(), 401);

    // the admin token is not an agent credential
    let admin = hub.admin(Method::POST, "/api/agent/heartbeat").send().await.unwrap();
    assert_eq!(admin.status(), 401);
}

#[tokio::test]
async fn test_heartbeat_marks_agent_online() {
    let hub = spawn_hub().await;
    let registration = hub.register_agent("edge-iad-1", "us-east", "iad-1").await;

    let before: Value = hub
        .admin(Method::GET, "/api/agents/_search?query=online")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before["total"], 0);

    let response = hub
        .agent(Method::POST, "/api/agent/heartbeat", &registration.api_key)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let agent: Value = response.json().await.unwrap();
    assert_eq!(agent["id"], registration.agent_id);
    assert_eq!(agent["status"], "ONLINE");
    assert!(agent["lastSeenAt"].is_string());

    // the status change is searchable
    let after: Value = hub
        .admin(Method::GET, "/api/agents/_search?query=online")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["total"], 1);
    assert_eq!(after["items"][0]["id"], registration.agent_id);
}

#[tokio::test]
async fn test_lock_is_exclusive_until_released() {
    let hub = spawn_hub().await;
    let registration = hub.register_agent("edge-sin-1", "ap-southeast", "sin-1").await;
    let key = registration.api_key.as_str();

    let acquired = hub
        .agent(Method::POST, "/api/agent/lock", key)
        .json(&json!({ "ttlSeconds": 60 }))
        .send()
        .await
        .unwrap();
    assert_eq!(acquired.status(), 200);
    let lock: AgentLock = acquired.json().await.unwrap();
    assert_eq!(lock.agent_id, registration.agent_id);
    assert_eq!((lock.expires_at - lock.acquired_at).num_seconds(), 60);

    let contended = hub.agent(Method::POST, "/api/agent/lock", key).send().await.unwrap();
    assert_eq!(contended.status(), 409);

    let released = hub.agent(Method::DELETE, "/api/agent/lock", key).send().await.unwrap();
    assert_eq!(released.status(), 204);

    let again = hub.agent(Method::DELETE, "/api/agent/lock", key).send().await.unwrap();
    assert_eq!(again.status(), 404);

    let reacquired = hub.agent(Method::POST, "/api/agent/lock", key).send().await.unwrap();
    assert_eq!(reacquired.status(), 200);
}

#[tokio::test]
async fn test_unbound_key_cannot_lock() {
    let hub = spawn_hub().await;
    let key = hub.bootstrap_key().await;

    let response = hub.agent(Method::POST, "/api/agent/lock", &key).send().await.unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_agent_sees_assigned_monitors() {
    let hub = spawn_hub().await;
    let registration = hub.register_agent("edge-gru-1", "sa-east", "gru-1").await;
    let key = registration.api_key.as_str();

    let assigned = hub
        .create("/api/http-monitors", json!({ "name": "Payments", "url": "https://pay.example.com" }))
        .await;
    hub.create("/api/http-monitors", json!({ "name": "Docs", "url": "https://docs.example.com" }))
        .await;
    hub.create(
        "/api/http-monitors",
        json!({ "name": "Legacy", "url": "https://old.example.com", "enabled": false }),
    )
    .await;

    let monitor_id = assigned["id"].as_i64().unwrap();
    hub.create(
        &format!("/api/http-monitors/{monitor_id}/agents"),
        json!({ "agentId": registration.agent_id }),
    )
    .await;

    let all: Vec<Value> = hub
        .agent(Method::GET, "/api/agent/http-monitors", key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let mine: Vec<Value> = hub
        .agent(
            Method::GET,
            &format!("/api/agent/http-monitors?agentId={}", registration.agent_id),
            key,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["name"], "Payments");

    let unassigned = hub
        .admin(
            Method::DELETE,
            &format!("/api/http-monitors/{monitor_id}/agents/{}", registration.agent_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(unassigned.status(), 204);

    let mine: Vec<Value> = hub
        .agent(
            Method::GET,
            &format!("/api/agent/http-monitors?agentId={}", registration.agent_id),
            key,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(mine.is_empty());
}

#[tokio::test]
async fn test_agent_creates_its_instance() {
    let hub = spawn_hub().await;
    let registration = hub.register_agent("edge-lhr-1", "eu-west", "lhr-1").await;

    let response = hub
        .agent(Method::POST, "/api/agent/instances", &registration.api_key)
        .json(&json!({
            "name": "edge-lhr-1",
            "hostname": "edge-lhr-1.local",
            "instanceType": "VM",
            "monitoringType": "AGENT",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let instance: Value = response.json().await.unwrap();
    assert_eq!(instance["agentId"], registration.agent_id);
}

#[tokio::test]
async fn test_deleting_agent_drops_its_key_from_search() {
    let hub = spawn_hub().await;
    let registration = hub.register_agent("edgenode", "eu-north", "arn-1").await;

    let search = |path: &'static str| {
        let request = hub.admin(Method::GET, path);
        async move { request.send().await.unwrap().json::<Value>().await.unwrap() }
    };
    assert_eq!(search("/api/api-keys/_search?query=edgenode").await["total"], 1);

    let deleted = hub
        .admin(Method::DELETE, &format!("/api/agents/{}", registration.agent_id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let keys = search("/api/api-keys/_search?query=edgenode").await;
    assert_eq!(keys["total"], 0);
    assert_eq!(keys["items"], json!([]));

    let hits = search("/api/api-keys/_search/highlight?query=edgenode").await;
    assert_eq!(hits["total"], 0);

    let rejected = hub
        .agent(Method::POST, "/api/agent/heartbeat", &registration.api_key)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 401);
}

#[tokio::test]
async fn test_malformed_lock_body_is_rejected() {
    let hub = spawn_hub().await;
    let registration = hub.register_agent("edge-lis-1", "eu-south", "lis-1").await;
    let key = registration.api_key.as_str();

    let malformed = hub
        .agent(Method::POST, "/api/agent/lock", key)
        .header("content-type", "application/json")
        .body("{ \"ttlSeconds\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);
    let body: Value = malformed.json().await.unwrap();
    assert!(body["error"].is_string());

    let negative = hub
        .agent(Method::POST, "/api/agent/lock", key)
        .json(&json!({ "ttlSeconds": -5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(negative.status(), 400);

    // nothing was acquired by the rejected requests
    let acquired = hub.agent(Method::POST, "/api/agent/lock", key).send().await.unwrap();
    assert_eq!(acquired.status(), 200);
}
