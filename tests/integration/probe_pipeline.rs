//! Agent-side probes reporting through the hub client into a live hub

use std::collections::HashMap;
use std::sync::Arc;

use inframirror::actors::HeartbeatSink;
use inframirror::actors::probe::{ProbeHandle, sync_probes};
use inframirror::actors::service_probe::ServiceProbeHandle;
use inframirror::client::HubClient;
use inframirror::model::{HttpMonitor, Id};
use reqwest::Method;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::spawn_hub;

async fn target() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_http_checks_land_in_hub_history() {
    let hub = spawn_hub().await;
    let server = target().await;
    let registration = hub.register_agent("edge-ams", "eu-west", "ams-1").await;

    let monitor = hub
        .create(
            "/api/http-monitors",
            json!({
                "name": "Target health",
                "url": format!("{}/health", server.uri()),
                "intervalSeconds": 3600,
                "retryCount": 0,
            }),
        )
        .await;
    let monitor_id = monitor["id"].as_i64().unwrap();

    let client = HubClient::new(&hub.url(""), registration.api_key.clone()).unwrap();
    let fetched: HttpMonitor = client.get_monitor(monitor_id).await.unwrap();
    assert_eq!(fetched.id, monitor_id);

    let sink: Arc<dyn HeartbeatSink> = Arc::new(client.clone());
    let probe = ProbeHandle::spawn(fetched, sink).unwrap();
    let heartbeat = probe.check_now().await.unwrap();
    assert!(heartbeat.sample.success);
    assert_eq!(heartbeat.sample.response_status_code, Some(200));
    probe.shutdown().await;

    let history: Value = hub
        .admin(Method::GET, &format!("/api/http-monitors/{monitor_id}/heartbeats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // the first interval tick also checks once
    let items = history["items"].as_array().unwrap();
    assert!(!items.is_empty());
    for item in items {
        assert_eq!(item["agentId"], registration.agent_id);
        assert_eq!(item["success"], true);
    }
}

#[tokio::test]
async fn test_sync_follows_the_hub_monitor_list() {
    let hub = spawn_hub().await;
    let server = target().await;
    let registration = hub.register_agent("edge-waw", "eu-central", "waw-1").await;

    let healthy = hub
        .create(
            "/api/http-monitors",
            json!({ "name": "Healthy", "url": format!("{}/health", server.uri()), "intervalSeconds": 3600 }),
        )
        .await;
    let broken = hub
        .create(
            "/api/http-monitors",
            json!({
                "name": "Broken",
                "url": format!("{}/broken", server.uri()),
                "intervalSeconds": 3600,
                "retryCount": 0,
            }),
        )
        .await;

    let client = HubClient::new(&hub.url(""), registration.api_key.clone()).unwrap();
    let sink: Arc<dyn HeartbeatSink> = Arc::new(client.clone());
    let mut probes: HashMap<Id, ProbeHandle> = HashMap::new();

    let first = sync_probes(&mut probes, client.list_monitors(None).await.unwrap(), &sink)
        .await
        .unwrap();
    assert_eq!(first.started, 2);

    let broken_id = broken["id"].as_i64().unwrap();
    let heartbeat = probes[&broken_id].check_now().await.unwrap();
    assert!(!heartbeat.sample.success);
    assert_eq!(heartbeat.sample.error_type.as_deref(), Some("UNEXPECTED_STATUS"));

    // disabling a monitor on the hub stops its check on the next pass
    let disabled = hub
        .admin(Method::PATCH, &format!("/api/http-monitors/{broken_id}"))
        .json(&json!({ "enabled": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(disabled.status(), 200);

    let second = sync_probes(&mut probes, client.list_monitors(None).await.unwrap(), &sink)
        .await
        .unwrap();
    assert_eq!(second.stopped, 1);
    assert_eq!(second.started, 0);
    assert!(probes.contains_key(&healthy["id"].as_i64().unwrap()));
    assert!(!probes.contains_key(&broken_id));

    for (_, probe) in probes.drain() {
        probe.shutdown().await;
    }
}

#[tokio::test]
async fn test_lock_round_trip_through_client() {
    let hub = spawn_hub().await;
    let registration = hub.register_agent("edge-mad", "eu-south", "mad-1").await;
    let client = HubClient::new(&hub.url(""), registration.api_key).unwrap();

    let lock = client.acquire_lock(Some(30)).await.unwrap().unwrap();
    assert_eq!(lock.agent_id, registration.agent_id);
    assert!(client.acquire_lock(Some(30)).await.unwrap().is_none());

    assert!(client.release_lock().await.unwrap());
    assert!(!client.release_lock().await.unwrap());

    let agent = client.heartbeat().await.unwrap();
    assert_eq!(agent.fields.status.as_deref(), Some("ONLINE"));
}

#[tokio::test]
async fn test_service_checks_reach_the_agents_instances() {
    let hub = spawn_hub().await;
    let registration = hub.register_agent("edge-lis", "eu-south", "lis-1").await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let instance = hub
        .create(
            "/api/instances",
            json!({
                "name": "cache-1",
                "hostname": "cache-1.internal",
                "instanceType": "VM",
                "monitoringType": "AGENT",
                "privateIpAddress": "127.0.0.1",
                "agentId": registration.agent_id,
            }),
        )
        .await;
    let service = hub
        .create(
            "/api/monitored-services",
            json!({
                "name": "Session cache",
                "serviceType": "REDIS",
                "environment": "PRODUCTION",
                "intervalSeconds": 3600,
                "retryCount": 0,
            }),
        )
        .await;
    let service_id = service["id"].as_i64().unwrap();
    let service_instance = hub
        .create(
            "/api/service-instances",
            json!({
                "monitoredServiceId": service_id,
                "instanceId": instance["id"],
                "port": port,
            }),
        )
        .await;

    let client = HubClient::new(&hub.url(""), registration.api_key.clone()).unwrap();
    let targets = client.list_service_targets().await.unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].address(), format!("127.0.0.1:{port}"));
    assert_eq!(targets[0].service_instance_id, service_instance["id"].as_i64().unwrap());

    let sink: Arc<dyn HeartbeatSink> = Arc::new(client.clone());
    let check = ServiceProbeHandle::spawn(targets[0].clone(), sink);
    let heartbeat = check.check_now().await.unwrap();
    assert!(heartbeat.sample.success);
    assert_eq!(heartbeat.sample.status, "UP");
    check.shutdown().await;

    let history: Value = hub
        .admin(Method::GET, &format!("/api/monitored-services/{service_id}/heartbeats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = history["items"].as_array().unwrap();
    assert!(!items.is_empty());
    for item in items {
        assert_eq!(item["serviceInstanceId"], service_instance["id"]);
        assert_eq!(item["agentId"], registration.agent_id);
    }

    // another agent sees none of them
    let other = hub.register_agent("edge-opo", "eu-south", "opo-1").await;
    let other_client = HubClient::new(&hub.url(""), other.api_key).unwrap();
    assert!(other_client.list_service_targets().await.unwrap().is_empty());
}
