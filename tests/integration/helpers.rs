//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use inframirror::storage::SqliteBackend;
use tempfile::TempDir;

/// A fresh database in its own temp directory
pub async fn temp_backend() -> (TempDir, Arc<SqliteBackend>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let backend = SqliteBackend::new(temp_dir.path().join("hub.db")).await.unwrap();
    (temp_dir, Arc::new(backend))
}

#[cfg(feature = "api")]
pub use hub::*;

#[cfg(feature = "api")]
mod hub {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use inframirror::api::{ApiConfig, ApiState, spawn_api_server};
    use inframirror::model::{Actor, IssueApiKey, StatusThresholds};
    use inframirror::services::{RegisterAgent, RegistrationResponse, Services};
    use inframirror::storage::SqliteBackend;
    use reqwest::{Method, RequestBuilder};
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    pub const ADMIN_TOKEN: &str = "test-admin-token";

    /// A hub served on a random port
    pub struct TestHub {
        pub addr: SocketAddr,
        pub storage: Arc<SqliteBackend>,
        pub services: Services,
        pub http: reqwest::Client,
        _dir: TempDir,
    }

    pub async fn spawn_hub() -> TestHub {
        let (dir, storage) = super::temp_backend().await;
        let (events, _) = broadcast::channel(256);
        let services = Services::new(storage.clone(), events, StatusThresholds::default());

        let state = ApiState::new(services.clone(), Some(ADMIN_TOKEN.to_string()));
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            admin_token: Some(ADMIN_TOKEN.to_string()),
            ..Default::default()
        };
        let addr = spawn_api_server(config, state).await.unwrap();

        TestHub {
            addr,
            storage,
            services,
            http: reqwest::Client::new(),
            _dir: dir,
        }
    }

    impl TestHub {
        pub fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        /// Request with the admin bearer token
        pub fn admin(&self, method: Method, path: &str) -> RequestBuilder {
            self.http
                .request(method, self.url(path))
                .bearer_auth(ADMIN_TOKEN)
        }

        /// Request with an agent API key
        pub fn agent(&self, method: Method, path: &str, key: &str) -> RequestBuilder {
            self.http.request(method, self.url(path)).header("X-API-Key", key)
        }

        /// A fresh admin-issued key usable for registration
        pub async fn bootstrap_key(&self) -> String {
            let issued = self
                .services
                .credentials
                .issue(
                    IssueApiKey {
                        name: "bootstrap".to_string(),
                        description: None,
                        expires_at: None,
                    },
                    &Actor::named("test"),
                )
                .await
                .unwrap();
            issued.api_key
        }

        pub async fn register_agent(&self, name: &str, region: &str, datacenter: &str) -> RegistrationResponse {
            let key = self.bootstrap_key().await;
            let request = RegisterAgent {
                name: name.to_string(),
                hostname: Some(format!("{name}.local")),
                ip_address: None,
                os_type: Some("Linux".to_string()),
                os_version: None,
                agent_version: Some("test".to_string()),
                tags: [
                    ("region".to_string(), region.to_string()),
                    ("datacenter".to_string(), datacenter.to_string()),
                ]
                .into_iter()
                .collect(),
            };

            let response = self
                .agent(Method::POST, "/api/agent/register", &key)
                .json(&request)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 201);
            response.json().await.unwrap()
        }

        /// POST as admin, asserting 201, returning the body
        pub async fn create(&self, path: &str, body: Value) -> Value {
            let response = self.admin(Method::POST, path).json(&body).send().await.unwrap();
            assert_eq!(response.status(), 201, "creating {path}");
            response.json().await.unwrap()
        }
    }
}
