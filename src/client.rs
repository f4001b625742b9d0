//! HTTP client for the hub's agent API
//!
//! Every call carries `X-API-Key`. Error responses are turned into
//! `anyhow` errors that include the hub's `{ "error": ... }` message.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};

use crate::actors::HeartbeatSink;
use crate::model::{
    Agent, AgentLock, HttpMonitor, Id, Instance, NewHttpHeartbeat, NewInstance, NewInstanceHeartbeat,
    NewServiceHeartbeat, ServiceTarget,
};
use crate::services::{RegisterAgent, RegistrationResponse};

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Clone)]
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HubClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("inframirror-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Same hub, different key
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        Err(anyhow!("hub answered {status}: {message}"))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        trace!("POST {}", path);
        let response = self
            .client
            .post(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        trace!("GET {}", path);
        let response = self
            .client
            .get(self.url(path))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;

        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip_all, fields(name = %request.name))]
    pub async fn register(&self, request: &RegisterAgent) -> Result<RegistrationResponse> {
        let response: RegistrationResponse = self.post("/api/agent/register", request).await?;
        debug!("registered as agent {}", response.agent_id);
        Ok(response)
    }

    pub async fn heartbeat(&self) -> Result<Agent> {
        self.post("/api/agent/heartbeat", &serde_json::json!({})).await
    }

    pub async fn create_instance(&self, instance: &NewInstance) -> Result<Instance> {
        self.post("/api/agent/instances", instance).await
    }

    /// Monitors assigned to `agent_id`, or every enabled monitor
    pub async fn list_monitors(&self, agent_id: Option<Id>) -> Result<Vec<HttpMonitor>> {
        match agent_id {
            Some(id) => self.get(&format!("/api/agent/http-monitors?agentId={id}")).await,
            None => self.get("/api/agent/http-monitors").await,
        }
    }

    pub async fn get_monitor(&self, id: Id) -> Result<HttpMonitor> {
        self.get(&format!("/api/agent/http-monitors/{id}")).await
    }

    /// Service instances on this agent's instances
    pub async fn list_service_targets(&self) -> Result<Vec<ServiceTarget>> {
        self.get("/api/agent/service-targets").await
    }

    /// `None` when another holder has the lock
    pub async fn acquire_lock(&self, ttl_seconds: Option<u64>) -> Result<Option<AgentLock>> {
        let response = self
            .client
            .post(self.url("/api/agent/lock"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&serde_json::json!({ "ttlSeconds": ttl_seconds }))
            .send()
            .await
            .context("POST /api/agent/lock failed")?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(None);
        }
        Ok(Some(Self::check(response).await?.json().await?))
    }

    /// Whether a lock was held
    pub async fn release_lock(&self) -> Result<bool> {
        let response = self
            .client
            .delete(self.url("/api/agent/lock"))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .context("DELETE /api/agent/lock failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }
}

#[async_trait]
impl HeartbeatSink for HubClient {
    async fn submit_http(&self, heartbeat: NewHttpHeartbeat) -> Result<()> {
        let _: serde_json::Value = self.post("/api/agent/http-heartbeats", &heartbeat).await?;
        Ok(())
    }

    async fn submit_instance(&self, heartbeat: NewInstanceHeartbeat) -> Result<()> {
        let _: serde_json::Value = self.post("/api/agent/instance-heartbeats", &heartbeat).await?;
        Ok(())
    }

    async fn submit_service(&self, heartbeat: NewServiceHeartbeat) -> Result<()> {
        let _: serde_json::Value = self.post("/api/agent/service-heartbeats", &heartbeat).await?;
        Ok(())
    }

    async fn agent_heartbeat(&self) -> Result<()> {
        self.heartbeat().await.map(|_| ())
    }
}
