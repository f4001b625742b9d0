//! Storage traits
//!
//! `StorageBackend` covers maintenance (health, stats, retention).
//! `Repository<E>` is the generic CRUD surface of the inventory entities and
//! the remaining traits group the specialised queries the services need.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::error::StorageResult;
use crate::model::{
    Agent, AgentLock, AgentMonitor, ApiKey, AuditTrail, Datacenter, Entity, HeartbeatSample, HeartbeatType,
    HttpHeartbeat, HttpMonitor, Id, InstanceHeartbeat, NewAgent, NewApiKey, NewAuditTrail,
    NewHttpHeartbeat, NewInstanceHeartbeat, NewServiceHeartbeat, NewStatusDependency,
    NewStatusPageItem, Page, PageRequest, Region, ServiceHeartbeat, ServiceTarget, StatusDependency, StatusPage,
    StatusPageItem, StatusPageSettings,
};
use crate::search::{SearchDocument, SearchHit, SearchKind, SearchMode, SearchQuery};

/// Health status of the storage backend
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Row counts and file size reported by `/api/stats`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub regions: i64,
    pub datacenters: i64,
    pub agents: i64,
    pub instances: i64,
    pub http_monitors: i64,
    pub monitored_services: i64,
    pub status_pages: i64,
    pub instance_heartbeats: i64,
    pub http_heartbeats: i64,
    pub service_heartbeats: i64,
    pub oldest_heartbeat: Option<DateTime<Utc>>,
    pub newest_heartbeat: Option<DateTime<Utc>>,
    pub file_size_bytes: u64,
}

/// Maintenance surface of a storage backend
///
/// Implementations must be `Send + Sync` as they are shared between the
/// API handlers and the retention actor.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Delete heartbeats of every kind executed before `before`
    ///
    /// Returns the number of rows deleted.
    async fn cleanup_heartbeats(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Lightweight liveness probe
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    async fn get_stats(&self) -> StorageResult<StorageStats>;

    /// Close the backend, flushing pending writes
    async fn close(&self) -> StorageResult<()>;
}

/// CRUD over one inventory entity
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn insert(&self, fields: E::Fields) -> StorageResult<E>;

    async fn get(&self, id: Id) -> StorageResult<Option<E>>;

    /// Records in id order
    async fn list(&self, page: PageRequest) -> StorageResult<Page<E>>;

    /// Records for `ids`, in the order given; unknown ids are skipped
    async fn get_many(&self, ids: &[Id]) -> StorageResult<Vec<E>>;

    /// Full replace; `StorageError::NotFound` when the id is unknown
    async fn update(&self, entity: &E) -> StorageResult<E>;

    async fn delete(&self, id: Id) -> StorageResult<bool>;
}

/// Everything registration writes, resolved to rows in one transaction
#[derive(Debug, Clone)]
pub struct Registration {
    pub region: Region,
    pub datacenter: Datacenter,
    pub agent: Agent,
    pub api_key: ApiKey,
}

#[async_trait]
pub trait TopologyStore: Send + Sync {
    async fn find_region_by_name(&self, name: &str) -> StorageResult<Option<Region>>;

    async fn find_datacenter_by_name_and_region(
        &self,
        name: &str,
        region_id: Id,
    ) -> StorageResult<Option<Datacenter>>;

    /// Finds or creates the region and datacenter, then creates the agent
    /// and its key
    async fn register_agent(
        &self,
        region_name: &str,
        datacenter_name: &str,
        agent: NewAgent,
        api_key: NewApiKey,
    ) -> StorageResult<Registration>;

    /// Sets `last_seen_at` and the status; `None` when the agent is unknown
    async fn touch_agent(&self, id: Id, status: &str, now: DateTime<Utc>) -> StorageResult<Option<Agent>>;

    async fn assign_monitor(
        &self,
        monitor_id: Id,
        agent_id: Id,
        active: bool,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<AgentMonitor>;

    async fn unassign_monitor(&self, monitor_id: Id, agent_id: Id) -> StorageResult<bool>;

    async fn list_monitor_assignments(&self, monitor_id: Id) -> StorageResult<Vec<AgentMonitor>>;

    /// Enabled monitors with an active assignment to `agent_id`
    async fn list_monitors_for_agent(&self, agent_id: Id) -> StorageResult<Vec<HttpMonitor>>;

    async fn list_enabled_monitors(&self) -> StorageResult<Vec<HttpMonitor>>;

    /// Active service instances on the agent's instances whose service is
    /// active and monitored
    async fn list_service_targets(&self, agent_id: Id) -> StorageResult<Vec<ServiceTarget>>;
}

#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Insert and stamp `instance.last_ping_at` or
    /// `instance.last_hardware_check_at` in one transaction
    async fn insert_instance_heartbeat(
        &self,
        heartbeat: NewInstanceHeartbeat,
    ) -> StorageResult<InstanceHeartbeat>;

    async fn insert_http_heartbeat(&self, heartbeat: NewHttpHeartbeat) -> StorageResult<HttpHeartbeat>;

    async fn insert_service_heartbeat(
        &self,
        heartbeat: NewServiceHeartbeat,
    ) -> StorageResult<ServiceHeartbeat>;

    /// Newest first
    async fn list_instance_heartbeats(
        &self,
        instance_id: Id,
        heartbeat_type: Option<HeartbeatType>,
        page: PageRequest,
    ) -> StorageResult<Page<InstanceHeartbeat>>;

    async fn list_http_heartbeats(&self, monitor_id: Id, page: PageRequest) -> StorageResult<Page<HttpHeartbeat>>;

    async fn list_service_heartbeats(
        &self,
        service_id: Id,
        page: PageRequest,
    ) -> StorageResult<Page<ServiceHeartbeat>>;

    /// The newest `sample_size` HTTP heartbeats per (monitor, agent) pair,
    /// skipping heartbeats without an agent
    async fn latest_http_heartbeats(
        &self,
        monitor_ids: &[Id],
        sample_size: u32,
    ) -> StorageResult<Vec<HeartbeatSample>>;
}

#[async_trait]
pub trait StatusPageStore: Send + Sync {
    async fn find_status_page_by_slug(&self, slug: &str) -> StorageResult<Option<StatusPage>>;

    /// Ordered by `display_order` ascending, then id
    async fn list_status_page_items(&self, page_id: Id) -> StorageResult<Vec<StatusPageItem>>;

    async fn insert_status_page_item(
        &self,
        page_id: Id,
        item: NewStatusPageItem,
        now: DateTime<Utc>,
    ) -> StorageResult<StatusPageItem>;

    async fn delete_status_page_item(&self, id: Id) -> StorageResult<bool>;

    async fn list_status_dependencies(&self, page_id: Id) -> StorageResult<Vec<StatusDependency>>;

    async fn insert_status_dependency(
        &self,
        page_id: Id,
        dependency: NewStatusDependency,
        now: DateTime<Utc>,
    ) -> StorageResult<StatusDependency>;

    async fn delete_status_dependency(&self, id: Id) -> StorageResult<bool>;

    async fn get_status_page_settings(&self, page_id: Id) -> StorageResult<Option<StatusPageSettings>>;

    async fn upsert_status_page_settings(
        &self,
        settings: StatusPageSettings,
    ) -> StorageResult<StatusPageSettings>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert_api_key(&self, key: NewApiKey) -> StorageResult<ApiKey>;

    async fn get_api_key(&self, id: Id) -> StorageResult<Option<ApiKey>>;

    async fn get_api_keys(&self, ids: &[Id]) -> StorageResult<Vec<ApiKey>>;

    async fn list_api_keys(&self, page: PageRequest) -> StorageResult<Page<ApiKey>>;

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StorageResult<Option<ApiKey>>;

    async fn mark_api_key_used(&self, id: Id, now: DateTime<Utc>) -> StorageResult<()>;

    async fn deactivate_api_key(
        &self,
        id: Id,
        modified_by: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ApiKey>>;

    async fn delete_api_key(&self, id: Id) -> StorageResult<bool>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit_trail(&self, entry: NewAuditTrail) -> StorageResult<AuditTrail>;

    async fn get_audit_trail(&self, id: Id) -> StorageResult<Option<AuditTrail>>;

    async fn get_audit_trails(&self, ids: &[Id]) -> StorageResult<Vec<AuditTrail>>;

    /// Newest first
    async fn list_audit_trails(&self, page: PageRequest) -> StorageResult<Page<AuditTrail>>;
}

#[async_trait]
pub trait LockStore: Send + Sync {
    /// `StorageError::Conflict` while an unexpired lock for the agent exists
    async fn acquire_agent_lock(
        &self,
        agent_id: Id,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<AgentLock>;

    async fn release_agent_lock(&self, agent_id: Id) -> StorageResult<bool>;
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Replace the document stored for `(kind, entity_id)`
    async fn index_document(&self, document: &SearchDocument) -> StorageResult<()>;

    async fn remove_document(&self, kind: SearchKind, entity_id: Id) -> StorageResult<()>;

    /// Ranked hits without highlights; an empty query yields an empty page
    async fn search(
        &self,
        kind: SearchKind,
        query: &SearchQuery,
        mode: SearchMode,
        page: PageRequest,
    ) -> StorageResult<Page<SearchHit>>;

    /// Full text hits carrying a `<mark>` snippet
    async fn search_highlight(
        &self,
        kind: SearchKind,
        query: &SearchQuery,
        page: PageRequest,
    ) -> StorageResult<Page<SearchHit>>;
}
