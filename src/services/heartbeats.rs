//! Heartbeat ingestion and history
//!
//! Every accepted sample is published on the hub's broadcast channel after
//! it is stored. Subscribers that fall behind skip events.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

use super::error::{ServiceError, ServiceResult};
use crate::model::{
    AGENT_STATUS_ONLINE, Agent, ApiKey, Entity, HeartbeatEvent, HeartbeatType, HttpHeartbeat, HttpMonitor, Id, Instance,
    InstanceHeartbeat, MonitoredService, NewHttpHeartbeat, NewInstanceHeartbeat, NewServiceHeartbeat, Page,
    PageRequest, ServiceHeartbeat, ServiceInstance, Validate,
};
use crate::storage::{HeartbeatStore, Repository, SearchIndex, SqliteBackend, TopologyStore};

#[derive(Clone)]
pub struct HeartbeatService {
    storage: Arc<SqliteBackend>,
    events: broadcast::Sender<HeartbeatEvent>,
}

impl HeartbeatService {
    pub fn new(storage: Arc<SqliteBackend>, events: broadcast::Sender<HeartbeatEvent>) -> Self {
        Self { storage, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HeartbeatEvent> {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn publish(&self, event: HeartbeatEvent) {
        if self.events.send(event).is_err() {
            trace!("no heartbeat subscribers");
        }
    }

    async fn require<E>(&self, id: Id) -> ServiceResult<E>
    where
        E: crate::model::Entity,
        SqliteBackend: Repository<E>,
    {
        Repository::<E>::get(&*self.storage, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(E::NAME, id))
    }

    /// Marks the key's agent as online
    #[instrument(skip_all, fields(key_id = key.id))]
    pub async fn agent_heartbeat(&self, key: &ApiKey) -> ServiceResult<Agent> {
        let agent_id = key
            .agent_id
            .ok_or_else(|| ServiceError::Forbidden("API key is not bound to an agent".to_string()))?;

        let now = Utc::now();
        let agent = self
            .storage
            .touch_agent(agent_id, AGENT_STATUS_ONLINE, now)
            .await?
            .ok_or_else(|| ServiceError::not_found("Agent", agent_id))?;
        if let Some(document) = agent.search_document() {
            self.storage.index_document(&document).await?;
        }

        self.publish(HeartbeatEvent::AgentSeen { agent_id, seen_at: now });
        Ok(agent)
    }

    #[instrument(skip_all, fields(instance_id = heartbeat.sample.instance_id))]
    pub async fn submit_instance_heartbeat(
        &self,
        mut heartbeat: NewInstanceHeartbeat,
        agent_id: Option<Id>,
    ) -> ServiceResult<InstanceHeartbeat> {
        heartbeat.validate()?;
        let _: Instance = self.require(heartbeat.sample.instance_id).await?;

        heartbeat.executed_at.get_or_insert_with(Utc::now);
        if agent_id.is_some() {
            heartbeat.sample.agent_id = agent_id;
        }

        let stored = self.storage.insert_instance_heartbeat(heartbeat).await?;
        debug!("accepted {} heartbeat {}", stored.sample.heartbeat_type, stored.id);

        self.publish(HeartbeatEvent::Instance(stored.clone()));
        Ok(stored)
    }

    /// Missing thresholds are copied from the monitor
    #[instrument(skip_all, fields(monitor_id = heartbeat.sample.monitor_id))]
    pub async fn submit_http_heartbeat(
        &self,
        mut heartbeat: NewHttpHeartbeat,
        agent_id: Option<Id>,
    ) -> ServiceResult<HttpHeartbeat> {
        heartbeat.validate()?;
        let monitor: HttpMonitor = self.require(heartbeat.sample.monitor_id).await?;

        heartbeat.executed_at.get_or_insert_with(Utc::now);
        if agent_id.is_some() {
            heartbeat.sample.agent_id = agent_id;
        }
        let sample = &mut heartbeat.sample;
        sample.warning_threshold_ms = sample
            .warning_threshold_ms
            .or(monitor.fields.response_time_warning_ms);
        sample.critical_threshold_ms = sample
            .critical_threshold_ms
            .or(monitor.fields.response_time_critical_ms);

        let stored = self.storage.insert_http_heartbeat(heartbeat).await?;
        self.publish(HeartbeatEvent::Http(stored.clone()));
        Ok(stored)
    }

    #[instrument(skip_all, fields(service_id = heartbeat.sample.monitored_service_id))]
    pub async fn submit_service_heartbeat(
        &self,
        mut heartbeat: NewServiceHeartbeat,
        agent_id: Option<Id>,
    ) -> ServiceResult<ServiceHeartbeat> {
        heartbeat.validate()?;
        let service_id = heartbeat.sample.monitored_service_id;
        let _: MonitoredService = self.require(service_id).await?;
        if let Some(instance_id) = heartbeat.sample.service_instance_id {
            let instance: ServiceInstance = self.require(instance_id).await?;
            if instance.fields.monitored_service_id != service_id {
                return Err(ServiceError::invalid(
                    "serviceInstanceId",
                    format!("service instance {instance_id} does not belong to service {service_id}"),
                ));
            }
        }

        heartbeat.executed_at.get_or_insert_with(Utc::now);
        if agent_id.is_some() {
            heartbeat.sample.agent_id = agent_id;
        }

        let stored = self.storage.insert_service_heartbeat(heartbeat).await?;
        self.publish(HeartbeatEvent::Service(stored.clone()));
        Ok(stored)
    }

    pub async fn instance_history(
        &self,
        instance_id: Id,
        heartbeat_type: Option<HeartbeatType>,
        page: PageRequest,
    ) -> ServiceResult<Page<InstanceHeartbeat>> {
        let _: Instance = self.require(instance_id).await?;
        Ok(self
            .storage
            .list_instance_heartbeats(instance_id, heartbeat_type, page)
            .await?)
    }

    pub async fn http_history(&self, monitor_id: Id, page: PageRequest) -> ServiceResult<Page<HttpHeartbeat>> {
        let _: HttpMonitor = self.require(monitor_id).await?;
        Ok(self.storage.list_http_heartbeats(monitor_id, page).await?)
    }

    pub async fn service_history(&self, service_id: Id, page: PageRequest) -> ServiceResult<Page<ServiceHeartbeat>> {
        let _: MonitoredService = self.require(service_id).await?;
        Ok(self.storage.list_service_heartbeats(service_id, page).await?)
    }
}
