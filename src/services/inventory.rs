//! Generic CRUD and search over the inventory entities

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use super::audit::{AuditService, snapshot};
use super::error::{ServiceError, ServiceResult};
use super::search_page;
use crate::model::{
    Actor, AgentMonitor, AssignMonitor, AuditAction, Entity, HttpMonitor, Id, Page, PageRequest, Patchable,
    ServiceTarget, Validate, WithId,
};
use crate::search::{SearchHit, SearchMode, SearchQuery};
use crate::storage::{Repository, SearchIndex, SqliteBackend, TopologyStore};

#[derive(Clone)]
pub struct InventoryService {
    storage: Arc<SqliteBackend>,
    audit: AuditService,
}

impl InventoryService {
    pub fn new(storage: Arc<SqliteBackend>, audit: AuditService) -> Self {
        Self { storage, audit }
    }

    async fn index<E: Entity>(&self, entity: &E) -> ServiceResult<()> {
        if let Some(document) = entity.search_document() {
            self.storage.index_document(&document).await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(entity = E::NAME))]
    pub async fn create<E>(&self, fields: E::Fields, actor: &Actor) -> ServiceResult<E>
    where
        E: Entity,
        SqliteBackend: Repository<E>,
    {
        fields.validate()?;

        let entity: E = self.storage.insert(fields).await?;
        self.index(&entity).await?;
        self.audit
            .record(AuditAction::Create, E::NAME, entity.id(), None, snapshot(&entity), actor)
            .await?;

        debug!("created {} {}", E::NAME, entity.id());
        Ok(entity)
    }

    pub async fn get<E>(&self, id: Id) -> ServiceResult<E>
    where
        E: Entity,
        SqliteBackend: Repository<E>,
    {
        Repository::<E>::get(&*self.storage, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(E::NAME, id))
    }

    pub async fn list<E>(&self, page: PageRequest) -> ServiceResult<Page<E>>
    where
        E: Entity,
        SqliteBackend: Repository<E>,
    {
        Ok(Repository::<E>::list(&*self.storage, page).await?)
    }

    /// Full replace; a body id must match the path id
    #[instrument(skip_all, fields(entity = E::NAME, id = id))]
    pub async fn replace<E>(&self, id: Id, body: WithId<E::Fields>, actor: &Actor) -> ServiceResult<E>
    where
        E: Entity,
        SqliteBackend: Repository<E>,
    {
        if body.id.is_some_and(|body_id| body_id != id) {
            return Err(ServiceError::invalid("id", "does not match the path id"));
        }
        body.fields.validate()?;

        let existing: E = self.get(id).await?;
        let mut changed = existing.clone();
        *changed.fields_mut() = body.fields;

        self.store_update(existing, changed, actor).await
    }

    #[instrument(skip_all, fields(entity = E::NAME, id = id))]
    pub async fn patch<E>(
        &self,
        id: Id,
        patch: <E::Fields as Patchable>::Patch,
        actor: &Actor,
    ) -> ServiceResult<E>
    where
        E: Entity,
        SqliteBackend: Repository<E>,
    {
        patch.validate()?;

        let existing: E = self.get(id).await?;
        let mut changed = existing.clone();
        changed.apply(patch);
        changed.fields().validate()?;

        self.store_update(existing, changed, actor).await
    }

    async fn store_update<E>(&self, existing: E, changed: E, actor: &Actor) -> ServiceResult<E>
    where
        E: Entity,
        SqliteBackend: Repository<E>,
    {
        let updated = self.storage.update(&changed).await?;
        self.index(&updated).await?;
        self.audit
            .record(
                AuditAction::Update,
                E::NAME,
                updated.id(),
                snapshot(&existing),
                snapshot(&updated),
                actor,
            )
            .await?;
        Ok(updated)
    }

    #[instrument(skip_all, fields(entity = E::NAME, id = id))]
    pub async fn delete<E>(&self, id: Id, actor: &Actor) -> ServiceResult<()>
    where
        E: Entity,
        SqliteBackend: Repository<E>,
    {
        let existing: E = self.get(id).await?;
        if !Repository::<E>::delete(&*self.storage, id).await? {
            return Err(ServiceError::not_found(E::NAME, id));
        }

        if let Some(kind) = E::SEARCH_KIND {
            self.storage.remove_document(kind, id).await?;
        }
        self.audit
            .record(AuditAction::Delete, E::NAME, id, snapshot(&existing), None, actor)
            .await?;

        debug!("deleted {} {}", E::NAME, id);
        Ok(())
    }

    /// An empty full-text query lists every record in id order; empty prefix
    /// and fuzzy queries match nothing
    pub async fn search<E>(&self, raw: &str, mode: SearchMode, page: PageRequest) -> ServiceResult<Page<E>>
    where
        E: Entity,
        SqliteBackend: Repository<E>,
    {
        let query = SearchQuery::parse(raw)?;
        if query.is_empty() && mode == SearchMode::FullText {
            return self.list(page).await;
        }
        let Some(kind) = E::SEARCH_KIND else {
            return Ok(Page::empty(page));
        };

        let hits = self.storage.search(kind, &query, mode, page).await?;
        let ids: Vec<Id> = hits.items.iter().map(|h| h.id).collect();
        let records = Repository::<E>::get_many(&*self.storage, &ids).await?;
        Ok(search_page(hits, records))
    }

    pub async fn search_highlight<E: Entity>(&self, raw: &str, page: PageRequest) -> ServiceResult<Page<SearchHit>> {
        let query = SearchQuery::parse(raw)?;
        match E::SEARCH_KIND {
            Some(kind) => Ok(self.storage.search_highlight(kind, &query, page).await?),
            None => Ok(Page::empty(page)),
        }
    }

    // ------------------------------------------------------------------------
    // Monitor assignments
    // ------------------------------------------------------------------------

    #[instrument(skip(self, request, actor), fields(agent_id = request.agent_id))]
    pub async fn assign_monitor(
        &self,
        monitor_id: Id,
        request: AssignMonitor,
        actor: &Actor,
    ) -> ServiceResult<AgentMonitor> {
        let _: HttpMonitor = self.get(monitor_id).await?;

        let assignment = self
            .storage
            .assign_monitor(monitor_id, request.agent_id, request.active, &actor.name, Utc::now())
            .await?;
        self.audit
            .record(
                AuditAction::Create,
                "AgentMonitor",
                assignment.id,
                None,
                snapshot(&assignment),
                actor,
            )
            .await?;
        Ok(assignment)
    }

    pub async fn unassign_monitor(&self, monitor_id: Id, agent_id: Id, actor: &Actor) -> ServiceResult<()> {
        if !self.storage.unassign_monitor(monitor_id, agent_id).await? {
            return Err(ServiceError::NotFound(format!(
                "agent {agent_id} is not assigned to monitor {monitor_id}"
            )));
        }
        self.audit
            .record(AuditAction::Delete, "AgentMonitor", monitor_id, None, None, actor)
            .await?;
        Ok(())
    }

    pub async fn list_monitor_assignments(&self, monitor_id: Id) -> ServiceResult<Vec<AgentMonitor>> {
        let _: HttpMonitor = self.get(monitor_id).await?;
        Ok(self.storage.list_monitor_assignments(monitor_id).await?)
    }

    /// Monitors assigned to the agent, or every enabled monitor without one
    pub async fn monitors_for_agent(&self, agent_id: Option<Id>) -> ServiceResult<Vec<HttpMonitor>> {
        match agent_id {
            Some(agent_id) => Ok(self.storage.list_monitors_for_agent(agent_id).await?),
            None => Ok(self.storage.list_enabled_monitors().await?),
        }
    }

    /// Service instances the agent should check, resolved to addresses
    pub async fn service_targets(&self, agent_id: Id) -> ServiceResult<Vec<ServiceTarget>> {
        Ok(self.storage.list_service_targets(agent_id).await?)
    }
}
