use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use super::error::{ServiceError, ServiceResult};
use super::search_page;
use crate::model::{Actor, AuditAction, AuditTrail, Id, NewAuditTrail, Page, PageRequest};
use crate::search::{SearchHit, SearchKind, SearchMode, SearchQuery};
use crate::storage::{AuditStore, SearchIndex, SqliteBackend};

/// JSON snapshot of a record for the audit trail
pub fn snapshot<T: Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("failed to snapshot record for audit: {}", e);
            None
        }
    }
}

#[derive(Clone)]
pub struct AuditService {
    storage: Arc<SqliteBackend>,
}

impl AuditService {
    pub fn new(storage: Arc<SqliteBackend>) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, old_value, new_value, actor), fields(actor = %actor.name))]
    pub async fn record(
        &self,
        action: AuditAction,
        entity_name: &str,
        entity_id: Id,
        old_value: Option<Value>,
        new_value: Option<Value>,
        actor: &Actor,
    ) -> ServiceResult<AuditTrail> {
        let entry = self
            .storage
            .insert_audit_trail(NewAuditTrail {
                action: action.to_string(),
                entity_name: entity_name.to_string(),
                entity_id,
                old_value,
                new_value,
                timestamp: Utc::now(),
                performed_by: actor.name.clone(),
                ip_address: actor.ip_address.clone(),
                user_agent: actor.user_agent.clone(),
            })
            .await?;

        self.storage.index_document(&entry.search_document()).await?;
        Ok(entry)
    }

    pub async fn get(&self, id: Id) -> ServiceResult<AuditTrail> {
        self.storage
            .get_audit_trail(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("AuditTrail", id))
    }

    pub async fn list(&self, page: PageRequest) -> ServiceResult<Page<AuditTrail>> {
        Ok(self.storage.list_audit_trails(page).await?)
    }

    pub async fn search(&self, raw: &str, mode: SearchMode, page: PageRequest) -> ServiceResult<Page<AuditTrail>> {
        let query = SearchQuery::parse(raw)?;
        if query.is_empty() && mode == SearchMode::FullText {
            return self.list(page).await;
        }

        let hits = self.storage.search(SearchKind::AuditTrail, &query, mode, page).await?;
        let ids: Vec<Id> = hits.items.iter().map(|h| h.id).collect();
        let entries = self.storage.get_audit_trails(&ids).await?;
        Ok(search_page(hits, entries))
    }

    pub async fn search_highlight(&self, raw: &str, page: PageRequest) -> ServiceResult<Page<SearchHit>> {
        let query = SearchQuery::parse(raw)?;
        Ok(self
            .storage
            .search_highlight(SearchKind::AuditTrail, &query, page)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_search() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap());
        let audit = AuditService::new(storage);

        let actor = Actor {
            name: "admin".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
        };
        let entry = audit
            .record(
                AuditAction::Create,
                "Region",
                7,
                None,
                Some(serde_json::json!({"name": "eu"})),
                &actor,
            )
            .await
            .unwrap();
        assert_eq!(entry.fields.action, "CREATE");
        assert_eq!(entry.fields.performed_by, "admin");

        let found = audit
            .search("region", SearchMode::FullText, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].fields.entity_id, 7);

        assert_eq!(audit.get(entry.id).await.unwrap(), entry);
        assert!(matches!(audit.get(999).await, Err(ServiceError::NotFound(_))));
    }
}
