//! API key issuing and authentication
//!
//! Plaintext keys are shown once at creation. Storage only ever sees
//! `base64(sha256(plaintext))`.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::audit::{AuditService, snapshot};
use super::error::{ServiceError, ServiceResult};
use super::search_page;
use crate::model::{Actor, ApiKey, AuditAction, Id, IssueApiKey, IssuedApiKey, NewApiKey, Page, PageRequest, Validate};
use crate::search::{SearchHit, SearchKind, SearchMode, SearchQuery};
use crate::storage::{CredentialStore, SearchIndex, SqliteBackend};

/// Prefix of admin-issued keys
pub const ISSUED_KEY_PREFIX: &str = "imk_";

/// Prefix of keys handed out at agent registration
pub const AGENT_KEY_PREFIX: &str = "agent-";

pub fn hash_key(plaintext: &str) -> String {
    STANDARD.encode(Sha256::digest(plaintext.as_bytes()))
}

pub fn generate_issued_key() -> String {
    format!("{ISSUED_KEY_PREFIX}{}", Uuid::new_v4().simple())
}

pub fn generate_agent_key() -> String {
    format!("{AGENT_KEY_PREFIX}{}", Uuid::new_v4())
}

#[derive(Clone)]
pub struct CredentialService {
    storage: Arc<SqliteBackend>,
    audit: AuditService,
}

impl CredentialService {
    pub fn new(storage: Arc<SqliteBackend>, audit: AuditService) -> Self {
        Self { storage, audit }
    }

    #[instrument(skip_all, fields(name = %request.name, actor = %actor.name))]
    pub async fn issue(&self, request: IssueApiKey, actor: &Actor) -> ServiceResult<IssuedApiKey> {
        request.validate()?;

        let plaintext = generate_issued_key();
        let key = self
            .storage
            .insert_api_key(NewApiKey {
                name: request.name,
                description: request.description,
                key_hash: hash_key(&plaintext),
                expires_at: request.expires_at,
                created_by: actor.name.clone(),
                created_date: Utc::now(),
                agent_id: None,
            })
            .await?;

        self.storage.index_document(&key.search_document()).await?;
        self.audit
            .record(AuditAction::IssueKey, "ApiKey", key.id, None, snapshot(&key), actor)
            .await?;

        debug!("issued api key {}", key.id);
        Ok(IssuedApiKey {
            key,
            api_key: plaintext,
        })
    }

    /// The active, unexpired key matching `plaintext`; stamps `last_used_date`
    pub async fn authenticate(&self, plaintext: Option<&str>, now: DateTime<Utc>) -> ServiceResult<ApiKey> {
        let plaintext = plaintext
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("missing API key".to_string()))?;

        let key = self
            .storage
            .find_api_key_by_hash(&hash_key(plaintext))
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("invalid API key".to_string()))?;

        if !key.active {
            warn!("rejected inactive api key {}", key.id);
            return Err(ServiceError::Unauthorized("API key is inactive".to_string()));
        }
        if !key.is_usable(now) {
            warn!("rejected expired api key {}", key.id);
            return Err(ServiceError::Unauthorized("API key has expired".to_string()));
        }

        self.storage.mark_api_key_used(key.id, now).await?;
        Ok(ApiKey {
            last_used_date: Some(now),
            ..key
        })
    }

    pub async fn get(&self, id: Id) -> ServiceResult<ApiKey> {
        self.storage
            .get_api_key(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("ApiKey", id))
    }

    pub async fn list(&self, page: PageRequest) -> ServiceResult<Page<ApiKey>> {
        Ok(self.storage.list_api_keys(page).await?)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.name))]
    pub async fn deactivate(&self, id: Id, actor: &Actor) -> ServiceResult<ApiKey> {
        let before = self.get(id).await?;
        let key = self
            .storage
            .deactivate_api_key(id, &actor.name, Utc::now())
            .await?
            .ok_or_else(|| ServiceError::not_found("ApiKey", id))?;

        self.audit
            .record(
                AuditAction::DeactivateKey,
                "ApiKey",
                id,
                snapshot(&before),
                snapshot(&key),
                actor,
            )
            .await?;
        Ok(key)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.name))]
    pub async fn delete(&self, id: Id, actor: &Actor) -> ServiceResult<()> {
        let before = self.get(id).await?;
        if !self.storage.delete_api_key(id).await? {
            return Err(ServiceError::not_found("ApiKey", id));
        }

        self.storage.remove_document(SearchKind::ApiKey, id).await?;
        self.audit
            .record(AuditAction::Delete, "ApiKey", id, snapshot(&before), None, actor)
            .await?;
        Ok(())
    }

    pub async fn search(&self, raw: &str, mode: SearchMode, page: PageRequest) -> ServiceResult<Page<ApiKey>> {
        let query = SearchQuery::parse(raw)?;
        if query.is_empty() && mode == SearchMode::FullText {
            return self.list(page).await;
        }

        let hits = self.storage.search(SearchKind::ApiKey, &query, mode, page).await?;
        let ids: Vec<Id> = hits.items.iter().map(|h| h.id).collect();
        let keys = self.storage.get_api_keys(&ids).await?;
        Ok(search_page(hits, keys))
    }

    pub async fn search_highlight(&self, raw: &str, page: PageRequest) -> ServiceResult<Page<SearchHit>> {
        let query = SearchQuery::parse(raw)?;
        Ok(self.storage.search_highlight(SearchKind::ApiKey, &query, page).await?)
    }
}
