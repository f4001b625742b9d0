//! Per-agent exclusive locks with an expiry

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, instrument};

use super::error::{ServiceError, ServiceResult};
use crate::model::{AgentLock, Id};
use crate::storage::{LockStore, SqliteBackend};

/// Lifetime of a lock when the caller names none
pub const DEFAULT_LOCK_TTL_SECS: u64 = 300;

pub const MAX_LOCK_TTL_SECS: u64 = 86_400;

#[derive(Clone)]
pub struct AgentLockService {
    storage: Arc<SqliteBackend>,
}

impl AgentLockService {
    pub fn new(storage: Arc<SqliteBackend>) -> Self {
        Self { storage }
    }

    /// `ServiceError::Conflict` while another unexpired lock is held
    #[instrument(skip(self))]
    pub async fn acquire(&self, agent_id: Id, ttl_secs: Option<u64>) -> ServiceResult<AgentLock> {
        let ttl_secs = ttl_secs.unwrap_or(DEFAULT_LOCK_TTL_SECS);
        if !(1..=MAX_LOCK_TTL_SECS).contains(&ttl_secs) {
            return Err(ServiceError::invalid(
                "ttlSeconds",
                format!("must be between 1 and {MAX_LOCK_TTL_SECS}"),
            ));
        }
        let ttl = Duration::seconds(ttl_secs as i64);

        let lock = self.storage.acquire_agent_lock(agent_id, ttl, Utc::now()).await?;
        debug!("agent {} locked until {}", agent_id, lock.expires_at);
        Ok(lock)
    }

    /// Whether a lock was held
    pub async fn release(&self, agent_id: Id) -> ServiceResult<bool> {
        Ok(self.storage.release_agent_lock(agent_id).await?)
    }
}
