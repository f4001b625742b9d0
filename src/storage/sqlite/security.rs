use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use tracing::{debug, instrument};

use super::{SqliteBackend, count_rows, in_id_order, json_col, json_text, opt_millis, opt_time_col, placeholders, time_col};
use crate::model::{AgentLock, ApiKey, AuditTrail, Id, NewApiKey, NewAuditTrail, Page, PageRequest};
use crate::storage::backend::{AuditStore, CredentialStore, LockStore};
use crate::storage::error::{StorageError, StorageResult};

fn api_key_from_row(row: &SqliteRow) -> StorageResult<ApiKey> {
    Ok(ApiKey {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        key_hash: row.try_get("key_hash")?,
        active: row.try_get("active")?,
        last_used_date: opt_time_col(row, "last_used_date")?,
        expires_at: opt_time_col(row, "expires_at")?,
        created_by: row.try_get("created_by")?,
        created_date: time_col(row, "created_date")?,
        last_modified_by: row.try_get("last_modified_by")?,
        last_modified_date: opt_time_col(row, "last_modified_date")?,
        agent_id: row.try_get("agent_id")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> StorageResult<AuditTrail> {
    Ok(AuditTrail {
        id: row.try_get("id")?,
        fields: NewAuditTrail {
            action: row.try_get("action")?,
            entity_name: row.try_get("entity_name")?,
            entity_id: row.try_get("entity_id")?,
            old_value: json_col(row, "old_value")?,
            new_value: json_col(row, "new_value")?,
            timestamp: time_col(row, "timestamp")?,
            performed_by: row.try_get("performed_by")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
        },
    })
}

fn lock_from_row(row: &SqliteRow) -> StorageResult<AgentLock> {
    Ok(AgentLock {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        acquired_at: time_col(row, "acquired_at")?,
        expires_at: time_col(row, "expires_at")?,
    })
}

/// Insert a key on an open connection so registration can share its transaction
pub(super) async fn insert_api_key_on(conn: &mut SqliteConnection, key: &NewApiKey) -> StorageResult<ApiKey> {
    let row = sqlx::query(
        r#"
        INSERT INTO api_key (name, description, key_hash, active, expires_at, created_by, created_date, agent_id)
        VALUES (?, ?, ?, 1, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&key.name)
    .bind(&key.description)
    .bind(&key.key_hash)
    .bind(opt_millis(key.expires_at.as_ref()))
    .bind(&key.created_by)
    .bind(SqliteBackend::timestamp_to_millis(&key.created_date))
    .bind(key.agent_id)
    .fetch_one(&mut *conn)
    .await?;

    api_key_from_row(&row)
}

#[async_trait]
impl CredentialStore for SqliteBackend {
    #[instrument(skip_all, fields(name = %key.name))]
    async fn insert_api_key(&self, key: NewApiKey) -> StorageResult<ApiKey> {
        let mut conn = self.pool.acquire().await?;
        let key = insert_api_key_on(&mut conn, &key).await?;
        debug!("stored api key {}", key.id);
        Ok(key)
    }

    #[instrument(skip(self))]
    async fn get_api_key(&self, id: Id) -> StorageResult<Option<ApiKey>> {
        let row = sqlx::query("SELECT * FROM api_key WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    async fn get_api_keys(&self, ids: &[Id]) -> StorageResult<Vec<ApiKey>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT * FROM api_key WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let keys = rows.iter().map(api_key_from_row).collect::<StorageResult<Vec<_>>>()?;
        Ok(in_id_order(ids, keys, |k| k.id))
    }

    #[instrument(skip(self))]
    async fn list_api_keys(&self, page: PageRequest) -> StorageResult<Page<ApiKey>> {
        let rows = sqlx::query("SELECT * FROM api_key ORDER BY id LIMIT ? OFFSET ?")
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows.iter().map(api_key_from_row).collect::<StorageResult<Vec<_>>>()?;
        let total = count_rows(&self.pool, "api_key").await?;
        Ok(Page::new(items, total as u64, page))
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StorageResult<Option<ApiKey>> {
        let row = sqlx::query("SELECT * FROM api_key WHERE key_hash = ?")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    async fn mark_api_key_used(&self, id: Id, now: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query("UPDATE api_key SET last_used_date = ? WHERE id = ?")
            .bind(Self::timestamp_to_millis(&now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, now))]
    async fn deactivate_api_key(
        &self,
        id: Id,
        modified_by: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ApiKey>> {
        let row = sqlx::query(
            r#"
            UPDATE api_key SET active = 0, last_modified_by = ?, last_modified_date = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(modified_by)
        .bind(Self::timestamp_to_millis(&now))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn delete_api_key(&self, id: Id) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM api_key WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditStore for SqliteBackend {
    #[instrument(skip_all, fields(action = %entry.action, entity = %entry.entity_name))]
    async fn insert_audit_trail(&self, entry: NewAuditTrail) -> StorageResult<AuditTrail> {
        let row = sqlx::query(
            r#"
            INSERT INTO audit_trail (
                action, entity_name, entity_id, old_value, new_value, timestamp,
                performed_by, ip_address, user_agent
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&entry.action)
        .bind(&entry.entity_name)
        .bind(entry.entity_id)
        .bind(json_text(entry.old_value.as_ref()))
        .bind(json_text(entry.new_value.as_ref()))
        .bind(Self::timestamp_to_millis(&entry.timestamp))
        .bind(&entry.performed_by)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .fetch_one(&self.pool)
        .await?;

        audit_from_row(&row)
    }

    async fn get_audit_trail(&self, id: Id) -> StorageResult<Option<AuditTrail>> {
        let row = sqlx::query("SELECT * FROM audit_trail WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(audit_from_row).transpose()
    }

    async fn get_audit_trails(&self, ids: &[Id]) -> StorageResult<Vec<AuditTrail>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT * FROM audit_trail WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let entries = rows.iter().map(audit_from_row).collect::<StorageResult<Vec<_>>>()?;
        Ok(in_id_order(ids, entries, |e| e.id))
    }

    #[instrument(skip(self))]
    async fn list_audit_trails(&self, page: PageRequest) -> StorageResult<Page<AuditTrail>> {
        let rows = sqlx::query("SELECT * FROM audit_trail ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?")
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows.iter().map(audit_from_row).collect::<StorageResult<Vec<_>>>()?;
        let total = count_rows(&self.pool, "audit_trail").await?;
        Ok(Page::new(items, total as u64, page))
    }
}

#[async_trait]
impl LockStore for SqliteBackend {
    #[instrument(skip(self, now))]
    async fn acquire_agent_lock(&self, agent_id: Id, ttl: Duration, now: DateTime<Utc>) -> StorageResult<AgentLock> {
        let now_millis = Self::timestamp_to_millis(&now);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM agent_lock WHERE agent_id = ? AND expires_at <= ?")
            .bind(agent_id)
            .bind(now_millis)
            .execute(&mut *tx)
            .await?;

        let held: Option<(i64,)> = sqlx::query_as("SELECT expires_at FROM agent_lock WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some((expires_at,)) = held {
            return Err(StorageError::Conflict(format!(
                "agent {} is locked until {}",
                agent_id,
                Self::millis_to_timestamp(expires_at)
            )));
        }

        let row = sqlx::query(
            "INSERT INTO agent_lock (agent_id, acquired_at, expires_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(agent_id)
        .bind(now_millis)
        .bind(Self::timestamp_to_millis(&(now + ttl)))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("acquired lock for agent {}", agent_id);
        lock_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn release_agent_lock(&self, agent_id: Id) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM agent_lock WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
