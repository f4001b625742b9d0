//! SQLite storage backend implementation
//!
//! One `SqliteBackend` implements every storage trait:
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers are not blocked by the heartbeat writers
//! - **Migrations**: Schema versioning with `sqlx::migrate!`
//! - **FTS5**: The search index lives in the `search_documents` virtual table
//!
//! Timestamps are stored as Unix milliseconds and JSON columns as text.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, Repository, StorageBackend, StorageStats};
use super::error::{StorageError, StorageResult};
use crate::model::{Entity, Id, Page, PageRequest};

mod heartbeats;
mod monitors;
mod search;
mod security;
mod status_pages;
mod topology;

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// Creates the database file if needed, runs the migrations and enables
    /// WAL mode and foreign keys.
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use inframirror::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./inframirror.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        info!("SQLite connection pool created");

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    pub(crate) fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    pub(crate) fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}

pub(crate) fn time_col(row: &SqliteRow, column: &str) -> StorageResult<DateTime<Utc>> {
    Ok(SqliteBackend::millis_to_timestamp(row.try_get(column)?))
}

pub(crate) fn opt_time_col(row: &SqliteRow, column: &str) -> StorageResult<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.try_get(column)?;
    Ok(millis.map(SqliteBackend::millis_to_timestamp))
}

pub(crate) fn opt_millis(dt: Option<&DateTime<Utc>>) -> Option<i64> {
    dt.map(SqliteBackend::timestamp_to_millis)
}

pub(crate) fn json_col(row: &SqliteRow, column: &str) -> StorageResult<Option<Value>> {
    let text: Option<String> = row.try_get(column)?;
    match text {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub(crate) fn json_text(value: Option<&Value>) -> Option<String> {
    value.map(Value::to_string)
}

/// `?, ?, ?` for `count` bind parameters
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Reorders `rows` to follow `ids`, dropping ids without a row
pub(crate) fn in_id_order<T>(ids: &[Id], rows: Vec<T>, id_of: impl Fn(&T) -> Id) -> Vec<T> {
    let mut by_id: HashMap<Id, T> = rows.into_iter().map(|row| (id_of(&row), row)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Mapping between an inventory entity and its table
pub(crate) trait SqlRecord: Entity {
    const TABLE: &'static str;

    /// Columns written from `Self::Fields`, in bind order
    const COLUMNS: &'static [&'static str];

    /// Whether the table carries server-managed `created_at`/`updated_at`
    const TIMESTAMPED: bool = false;

    fn bind_fields<'q>(fields: &Self::Fields, query: SqliteQuery<'q>) -> SqliteQuery<'q>;

    fn from_row(row: &SqliteRow) -> StorageResult<Self>;
}

fn insert_sql<E: SqlRecord>() -> String {
    let mut columns: Vec<&str> = E::COLUMNS.to_vec();
    if E::TIMESTAMPED {
        columns.extend(["created_at", "updated_at"]);
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        E::TABLE,
        columns.join(", "),
        placeholders(columns.len())
    )
}

fn update_sql<E: SqlRecord>() -> String {
    let mut assignments: Vec<String> = E::COLUMNS.iter().map(|c| format!("{c} = ?")).collect();
    if E::TIMESTAMPED {
        assignments.push("updated_at = ?".to_string());
    }
    format!("UPDATE {} SET {} WHERE id = ?", E::TABLE, assignments.join(", "))
}

/// Insert on an open connection or transaction, returning the new id
pub(crate) async fn insert_record<E: SqlRecord>(
    conn: &mut SqliteConnection,
    fields: &E::Fields,
    now: DateTime<Utc>,
) -> StorageResult<Id> {
    let sql = insert_sql::<E>();
    let mut query = E::bind_fields(fields, sqlx::query(&sql));
    if E::TIMESTAMPED {
        let now = SqliteBackend::timestamp_to_millis(&now);
        query = query.bind(now).bind(now);
    }

    Ok(query.execute(&mut *conn).await?.last_insert_rowid())
}

pub(crate) async fn fetch_record<E: SqlRecord>(conn: &mut SqliteConnection, id: Id) -> StorageResult<Option<E>> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", E::TABLE);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(E::from_row).transpose()
}

pub(crate) async fn count_rows(pool: &Pool<Sqlite>, table: &str) -> StorageResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(pool).await?;
    Ok(count)
}

#[async_trait]
impl<E: SqlRecord> Repository<E> for SqliteBackend {
    #[instrument(skip_all, fields(table = E::TABLE))]
    async fn insert(&self, fields: E::Fields) -> StorageResult<E> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_record::<E>(&mut conn, &fields, Utc::now()).await?;
        debug!("inserted {} {}", E::TABLE, id);

        fetch_record::<E>(&mut conn, id)
            .await?
            .ok_or(StorageError::NotFound { entity: E::NAME, id })
    }

    #[instrument(skip(self), fields(table = E::TABLE))]
    async fn get(&self, id: Id) -> StorageResult<Option<E>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record::<E>(&mut conn, id).await
    }

    #[instrument(skip(self), fields(table = E::TABLE))]
    async fn list(&self, page: PageRequest) -> StorageResult<Page<E>> {
        let sql = format!("SELECT * FROM {} ORDER BY id LIMIT ? OFFSET ?", E::TABLE);
        let rows = sqlx::query(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows.iter().map(E::from_row).collect::<StorageResult<Vec<_>>>()?;
        let total = count_rows(&self.pool, E::TABLE).await?;

        Ok(Page::new(items, total as u64, page))
    }

    async fn get_many(&self, ids: &[Id]) -> StorageResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT * FROM {} WHERE id IN ({})", E::TABLE, placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let records = rows.iter().map(E::from_row).collect::<StorageResult<Vec<_>>>()?;
        Ok(in_id_order(ids, records, E::id))
    }

    #[instrument(skip_all, fields(table = E::TABLE, id = entity.id()))]
    async fn update(&self, entity: &E) -> StorageResult<E> {
        let id = entity.id();
        let sql = update_sql::<E>();

        let mut query = E::bind_fields(entity.fields(), sqlx::query(&sql));
        if E::TIMESTAMPED {
            query = query.bind(SqliteBackend::timestamp_to_millis(&Utc::now()));
        }

        let mut conn = self.pool.acquire().await?;
        let result = query.bind(id).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound { entity: E::NAME, id });
        }

        fetch_record::<E>(&mut conn, id)
            .await?
            .ok_or(StorageError::NotFound { entity: E::NAME, id })
    }

    #[instrument(skip(self), fields(table = E::TABLE))]
    async fn delete(&self, id: Id) -> StorageResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_heartbeats(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let before_millis = Self::timestamp_to_millis(&before);

        info!("cleaning up heartbeats older than {}", before);

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for table in ["instance_heartbeat", "http_heartbeat", "service_heartbeat"] {
            let sql = format!("DELETE FROM {table} WHERE executed_at < ?");
            let result = sqlx::query(&sql).bind(before_millis).execute(&mut *tx).await?;
            deleted += result.rows_affected() as usize;
        }
        tx.commit().await?;

        info!("deleted {} old heartbeats", deleted);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<StorageStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM region) AS regions,
                (SELECT COUNT(*) FROM datacenter) AS datacenters,
                (SELECT COUNT(*) FROM agent) AS agents,
                (SELECT COUNT(*) FROM instance) AS instances,
                (SELECT COUNT(*) FROM http_monitor) AS http_monitors,
                (SELECT COUNT(*) FROM monitored_service) AS monitored_services,
                (SELECT COUNT(*) FROM status_page) AS status_pages,
                (SELECT COUNT(*) FROM instance_heartbeat) AS instance_heartbeats,
                (SELECT COUNT(*) FROM http_heartbeat) AS http_heartbeats,
                (SELECT COUNT(*) FROM service_heartbeat) AS service_heartbeats
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let bounds = sqlx::query(
            r#"
            SELECT MIN(executed_at) AS oldest, MAX(executed_at) AS newest FROM (
                SELECT executed_at FROM instance_heartbeat
                UNION ALL SELECT executed_at FROM http_heartbeat
                UNION ALL SELECT executed_at FROM service_heartbeat
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let file_size_bytes = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StorageStats {
            regions: row.try_get("regions")?,
            datacenters: row.try_get("datacenters")?,
            agents: row.try_get("agents")?,
            instances: row.try_get("instances")?,
            http_monitors: row.try_get("http_monitors")?,
            monitored_services: row.try_get("monitored_services")?,
            status_pages: row.try_get("status_pages")?,
            instance_heartbeats: row.try_get("instance_heartbeats")?,
            http_heartbeats: row.try_get("http_heartbeats")?,
            service_heartbeats: row.try_get("service_heartbeats")?,
            oldest_heartbeat: opt_time_col(&bounds, "oldest")?,
            newest_heartbeat: opt_time_col(&bounds, "newest")?,
            file_size_bytes,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
