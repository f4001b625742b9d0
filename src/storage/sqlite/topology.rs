use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use tracing::{debug, info, instrument};

use super::{
    SqlRecord, SqliteBackend, SqliteQuery, fetch_record, insert_record, json_col, json_text,
    opt_millis, opt_time_col, time_col,
};
use crate::model::{
    Agent, AgentMonitor, Datacenter, HttpMonitor, Id, Instance, NewAgent, NewApiKey, NewDatacenter,
    NewInstance, NewRegion, Region, ServiceTarget,
};
use crate::storage::backend::{Registration, TopologyStore};
use crate::storage::error::{StorageError, StorageResult};

impl SqlRecord for Region {
    const TABLE: &'static str = "region";
    const COLUMNS: &'static [&'static str] = &["name", "region_code", "group_name"];

    fn bind_fields<'q>(f: &NewRegion, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(f.name.clone())
            .bind(f.region_code.clone())
            .bind(f.group_name.clone())
    }

    fn from_row(row: &SqliteRow) -> StorageResult<Self> {
        Ok(Region {
            id: row.try_get("id")?,
            fields: NewRegion {
                name: row.try_get("name")?,
                region_code: row.try_get("region_code")?,
                group_name: row.try_get("group_name")?,
            },
        })
    }
}

impl SqlRecord for Datacenter {
    const TABLE: &'static str = "datacenter";
    const COLUMNS: &'static [&'static str] = &["code", "name", "region_id"];

    fn bind_fields<'q>(f: &NewDatacenter, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(f.code.clone()).bind(f.name.clone()).bind(f.region_id)
    }

    fn from_row(row: &SqliteRow) -> StorageResult<Self> {
        Ok(Datacenter {
            id: row.try_get("id")?,
            fields: NewDatacenter {
                code: row.try_get("code")?,
                name: row.try_get("name")?,
                region_id: row.try_get("region_id")?,
            },
        })
    }
}

impl SqlRecord for Agent {
    const TABLE: &'static str = "agent";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "hostname",
        "ip_address",
        "os_type",
        "os_version",
        "agent_version",
        "last_seen_at",
        "status",
        "tags",
        "datacenter_id",
        "region_id",
    ];

    fn bind_fields<'q>(f: &NewAgent, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(f.name.clone())
            .bind(f.hostname.clone())
            .bind(f.ip_address.clone())
            .bind(f.os_type.clone())
            .bind(f.os_version.clone())
            .bind(f.agent_version.clone())
            .bind(opt_millis(f.last_seen_at.as_ref()))
            .bind(f.status.clone())
            .bind(json_text(f.tags.as_ref()))
            .bind(f.datacenter_id)
            .bind(f.region_id)
    }

    fn from_row(row: &SqliteRow) -> StorageResult<Self> {
        Ok(Agent {
            id: row.try_get("id")?,
            fields: NewAgent {
                name: row.try_get("name")?,
                hostname: row.try_get("hostname")?,
                ip_address: row.try_get("ip_address")?,
                os_type: row.try_get("os_type")?,
                os_version: row.try_get("os_version")?,
                agent_version: row.try_get("agent_version")?,
                last_seen_at: opt_time_col(row, "last_seen_at")?,
                status: row.try_get("status")?,
                tags: json_col(row, "tags")?,
                datacenter_id: row.try_get("datacenter_id")?,
                region_id: row.try_get("region_id")?,
            },
        })
    }
}

impl SqlRecord for Instance {
    const TABLE: &'static str = "instance";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "hostname",
        "description",
        "instance_type",
        "monitoring_type",
        "operating_system",
        "platform",
        "private_ip_address",
        "public_ip_address",
        "tags",
        "ping_enabled",
        "ping_interval",
        "ping_timeout_ms",
        "ping_retry_count",
        "hardware_monitoring_enabled",
        "hardware_monitoring_interval",
        "cpu_warning_threshold",
        "cpu_danger_threshold",
        "memory_warning_threshold",
        "memory_danger_threshold",
        "disk_warning_threshold",
        "disk_danger_threshold",
        "datacenter_id",
        "agent_id",
    ];
    const TIMESTAMPED: bool = true;

    fn bind_fields<'q>(f: &NewInstance, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(f.name.clone())
            .bind(f.hostname.clone())
            .bind(f.description.clone())
            .bind(f.instance_type.clone())
            .bind(f.monitoring_type.clone())
            .bind(f.operating_system.clone())
            .bind(f.platform.clone())
            .bind(f.private_ip_address.clone())
            .bind(f.public_ip_address.clone())
            .bind(json_text(f.tags.as_ref()))
            .bind(f.ping_enabled)
            .bind(f.ping_interval)
            .bind(f.ping_timeout_ms)
            .bind(f.ping_retry_count)
            .bind(f.hardware_monitoring_enabled)
            .bind(f.hardware_monitoring_interval)
            .bind(f.cpu_warning_threshold)
            .bind(f.cpu_danger_threshold)
            .bind(f.memory_warning_threshold)
            .bind(f.memory_danger_threshold)
            .bind(f.disk_warning_threshold)
            .bind(f.disk_danger_threshold)
            .bind(f.datacenter_id)
            .bind(f.agent_id)
    }

    fn from_row(row: &SqliteRow) -> StorageResult<Self> {
        Ok(Instance {
            id: row.try_get("id")?,
            fields: NewInstance {
                name: row.try_get("name")?,
                hostname: row.try_get("hostname")?,
                description: row.try_get("description")?,
                instance_type: row.try_get("instance_type")?,
                monitoring_type: row.try_get("monitoring_type")?,
                operating_system: row.try_get("operating_system")?,
                platform: row.try_get("platform")?,
                private_ip_address: row.try_get("private_ip_address")?,
                public_ip_address: row.try_get("public_ip_address")?,
                tags: json_col(row, "tags")?,
                ping_enabled: row.try_get("ping_enabled")?,
                ping_interval: row.try_get("ping_interval")?,
                ping_timeout_ms: row.try_get("ping_timeout_ms")?,
                ping_retry_count: row.try_get("ping_retry_count")?,
                hardware_monitoring_enabled: row.try_get("hardware_monitoring_enabled")?,
                hardware_monitoring_interval: row.try_get("hardware_monitoring_interval")?,
                cpu_warning_threshold: row.try_get("cpu_warning_threshold")?,
                cpu_danger_threshold: row.try_get("cpu_danger_threshold")?,
                memory_warning_threshold: row.try_get("memory_warning_threshold")?,
                memory_danger_threshold: row.try_get("memory_danger_threshold")?,
                disk_warning_threshold: row.try_get("disk_warning_threshold")?,
                disk_danger_threshold: row.try_get("disk_danger_threshold")?,
                datacenter_id: row.try_get("datacenter_id")?,
                agent_id: row.try_get("agent_id")?,
            },
            created_at: time_col(row, "created_at")?,
            updated_at: time_col(row, "updated_at")?,
            last_ping_at: opt_time_col(row, "last_ping_at")?,
            last_hardware_check_at: opt_time_col(row, "last_hardware_check_at")?,
        })
    }
}

fn assignment_from_row(row: &SqliteRow) -> StorageResult<AgentMonitor> {
    Ok(AgentMonitor {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        monitor_id: row.try_get("monitor_id")?,
        active: row.try_get("active")?,
        created_by: row.try_get("created_by")?,
        created_date: time_col(row, "created_date")?,
    })
}

async fn region_by_name(conn: &mut SqliteConnection, name: &str) -> StorageResult<Option<Region>> {
    let row = sqlx::query("SELECT * FROM region WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(Region::from_row).transpose()
}

async fn datacenter_by_name(
    conn: &mut SqliteConnection,
    name: &str,
    region_id: Id,
) -> StorageResult<Option<Datacenter>> {
    let row = sqlx::query("SELECT * FROM datacenter WHERE name = ? AND region_id = ?")
        .bind(name)
        .bind(region_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(Datacenter::from_row).transpose()
}

async fn must_fetch<E: SqlRecord>(conn: &mut SqliteConnection, id: Id) -> StorageResult<E> {
    fetch_record::<E>(conn, id)
        .await?
        .ok_or(StorageError::NotFound { entity: E::NAME, id })
}

#[async_trait]
impl TopologyStore for SqliteBackend {
    #[instrument(skip(self))]
    async fn find_region_by_name(&self, name: &str) -> StorageResult<Option<Region>> {
        let mut conn = self.pool.acquire().await?;
        region_by_name(&mut conn, name).await
    }

    #[instrument(skip(self))]
    async fn find_datacenter_by_name_and_region(
        &self,
        name: &str,
        region_id: Id,
    ) -> StorageResult<Option<Datacenter>> {
        let mut conn = self.pool.acquire().await?;
        datacenter_by_name(&mut conn, name, region_id).await
    }

    #[instrument(skip(self, agent, api_key), fields(agent_name = %agent.name))]
    async fn register_agent(
        &self,
        region_name: &str,
        datacenter_name: &str,
        mut agent: NewAgent,
        api_key: NewApiKey,
    ) -> StorageResult<Registration> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let region = match region_by_name(&mut tx, region_name).await? {
            Some(region) => region,
            None => {
                let id = insert_record::<Region>(&mut tx, &NewRegion::named(region_name), now).await?;
                info!("created region '{}' ({})", region_name, id);
                must_fetch::<Region>(&mut tx, id).await?
            }
        };

        let datacenter = match datacenter_by_name(&mut tx, datacenter_name, region.id).await? {
            Some(datacenter) => datacenter,
            None => {
                let fields = NewDatacenter::named(datacenter_name, Some(region.id));
                let id = insert_record::<Datacenter>(&mut tx, &fields, now).await?;
                info!("created datacenter '{}' ({})", datacenter_name, id);
                must_fetch::<Datacenter>(&mut tx, id).await?
            }
        };

        agent.region_id = Some(region.id);
        agent.datacenter_id = Some(datacenter.id);
        let agent_id = insert_record::<Agent>(&mut tx, &agent, now).await?;
        let agent = must_fetch::<Agent>(&mut tx, agent_id).await?;

        let api_key = NewApiKey {
            agent_id: Some(agent_id),
            ..api_key
        };
        let api_key = super::security::insert_api_key_on(&mut tx, &api_key).await?;

        tx.commit().await?;
        debug!("registered agent {}", agent_id);

        Ok(Registration {
            region,
            datacenter,
            agent,
            api_key,
        })
    }

    #[instrument(skip(self))]
    async fn touch_agent(&self, id: Id, status: &str, now: DateTime<Utc>) -> StorageResult<Option<Agent>> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query("UPDATE agent SET last_seen_at = ?, status = ? WHERE id = ?")
            .bind(Self::timestamp_to_millis(&now))
            .bind(status)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        fetch_record::<Agent>(&mut conn, id).await
    }

    #[instrument(skip(self, created_by))]
    async fn assign_monitor(
        &self,
        monitor_id: Id,
        agent_id: Id,
        active: bool,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<AgentMonitor> {
        let row = sqlx::query(
            r#"
            INSERT INTO agent_monitor (agent_id, monitor_id, active, created_by, created_date)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (agent_id, monitor_id) DO UPDATE SET active = excluded.active
            RETURNING *
            "#,
        )
        .bind(agent_id)
        .bind(monitor_id)
        .bind(active)
        .bind(created_by)
        .bind(Self::timestamp_to_millis(&now))
        .fetch_one(&self.pool)
        .await?;

        assignment_from_row(&row)
    }

    async fn unassign_monitor(&self, monitor_id: Id, agent_id: Id) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM agent_monitor WHERE monitor_id = ? AND agent_id = ?")
            .bind(monitor_id)
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_monitor_assignments(&self, monitor_id: Id) -> StorageResult<Vec<AgentMonitor>> {
        let rows = sqlx::query("SELECT * FROM agent_monitor WHERE monitor_id = ? ORDER BY id")
            .bind(monitor_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_monitors_for_agent(&self, agent_id: Id) -> StorageResult<Vec<HttpMonitor>> {
        let rows = sqlx::query(
            r#"
            SELECT m.* FROM http_monitor m
            JOIN agent_monitor am ON am.monitor_id = m.id
            WHERE am.agent_id = ? AND am.active = 1 AND COALESCE(m.enabled, 1) = 1
            ORDER BY m.id
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(HttpMonitor::from_row).collect()
    }

    async fn list_enabled_monitors(&self) -> StorageResult<Vec<HttpMonitor>> {
        let rows = sqlx::query("SELECT * FROM http_monitor WHERE COALESCE(enabled, 1) = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(HttpMonitor::from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_service_targets(&self, agent_id: Id) -> StorageResult<Vec<ServiceTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT
                si.id AS service_instance_id, si.port, si.instance_id, si.monitored_service_id,
                ms.name, ms.service_type, ms.interval_seconds, ms.timeout_ms, ms.retry_count,
                ms.latency_warning_ms, ms.latency_critical_ms,
                COALESCE(NULLIF(i.private_ip_address, ''), NULLIF(i.public_ip_address, ''), i.hostname) AS host
            FROM service_instance si
            JOIN monitored_service ms ON ms.id = si.monitored_service_id
            JOIN instance i ON i.id = si.instance_id
            WHERE i.agent_id = ?
              AND COALESCE(si.is_active, 1) = 1
              AND COALESCE(ms.is_active, 1) = 1
              AND COALESCE(ms.monitoring_enabled, 1) = 1
            ORDER BY si.id
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(service_target_from_row).collect()
    }
}

fn service_target_from_row(row: &SqliteRow) -> StorageResult<ServiceTarget> {
    Ok(ServiceTarget {
        service_instance_id: row.try_get("service_instance_id")?,
        monitored_service_id: row.try_get("monitored_service_id")?,
        instance_id: row.try_get("instance_id")?,
        name: row.try_get("name")?,
        service_type: row.try_get("service_type")?,
        host: row.try_get("host")?,
        port: row.try_get("port")?,
        interval_seconds: row.try_get("interval_seconds")?,
        timeout_ms: row.try_get("timeout_ms")?,
        retry_count: row.try_get("retry_count")?,
        latency_warning_ms: row.try_get("latency_warning_ms")?,
        latency_critical_ms: row.try_get("latency_critical_ms")?,
    })
}
