use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};

use super::{SqliteBackend, json_col, json_text, placeholders, time_col};
use crate::model::{
    HeartbeatSample, HeartbeatType, HttpHeartbeat, HttpSample, Id, InstanceHeartbeat, InstanceSample,
    NewHttpHeartbeat, NewInstanceHeartbeat, NewServiceHeartbeat, Page, PageRequest, ServiceHeartbeat,
    ServiceSample,
};
use crate::storage::backend::HeartbeatStore;
use crate::storage::error::{StorageError, StorageResult};

fn instance_heartbeat_from_row(row: &SqliteRow) -> StorageResult<InstanceHeartbeat> {
    let heartbeat_type: String = row.try_get("heartbeat_type")?;
    let heartbeat_type: HeartbeatType = heartbeat_type
        .parse()
        .map_err(|e: crate::model::ValidationError| StorageError::SerializationError(e.to_string()))?;

    Ok(InstanceHeartbeat {
        id: row.try_get("id")?,
        executed_at: time_col(row, "executed_at")?,
        sample: InstanceSample {
            heartbeat_type,
            success: row.try_get("success")?,
            response_time_ms: row.try_get("response_time_ms")?,
            packet_loss: row.try_get("packet_loss")?,
            jitter_ms: row.try_get("jitter_ms")?,
            cpu_usage: row.try_get("cpu_usage")?,
            memory_usage: row.try_get("memory_usage")?,
            disk_usage: row.try_get("disk_usage")?,
            load_average: row.try_get("load_average")?,
            process_count: row.try_get("process_count")?,
            network_rx_bytes: row.try_get("network_rx_bytes")?,
            network_tx_bytes: row.try_get("network_tx_bytes")?,
            uptime_seconds: row.try_get("uptime_seconds")?,
            status: row.try_get("status")?,
            error_message: row.try_get("error_message")?,
            error_type: row.try_get("error_type")?,
            metadata: json_col(row, "metadata")?,
            agent_id: row.try_get("agent_id")?,
            instance_id: row.try_get("instance_id")?,
        },
    })
}

fn http_heartbeat_from_row(row: &SqliteRow) -> StorageResult<HttpHeartbeat> {
    Ok(HttpHeartbeat {
        id: row.try_get("id")?,
        executed_at: time_col(row, "executed_at")?,
        sample: HttpSample {
            success: row.try_get("success")?,
            response_time_ms: row.try_get("response_time_ms")?,
            response_size_bytes: row.try_get("response_size_bytes")?,
            response_status_code: row.try_get("response_status_code")?,
            response_content_type: row.try_get("response_content_type")?,
            dns_lookup_ms: row.try_get("dns_lookup_ms")?,
            tcp_connect_ms: row.try_get("tcp_connect_ms")?,
            tls_handshake_ms: row.try_get("tls_handshake_ms")?,
            time_to_first_byte_ms: row.try_get("time_to_first_byte_ms")?,
            warning_threshold_ms: row.try_get("warning_threshold_ms")?,
            critical_threshold_ms: row.try_get("critical_threshold_ms")?,
            error_type: row.try_get("error_type")?,
            error_message: row.try_get("error_message")?,
            agent_id: row.try_get("agent_id")?,
            monitor_id: row.try_get("monitor_id")?,
        },
    })
}

fn service_heartbeat_from_row(row: &SqliteRow) -> StorageResult<ServiceHeartbeat> {
    Ok(ServiceHeartbeat {
        id: row.try_get("id")?,
        executed_at: time_col(row, "executed_at")?,
        sample: ServiceSample {
            success: row.try_get("success")?,
            status: row.try_get("status")?,
            response_time_ms: row.try_get("response_time_ms")?,
            error_message: row.try_get("error_message")?,
            metadata: json_col(row, "metadata")?,
            agent_id: row.try_get("agent_id")?,
            monitored_service_id: row.try_get("monitored_service_id")?,
            service_instance_id: row.try_get("service_instance_id")?,
        },
    })
}

#[async_trait]
impl HeartbeatStore for SqliteBackend {
    #[instrument(skip_all, fields(instance_id = heartbeat.sample.instance_id))]
    async fn insert_instance_heartbeat(
        &self,
        heartbeat: NewInstanceHeartbeat,
    ) -> StorageResult<InstanceHeartbeat> {
        let executed_at = heartbeat.executed_at.unwrap_or_else(Utc::now);
        let millis = Self::timestamp_to_millis(&executed_at);
        let s = heartbeat.sample;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO instance_heartbeat (
                executed_at, heartbeat_type, success, response_time_ms, packet_loss, jitter_ms,
                cpu_usage, memory_usage, disk_usage, load_average, process_count,
                network_rx_bytes, network_tx_bytes, uptime_seconds, status, error_message,
                error_type, metadata, agent_id, instance_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(millis)
        .bind(s.heartbeat_type.to_string())
        .bind(s.success)
        .bind(s.response_time_ms)
        .bind(s.packet_loss)
        .bind(s.jitter_ms)
        .bind(s.cpu_usage)
        .bind(s.memory_usage)
        .bind(s.disk_usage)
        .bind(s.load_average)
        .bind(s.process_count)
        .bind(s.network_rx_bytes)
        .bind(s.network_tx_bytes)
        .bind(s.uptime_seconds)
        .bind(&s.status)
        .bind(&s.error_message)
        .bind(&s.error_type)
        .bind(json_text(s.metadata.as_ref()))
        .bind(s.agent_id)
        .bind(s.instance_id)
        .fetch_one(&mut *tx)
        .await?;

        let touch = match s.heartbeat_type {
            HeartbeatType::Ping => "UPDATE instance SET last_ping_at = ? WHERE id = ?",
            HeartbeatType::Hardware => "UPDATE instance SET last_hardware_check_at = ? WHERE id = ?",
        };
        sqlx::query(touch)
            .bind(millis)
            .bind(s.instance_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("stored {} heartbeat", s.heartbeat_type);

        instance_heartbeat_from_row(&row)
    }

    #[instrument(skip_all, fields(monitor_id = heartbeat.sample.monitor_id))]
    async fn insert_http_heartbeat(&self, heartbeat: NewHttpHeartbeat) -> StorageResult<HttpHeartbeat> {
        let executed_at = heartbeat.executed_at.unwrap_or_else(Utc::now);
        let s = heartbeat.sample;

        let row = sqlx::query(
            r#"
            INSERT INTO http_heartbeat (
                executed_at, success, response_time_ms, response_size_bytes, response_status_code,
                response_content_type, dns_lookup_ms, tcp_connect_ms, tls_handshake_ms,
                time_to_first_byte_ms, warning_threshold_ms, critical_threshold_ms,
                error_type, error_message, agent_id, monitor_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Self::timestamp_to_millis(&executed_at))
        .bind(s.success)
        .bind(s.response_time_ms)
        .bind(s.response_size_bytes)
        .bind(s.response_status_code)
        .bind(&s.response_content_type)
        .bind(s.dns_lookup_ms)
        .bind(s.tcp_connect_ms)
        .bind(s.tls_handshake_ms)
        .bind(s.time_to_first_byte_ms)
        .bind(s.warning_threshold_ms)
        .bind(s.critical_threshold_ms)
        .bind(&s.error_type)
        .bind(&s.error_message)
        .bind(s.agent_id)
        .bind(s.monitor_id)
        .fetch_one(&self.pool)
        .await?;

        http_heartbeat_from_row(&row)
    }

    #[instrument(skip_all, fields(service_id = heartbeat.sample.monitored_service_id))]
    async fn insert_service_heartbeat(
        &self,
        heartbeat: NewServiceHeartbeat,
    ) -> StorageResult<ServiceHeartbeat> {
        let executed_at = heartbeat.executed_at.unwrap_or_else(Utc::now);
        let s = heartbeat.sample;

        let row = sqlx::query(
            r#"
            INSERT INTO service_heartbeat (
                executed_at, success, status, response_time_ms, error_message, metadata,
                agent_id, monitored_service_id, service_instance_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Self::timestamp_to_millis(&executed_at))
        .bind(s.success)
        .bind(&s.status)
        .bind(s.response_time_ms)
        .bind(&s.error_message)
        .bind(json_text(s.metadata.as_ref()))
        .bind(s.agent_id)
        .bind(s.monitored_service_id)
        .bind(s.service_instance_id)
        .fetch_one(&self.pool)
        .await?;

        service_heartbeat_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn list_instance_heartbeats(
        &self,
        instance_id: Id,
        heartbeat_type: Option<HeartbeatType>,
        page: PageRequest,
    ) -> StorageResult<Page<InstanceHeartbeat>> {
        let type_filter = heartbeat_type.map(|t| t.to_string());

        let rows = sqlx::query(
            r#"
            SELECT * FROM instance_heartbeat
            WHERE instance_id = ? AND (? IS NULL OR heartbeat_type = ?)
            ORDER BY executed_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(instance_id)
        .bind(&type_filter)
        .bind(&type_filter)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM instance_heartbeat WHERE instance_id = ? AND (? IS NULL OR heartbeat_type = ?)",
        )
        .bind(instance_id)
        .bind(&type_filter)
        .bind(&type_filter)
        .fetch_one(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(instance_heartbeat_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, page))
    }

    #[instrument(skip(self))]
    async fn list_http_heartbeats(&self, monitor_id: Id, page: PageRequest) -> StorageResult<Page<HttpHeartbeat>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM http_heartbeat WHERE monitor_id = ?
            ORDER BY executed_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(monitor_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM http_heartbeat WHERE monitor_id = ?")
            .bind(monitor_id)
            .fetch_one(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(http_heartbeat_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, page))
    }

    #[instrument(skip(self))]
    async fn list_service_heartbeats(
        &self,
        service_id: Id,
        page: PageRequest,
    ) -> StorageResult<Page<ServiceHeartbeat>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM service_heartbeat WHERE monitored_service_id = ?
            ORDER BY executed_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(service_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM service_heartbeat WHERE monitored_service_id = ?")
                .bind(service_id)
                .fetch_one(&self.pool)
                .await?;

        let items = rows
            .iter()
            .map(service_heartbeat_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Page::new(items, total as u64, page))
    }

    #[instrument(skip(self, monitor_ids), fields(monitors = monitor_ids.len()))]
    async fn latest_http_heartbeats(
        &self,
        monitor_ids: &[Id],
        sample_size: u32,
    ) -> StorageResult<Vec<HeartbeatSample>> {
        if monitor_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            WITH ranked AS (
                SELECT
                    h.monitor_id,
                    h.agent_id,
                    a.name AS agent_name,
                    h.success,
                    h.response_time_ms,
                    h.warning_threshold_ms,
                    h.critical_threshold_ms,
                    ROW_NUMBER() OVER (
                        PARTITION BY h.monitor_id, h.agent_id
                        ORDER BY h.executed_at DESC, h.id DESC
                    ) AS rn
                FROM http_heartbeat h
                JOIN agent a ON a.id = h.agent_id
                WHERE h.monitor_id IN ({})
            )
            SELECT monitor_id, agent_id, agent_name, success, response_time_ms,
                   warning_threshold_ms, critical_threshold_ms
            FROM ranked
            WHERE rn <= ?
            ORDER BY monitor_id, agent_name, rn
            "#,
            placeholders(monitor_ids.len())
        );

        let mut query = sqlx::query(&sql);
        for id in monitor_ids {
            query = query.bind(*id);
        }
        let rows = query.bind(i64::from(sample_size)).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(HeartbeatSample {
                    monitor_id: row.try_get("monitor_id")?,
                    agent_id: row.try_get("agent_id")?,
                    agent_name: row.try_get("agent_name")?,
                    success: row.try_get("success")?,
                    response_time_ms: row.try_get("response_time_ms")?,
                    warning_threshold_ms: row.try_get("warning_threshold_ms")?,
                    critical_threshold_ms: row.try_get("critical_threshold_ms")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, HttpMonitor, Instance, NewAgent, NewHttpMonitor, NewInstance};
    use crate::storage::{Repository, StorageBackend};
    use assert_matches::assert_matches;
    use chrono::{DateTime, Duration};

    async fn backend() -> (tempfile::TempDir, SqliteBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap();
        (temp_dir, backend)
    }

    fn http(monitor_id: Id, agent_id: Id, success: bool, ms: i32, at: DateTime<Utc>) -> NewHttpHeartbeat {
        let mut sample = HttpSample::new(monitor_id, success);
        sample.agent_id = Some(agent_id);
        sample.response_time_ms = Some(ms);
        NewHttpHeartbeat {
            executed_at: Some(at),
            sample,
        }
    }

    #[tokio::test]
    async fn test_instance_heartbeat_touches_instance() {
        let (_dir, backend) = backend().await;
        let instance: Instance = backend
            .insert(NewInstance::new("web-1", "web-1.local", "VM", "AGENT"))
            .await
            .unwrap();
        assert!(instance.last_ping_at.is_none());

        let at = Utc::now();
        let stored = backend
            .insert_instance_heartbeat(NewInstanceHeartbeat {
                executed_at: Some(at),
                sample: InstanceSample::new(instance.id, HeartbeatType::Ping, true, "UP"),
            })
            .await
            .unwrap();
        assert_eq!(stored.executed_at.timestamp_millis(), at.timestamp_millis());

        let instance: Instance = backend.get(instance.id).await.unwrap().unwrap();
        assert_eq!(instance.last_ping_at.map(|t| t.timestamp_millis()), Some(at.timestamp_millis()));
        assert!(instance.last_hardware_check_at.is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_for_missing_instance_is_rejected() {
        let (_dir, backend) = backend().await;

        let result = backend
            .insert_instance_heartbeat(NewInstanceHeartbeat {
                executed_at: None,
                sample: InstanceSample::new(77, HeartbeatType::Hardware, true, "UP"),
            })
            .await;
        assert_matches!(result, Err(StorageError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_instance_heartbeats_filter_by_type() {
        let (_dir, backend) = backend().await;
        let instance: Instance = backend
            .insert(NewInstance::new("web-1", "web-1.local", "VM", "AGENT"))
            .await
            .unwrap();

        for heartbeat_type in [HeartbeatType::Ping, HeartbeatType::Hardware, HeartbeatType::Ping] {
            backend
                .insert_instance_heartbeat(NewInstanceHeartbeat {
                    executed_at: None,
                    sample: InstanceSample::new(instance.id, heartbeat_type, true, "UP"),
                })
                .await
                .unwrap();
        }

        let all = backend
            .list_instance_heartbeats(instance.id, None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.total, 3);

        let pings = backend
            .list_instance_heartbeats(instance.id, Some(HeartbeatType::Ping), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(pings.total, 2);
        assert!(pings.items.iter().all(|h| h.sample.heartbeat_type == HeartbeatType::Ping));
    }

    #[tokio::test]
    async fn test_latest_http_heartbeats_per_agent() {
        let (_dir, backend) = backend().await;
        let monitor: HttpMonitor = backend
            .insert(NewHttpMonitor::new("api", "http://localhost"))
            .await
            .unwrap();
        let berlin: Agent = backend.insert(NewAgent::named("berlin")).await.unwrap();
        let austin: Agent = backend.insert(NewAgent::named("austin")).await.unwrap();

        let base = Utc::now() - Duration::minutes(10);
        for i in 0..5 {
            let at = base + Duration::seconds(i);
            // the oldest two berlin samples fail
            backend
                .insert_http_heartbeat(http(monitor.id, berlin.id, i >= 2, 100, at))
                .await
                .unwrap();
            backend
                .insert_http_heartbeat(http(monitor.id, austin.id, true, 300, at))
                .await
                .unwrap();
        }

        let samples = backend.latest_http_heartbeats(&[monitor.id], 3).await.unwrap();
        assert_eq!(samples.len(), 6);
        assert_eq!(samples[0].agent_name, "austin");
        assert!(samples.iter().filter(|s| s.agent_id == berlin.id).all(|s| s.success));

        assert!(backend.latest_http_heartbeats(&[], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_heartbeats() {
        let (_dir, backend) = backend().await;
        let monitor: HttpMonitor = backend
            .insert(NewHttpMonitor::new("api", "http://localhost"))
            .await
            .unwrap();
        let agent: Agent = backend.insert(NewAgent::named("edge")).await.unwrap();

        let now = Utc::now();
        backend
            .insert_http_heartbeat(http(monitor.id, agent.id, true, 10, now - Duration::days(40)))
            .await
            .unwrap();
        backend
            .insert_http_heartbeat(http(monitor.id, agent.id, true, 10, now))
            .await
            .unwrap();

        let deleted = backend.cleanup_heartbeats(now - Duration::days(30)).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = backend
            .list_http_heartbeats(monitor.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(remaining.total, 1);
    }
}
