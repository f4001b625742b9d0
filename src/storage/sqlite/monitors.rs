use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{SqlRecord, SqliteQuery, json_col, json_text, time_col};
use crate::model::{
    HttpMonitor, MonitoredService, NewHttpMonitor, NewMonitoredService, NewServiceInstance, ServiceInstance,
};
use crate::storage::error::StorageResult;

impl SqlRecord for HttpMonitor {
    const TABLE: &'static str = "http_monitor";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "method",
        "monitor_type",
        "url",
        "headers",
        "body",
        "interval_seconds",
        "timeout_seconds",
        "retry_count",
        "retry_delay_seconds",
        "response_time_warning_ms",
        "response_time_critical_ms",
        "uptime_warning_percent",
        "uptime_critical_percent",
        "ignore_tls_error",
        "max_redirects",
        "description",
        "tags",
        "enabled",
        "expected_status_codes",
        "parent_id",
    ];

    fn bind_fields<'q>(f: &NewHttpMonitor, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(f.name.clone())
            .bind(f.method.clone())
            .bind(f.monitor_type.clone())
            .bind(f.url.clone())
            .bind(json_text(f.headers.as_ref()))
            .bind(json_text(f.body.as_ref()))
            .bind(f.interval_seconds)
            .bind(f.timeout_seconds)
            .bind(f.retry_count)
            .bind(f.retry_delay_seconds)
            .bind(f.response_time_warning_ms)
            .bind(f.response_time_critical_ms)
            .bind(f.uptime_warning_percent)
            .bind(f.uptime_critical_percent)
            .bind(f.ignore_tls_error)
            .bind(f.max_redirects)
            .bind(f.description.clone())
            .bind(json_text(f.tags.as_ref()))
            .bind(f.enabled)
            .bind(f.expected_status_codes.clone())
            .bind(f.parent_id)
    }

    fn from_row(row: &SqliteRow) -> StorageResult<Self> {
        Ok(HttpMonitor {
            id: row.try_get("id")?,
            fields: NewHttpMonitor {
                name: row.try_get("name")?,
                method: row.try_get("method")?,
                monitor_type: row.try_get("monitor_type")?,
                url: row.try_get("url")?,
                headers: json_col(row, "headers")?,
                body: json_col(row, "body")?,
                interval_seconds: row.try_get("interval_seconds")?,
                timeout_seconds: row.try_get("timeout_seconds")?,
                retry_count: row.try_get("retry_count")?,
                retry_delay_seconds: row.try_get("retry_delay_seconds")?,
                response_time_warning_ms: row.try_get("response_time_warning_ms")?,
                response_time_critical_ms: row.try_get("response_time_critical_ms")?,
                uptime_warning_percent: row.try_get("uptime_warning_percent")?,
                uptime_critical_percent: row.try_get("uptime_critical_percent")?,
                ignore_tls_error: row.try_get("ignore_tls_error")?,
                max_redirects: row.try_get("max_redirects")?,
                description: row.try_get("description")?,
                tags: json_col(row, "tags")?,
                enabled: row.try_get("enabled")?,
                expected_status_codes: row.try_get("expected_status_codes")?,
                parent_id: row.try_get("parent_id")?,
            },
        })
    }
}

impl SqlRecord for MonitoredService {
    const TABLE: &'static str = "monitored_service";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "service_type",
        "environment",
        "monitoring_enabled",
        "cluster_monitoring_enabled",
        "interval_seconds",
        "timeout_ms",
        "retry_count",
        "latency_warning_ms",
        "latency_critical_ms",
        "advanced_config",
        "is_active",
        "datacenter_id",
    ];
    const TIMESTAMPED: bool = true;

    fn bind_fields<'q>(f: &NewMonitoredService, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(f.name.clone())
            .bind(f.description.clone())
            .bind(f.service_type.clone())
            .bind(f.environment.clone())
            .bind(f.monitoring_enabled)
            .bind(f.cluster_monitoring_enabled)
            .bind(f.interval_seconds)
            .bind(f.timeout_ms)
            .bind(f.retry_count)
            .bind(f.latency_warning_ms)
            .bind(f.latency_critical_ms)
            .bind(json_text(f.advanced_config.as_ref()))
            .bind(f.is_active)
            .bind(f.datacenter_id)
    }

    fn from_row(row: &SqliteRow) -> StorageResult<Self> {
        Ok(MonitoredService {
            id: row.try_get("id")?,
            fields: NewMonitoredService {
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                service_type: row.try_get("service_type")?,
                environment: row.try_get("environment")?,
                monitoring_enabled: row.try_get("monitoring_enabled")?,
                cluster_monitoring_enabled: row.try_get("cluster_monitoring_enabled")?,
                interval_seconds: row.try_get("interval_seconds")?,
                timeout_ms: row.try_get("timeout_ms")?,
                retry_count: row.try_get("retry_count")?,
                latency_warning_ms: row.try_get("latency_warning_ms")?,
                latency_critical_ms: row.try_get("latency_critical_ms")?,
                advanced_config: json_col(row, "advanced_config")?,
                is_active: row.try_get("is_active")?,
                datacenter_id: row.try_get("datacenter_id")?,
            },
            created_at: time_col(row, "created_at")?,
            updated_at: time_col(row, "updated_at")?,
        })
    }
}

impl SqlRecord for ServiceInstance {
    const TABLE: &'static str = "service_instance";
    const COLUMNS: &'static [&'static str] = &["port", "is_active", "instance_id", "monitored_service_id"];
    const TIMESTAMPED: bool = true;

    fn bind_fields<'q>(f: &NewServiceInstance, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(f.port)
            .bind(f.is_active)
            .bind(f.instance_id)
            .bind(f.monitored_service_id)
    }

    fn from_row(row: &SqliteRow) -> StorageResult<Self> {
        Ok(ServiceInstance {
            id: row.try_get("id")?,
            fields: NewServiceInstance {
                port: row.try_get("port")?,
                is_active: row.try_get("is_active")?,
                instance_id: row.try_get("instance_id")?,
                monitored_service_id: row.try_get("monitored_service_id")?,
            },
            created_at: time_col(row, "created_at")?,
            updated_at: time_col(row, "updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::SqliteBackend;
    use super::*;
    use crate::model::Entity;
    use crate::storage::Repository;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_monitor_json_columns_survive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap();

        let mut fields = NewHttpMonitor::new("login", "https://example.com/login");
        fields.method = "POST".to_string();
        fields.headers = Some(json!({"Content-Type": "application/json"}));
        fields.body = Some(json!({"user": "edge"}));
        fields.expected_status_codes = Some("200,401".to_string());

        let monitor: HttpMonitor = backend.insert(fields.clone()).await.unwrap();
        assert_eq!(monitor.fields, fields);
    }

    #[tokio::test]
    async fn test_service_timestamps_are_managed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap();

        let service: MonitoredService = backend
            .insert(NewMonitoredService::new("orders-db", "POSTGRES", "prod"))
            .await
            .unwrap();
        assert_eq!(service.created_at, service.updated_at);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let mut changed = service.clone();
        changed.fields_mut().environment = "staging".to_string();
        let updated = backend.update(&changed).await.unwrap();

        assert_eq!(updated.created_at, service.created_at);
        assert!(updated.updated_at > service.updated_at);
        assert_eq!(updated.fields.environment, "staging");
    }
}
