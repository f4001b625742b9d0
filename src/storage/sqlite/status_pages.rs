use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};

use super::{SqlRecord, SqliteBackend, SqliteQuery, json_col, json_text, opt_time_col, time_col};
use crate::model::{
    Id, NewStatusDependency, NewStatusPage, NewStatusPageItem, StatusDependency, StatusItemType, StatusPage,
    StatusPageItem, StatusPageSettings,
};
use crate::storage::backend::StatusPageStore;
use crate::storage::error::{StorageError, StorageResult};

impl SqlRecord for StatusPage {
    const TABLE: &'static str = "status_page";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "slug",
        "description",
        "is_public",
        "is_active",
        "is_home_page",
        "allowed_roles",
    ];
    const TIMESTAMPED: bool = true;

    fn bind_fields<'q>(f: &NewStatusPage, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(f.name.clone())
            .bind(f.slug.clone())
            .bind(f.description.clone())
            .bind(f.is_public)
            .bind(f.is_active)
            .bind(f.is_home_page)
            .bind(f.allowed_roles.clone())
    }

    fn from_row(row: &SqliteRow) -> StorageResult<Self> {
        Ok(StatusPage {
            id: row.try_get("id")?,
            fields: NewStatusPage {
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                description: row.try_get("description")?,
                is_public: row.try_get("is_public")?,
                is_active: row.try_get("is_active")?,
                is_home_page: row.try_get("is_home_page")?,
                allowed_roles: row.try_get("allowed_roles")?,
            },
            created_at: time_col(row, "created_at")?,
            updated_at: time_col(row, "updated_at")?,
        })
    }
}

fn item_from_row(row: &SqliteRow) -> StorageResult<StatusPageItem> {
    let item_type: String = row.try_get("item_type")?;
    let item_type = StatusItemType::parse(&item_type)
        .ok_or_else(|| StorageError::SerializationError(format!("unknown status item type '{item_type}'")))?;

    Ok(StatusPageItem {
        id: row.try_get("id")?,
        status_page_id: row.try_get("status_page_id")?,
        fields: NewStatusPageItem {
            item_type,
            item_id: row.try_get("item_id")?,
            display_order: row.try_get("display_order")?,
        },
        created_at: opt_time_col(row, "created_at")?,
    })
}

fn dependency_from_row(row: &SqliteRow) -> StorageResult<StatusDependency> {
    Ok(StatusDependency {
        id: row.try_get("id")?,
        status_page_id: row.try_get("status_page_id")?,
        fields: NewStatusDependency {
            parent_type: row.try_get("parent_type")?,
            parent_id: row.try_get("parent_id")?,
            child_type: row.try_get("child_type")?,
            child_id: row.try_get("child_id")?,
            metadata: json_col(row, "metadata")?,
        },
        created_at: time_col(row, "created_at")?,
    })
}

fn settings_from_row(row: &SqliteRow) -> StorageResult<StatusPageSettings> {
    Ok(StatusPageSettings {
        status_page_id: row.try_get("status_page_id")?,
        logo_url: row.try_get("logo_url")?,
        theme_color: row.try_get("theme_color")?,
        header_text: row.try_get("header_text")?,
        footer_text: row.try_get("footer_text")?,
        show_response_times: row.try_get("show_response_times")?,
        show_uptime_percentage: row.try_get("show_uptime_percentage")?,
        auto_refresh_seconds: row.try_get("auto_refresh_seconds")?,
        sample_size: row.try_get("sample_size")?,
        success_threshold_high: row.try_get("success_threshold_high")?,
        success_threshold_low: row.try_get("success_threshold_low")?,
        warning_threshold_ms: row.try_get("warning_threshold_ms")?,
        critical_threshold_ms: row.try_get("critical_threshold_ms")?,
    })
}

#[async_trait]
impl StatusPageStore for SqliteBackend {
    #[instrument(skip(self))]
    async fn find_status_page_by_slug(&self, slug: &str) -> StorageResult<Option<StatusPage>> {
        let row = sqlx::query("SELECT * FROM status_page WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(StatusPage::from_row).transpose()
    }

    async fn list_status_page_items(&self, page_id: Id) -> StorageResult<Vec<StatusPageItem>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM status_page_item
            WHERE status_page_id = ?
            ORDER BY COALESCE(display_order, 2147483647), id
            "#,
        )
        .bind(page_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self, item, now))]
    async fn insert_status_page_item(
        &self,
        page_id: Id,
        item: NewStatusPageItem,
        now: DateTime<Utc>,
    ) -> StorageResult<StatusPageItem> {
        let row = sqlx::query(
            r#"
            INSERT INTO status_page_item (item_type, item_id, display_order, created_at, status_page_id)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(item.item_type.as_str())
        .bind(item.item_id)
        .bind(item.display_order)
        .bind(Self::timestamp_to_millis(&now))
        .bind(page_id)
        .fetch_one(&self.pool)
        .await?;

        debug!("added {} {} to status page {}", item.item_type, item.item_id, page_id);
        item_from_row(&row)
    }

    async fn delete_status_page_item(&self, id: Id) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM status_page_item WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_status_dependencies(&self, page_id: Id) -> StorageResult<Vec<StatusDependency>> {
        let rows = sqlx::query("SELECT * FROM status_dependency WHERE status_page_id = ? ORDER BY id")
            .bind(page_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(dependency_from_row).collect()
    }

    #[instrument(skip(self, dependency, now))]
    async fn insert_status_dependency(
        &self,
        page_id: Id,
        dependency: NewStatusDependency,
        now: DateTime<Utc>,
    ) -> StorageResult<StatusDependency> {
        let row = sqlx::query(
            r#"
            INSERT INTO status_dependency (
                parent_type, parent_id, child_type, child_id, metadata, created_at, status_page_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&dependency.parent_type)
        .bind(dependency.parent_id)
        .bind(&dependency.child_type)
        .bind(dependency.child_id)
        .bind(json_text(dependency.metadata.as_ref()))
        .bind(Self::timestamp_to_millis(&now))
        .bind(page_id)
        .fetch_one(&self.pool)
        .await?;

        dependency_from_row(&row)
    }

    async fn delete_status_dependency(&self, id: Id) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM status_dependency WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_status_page_settings(&self, page_id: Id) -> StorageResult<Option<StatusPageSettings>> {
        let row = sqlx::query("SELECT * FROM status_page_settings WHERE status_page_id = ?")
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(settings_from_row).transpose()
    }

    #[instrument(skip_all, fields(page_id = settings.status_page_id))]
    async fn upsert_status_page_settings(
        &self,
        settings: StatusPageSettings,
    ) -> StorageResult<StatusPageSettings> {
        let row = sqlx::query(
            r#"
            INSERT INTO status_page_settings (
                status_page_id, logo_url, theme_color, header_text, footer_text,
                show_response_times, show_uptime_percentage, auto_refresh_seconds, sample_size,
                success_threshold_high, success_threshold_low, warning_threshold_ms, critical_threshold_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (status_page_id) DO UPDATE SET
                logo_url = excluded.logo_url,
                theme_color = excluded.theme_color,
                header_text = excluded.header_text,
                footer_text = excluded.footer_text,
                show_response_times = excluded.show_response_times,
                show_uptime_percentage = excluded.show_uptime_percentage,
                auto_refresh_seconds = excluded.auto_refresh_seconds,
                sample_size = excluded.sample_size,
                success_threshold_high = excluded.success_threshold_high,
                success_threshold_low = excluded.success_threshold_low,
                warning_threshold_ms = excluded.warning_threshold_ms,
                critical_threshold_ms = excluded.critical_threshold_ms
            RETURNING *
            "#,
        )
        .bind(settings.status_page_id)
        .bind(&settings.logo_url)
        .bind(&settings.theme_color)
        .bind(&settings.header_text)
        .bind(&settings.footer_text)
        .bind(settings.show_response_times)
        .bind(settings.show_uptime_percentage)
        .bind(settings.auto_refresh_seconds)
        .bind(settings.sample_size)
        .bind(settings.success_threshold_high)
        .bind(settings.success_threshold_low)
        .bind(settings.warning_threshold_ms)
        .bind(settings.critical_threshold_ms)
        .fetch_one(&self.pool)
        .await?;

        settings_from_row(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Repository;
    use assert_matches::assert_matches;

    async fn backend_with_page() -> (tempfile::TempDir, SqliteBackend, StatusPage) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap();
        let page: StatusPage = backend
            .insert(NewStatusPage::new("Public", "public", true))
            .await
            .unwrap();
        (temp_dir, backend, page)
    }

    fn item(item_type: StatusItemType, item_id: Id, display_order: Option<i32>) -> NewStatusPageItem {
        NewStatusPageItem {
            item_type,
            item_id,
            display_order,
        }
    }

    #[tokio::test]
    async fn test_find_by_slug() {
        let (_dir, backend, page) = backend_with_page().await;

        let found = backend.find_status_page_by_slug("public").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(page.id));
        assert!(backend.find_status_page_by_slug("missing").await.unwrap().is_none());

        let duplicate: StorageResult<StatusPage> =
            backend.insert(NewStatusPage::new("Other", "public", false)).await;
        assert_matches!(duplicate, Err(StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_items_follow_display_order() {
        let (_dir, backend, page) = backend_with_page().await;
        let now = Utc::now();

        backend
            .insert_status_page_item(page.id, item(StatusItemType::Service, 1, None), now)
            .await
            .unwrap();
        backend
            .insert_status_page_item(page.id, item(StatusItemType::HttpMonitor, 2, Some(2)), now)
            .await
            .unwrap();
        backend
            .insert_status_page_item(page.id, item(StatusItemType::Http, 3, Some(1)), now)
            .await
            .unwrap();

        let items = backend.list_status_page_items(page.id).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.fields.item_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(items[0].fields.item_type, StatusItemType::Http);
    }

    #[tokio::test]
    async fn test_items_removed_with_page() {
        let (_dir, backend, page) = backend_with_page().await;
        backend
            .insert_status_page_item(page.id, item(StatusItemType::Http, 1, None), Utc::now())
            .await
            .unwrap();

        assert!(Repository::<StatusPage>::delete(&backend, page.id).await.unwrap());
        assert!(backend.list_status_page_items(page.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dependencies() {
        let (_dir, backend, page) = backend_with_page().await;

        let dependency = backend
            .insert_status_dependency(
                page.id,
                NewStatusDependency {
                    parent_type: "SERVICE".to_string(),
                    parent_id: 1,
                    child_type: "HTTP".to_string(),
                    child_id: 2,
                    metadata: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(dependency.status_page_id, Some(page.id));

        assert_eq!(backend.list_status_dependencies(page.id).await.unwrap().len(), 1);
        assert!(backend.delete_status_dependency(dependency.id).await.unwrap());
        assert!(backend.list_status_dependencies(page.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_upsert_replaces() {
        let (_dir, backend, page) = backend_with_page().await;
        assert!(backend.get_status_page_settings(page.id).await.unwrap().is_none());

        let mut settings = StatusPageSettings {
            status_page_id: page.id,
            sample_size: Some(10),
            theme_color: Some("#112233".to_string()),
            ..Default::default()
        };
        backend.upsert_status_page_settings(settings.clone()).await.unwrap();

        settings.sample_size = Some(5);
        settings.theme_color = None;
        let stored = backend.upsert_status_page_settings(settings.clone()).await.unwrap();
        assert_eq!(stored, settings);
        assert_eq!(backend.get_status_page_settings(page.id).await.unwrap(), Some(settings));
    }
}
