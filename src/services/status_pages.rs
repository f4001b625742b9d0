//! Status page children and the public health view
//!
//! Pages themselves are inventory records managed by
//! [`InventoryService`](super::InventoryService). This service owns their
//! items, dependencies and settings, and computes the public view.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use super::audit::{AuditService, snapshot};
use super::error::{ServiceError, ServiceResult};
use crate::model::{
    Actor, AuditAction, HeartbeatSample, HttpMonitor, Id, Instance, MonitorHealth, MonitorStatus, MonitoredService,
    NewStatusDependency, NewStatusPageItem, PublicStatusPage, RegionHealth, StatusDependency, StatusItemType,
    StatusPage, StatusPageItem, StatusPageSettings, StatusThresholds, Validate,
};
use crate::storage::{HeartbeatStore, Repository, SqliteBackend, StatusPageStore};

/// Health of one (monitor, agent) group
pub fn classify(success_rate: f64, avg_response_ms: f64, thresholds: &StatusThresholds) -> MonitorHealth {
    if success_rate < thresholds.success_threshold_low {
        MonitorHealth::Down
    } else if success_rate < thresholds.success_threshold_high {
        MonitorHealth::Warning
    } else if avg_response_ms > f64::from(thresholds.critical_threshold_ms) {
        MonitorHealth::Critical
    } else if avg_response_ms > f64::from(thresholds.warning_threshold_ms) {
        MonitorHealth::Warning
    } else {
        MonitorHealth::Up
    }
}

fn region_health(agent_name: &str, samples: &[&HeartbeatSample], defaults: &StatusThresholds) -> RegionHealth {
    let total = samples.len().max(1) as f64;
    let successes = samples.iter().filter(|s| s.success).count() as f64;
    let success_rate = successes / total;

    let timings: Vec<f64> = samples
        .iter()
        .filter_map(|s| s.response_time_ms)
        .map(f64::from)
        .collect();
    let avg = if timings.is_empty() {
        0.0
    } else {
        timings.iter().sum::<f64>() / timings.len() as f64
    };

    // heartbeat thresholds win; the strictest in the group applies
    let thresholds = StatusThresholds {
        warning_threshold_ms: samples
            .iter()
            .filter_map(|s| s.warning_threshold_ms)
            .min()
            .unwrap_or(defaults.warning_threshold_ms),
        critical_threshold_ms: samples
            .iter()
            .filter_map(|s| s.critical_threshold_ms)
            .min()
            .unwrap_or(defaults.critical_threshold_ms),
        ..*defaults
    };

    RegionHealth {
        status: classify(success_rate, avg, &thresholds),
        response_time_ms: avg.round() as i64,
        agent_name: agent_name.to_string(),
        success_rate: (success_rate * 100.0).round() as i64,
    }
}

/// Groups `samples` per monitor and agent.
///
/// Returns the agent names in first-seen order and one status per monitor,
/// in the order of `monitors`.
pub fn aggregate(
    monitors: &[HttpMonitor],
    samples: &[HeartbeatSample],
    thresholds: &StatusThresholds,
) -> (Vec<String>, Vec<MonitorStatus>) {
    let mut by_monitor: HashMap<Id, Vec<&HeartbeatSample>> = HashMap::new();
    for sample in samples {
        by_monitor.entry(sample.monitor_id).or_default().push(sample);
    }

    let mut regions: Vec<String> = Vec::new();
    let mut statuses = Vec::with_capacity(monitors.len());

    for monitor in monitors {
        let mut groups: Vec<(&str, Vec<&HeartbeatSample>)> = Vec::new();
        for &sample in by_monitor.get(&monitor.id).into_iter().flatten() {
            match groups.iter_mut().find(|(name, _)| *name == sample.agent_name) {
                Some((_, group)) => group.push(sample),
                None => groups.push((sample.agent_name.as_str(), vec![sample])),
            }
        }

        let mut health = BTreeMap::new();
        for (agent_name, group) in groups {
            if !regions.iter().any(|r| r == agent_name) {
                regions.push(agent_name.to_string());
            }
            health.insert(agent_name.to_string(), region_health(agent_name, &group, thresholds));
        }

        statuses.push(MonitorStatus {
            monitor_id: monitor.id,
            monitor_name: monitor.fields.name.clone(),
            url: monitor.fields.url.clone(),
            region_health: health,
        });
    }

    (regions, statuses)
}

#[derive(Clone)]
pub struct StatusPageService {
    storage: Arc<SqliteBackend>,
    audit: AuditService,
    defaults: StatusThresholds,
}

impl StatusPageService {
    pub fn new(storage: Arc<SqliteBackend>, defaults: StatusThresholds) -> Self {
        Self {
            audit: AuditService::new(storage.clone()),
            storage,
            defaults,
        }
    }

    async fn page(&self, id: Id) -> ServiceResult<StatusPage> {
        Repository::<StatusPage>::get(&*self.storage, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("StatusPage", id))
    }

    async fn require_item_target(&self, item: &NewStatusPageItem) -> ServiceResult<()> {
        let id = item.item_id;
        let exists = match item.item_type {
            StatusItemType::Http | StatusItemType::HttpMonitor => {
                Repository::<HttpMonitor>::get(&*self.storage, id).await?.is_some()
            }
            StatusItemType::Service => Repository::<MonitoredService>::get(&*self.storage, id).await?.is_some(),
            StatusItemType::Instance => Repository::<Instance>::get(&*self.storage, id).await?.is_some(),
        };
        if !exists {
            return Err(ServiceError::invalid(
                "itemId",
                format!("{} {} does not exist", item.item_type, id),
            ));
        }
        Ok(())
    }

    pub async fn list_items(&self, page_id: Id) -> ServiceResult<Vec<StatusPageItem>> {
        self.page(page_id).await?;
        Ok(self.storage.list_status_page_items(page_id).await?)
    }

    #[instrument(skip(self, item, actor), fields(item_type = %item.item_type, item_id = item.item_id))]
    pub async fn add_item(&self, page_id: Id, item: NewStatusPageItem, actor: &Actor) -> ServiceResult<StatusPageItem> {
        self.page(page_id).await?;
        self.require_item_target(&item).await?;

        let stored = self.storage.insert_status_page_item(page_id, item, Utc::now()).await?;
        self.audit
            .record(AuditAction::Create, "StatusPageItem", stored.id, None, snapshot(&stored), actor)
            .await?;
        Ok(stored)
    }

    pub async fn remove_item(&self, id: Id, actor: &Actor) -> ServiceResult<()> {
        if !self.storage.delete_status_page_item(id).await? {
            return Err(ServiceError::not_found("StatusPageItem", id));
        }
        self.audit
            .record(AuditAction::Delete, "StatusPageItem", id, None, None, actor)
            .await?;
        Ok(())
    }

    pub async fn list_dependencies(&self, page_id: Id) -> ServiceResult<Vec<StatusDependency>> {
        self.page(page_id).await?;
        Ok(self.storage.list_status_dependencies(page_id).await?)
    }

    pub async fn add_dependency(
        &self,
        page_id: Id,
        dependency: NewStatusDependency,
        actor: &Actor,
    ) -> ServiceResult<StatusDependency> {
        dependency.validate()?;
        self.page(page_id).await?;

        let stored = self
            .storage
            .insert_status_dependency(page_id, dependency, Utc::now())
            .await?;
        self.audit
            .record(AuditAction::Create, "StatusDependency", stored.id, None, snapshot(&stored), actor)
            .await?;
        Ok(stored)
    }

    pub async fn remove_dependency(&self, id: Id, actor: &Actor) -> ServiceResult<()> {
        if !self.storage.delete_status_dependency(id).await? {
            return Err(ServiceError::not_found("StatusDependency", id));
        }
        self.audit
            .record(AuditAction::Delete, "StatusDependency", id, None, None, actor)
            .await?;
        Ok(())
    }

    /// Stored settings, or empty settings when none were saved
    pub async fn settings(&self, page_id: Id) -> ServiceResult<StatusPageSettings> {
        self.page(page_id).await?;
        Ok(self
            .storage
            .get_status_page_settings(page_id)
            .await?
            .unwrap_or_else(|| StatusPageSettings {
                status_page_id: page_id,
                ..Default::default()
            }))
    }

    pub async fn save_settings(
        &self,
        page_id: Id,
        mut settings: StatusPageSettings,
        actor: &Actor,
    ) -> ServiceResult<StatusPageSettings> {
        settings.validate()?;
        self.page(page_id).await?;
        settings.status_page_id = page_id;

        let before = self.storage.get_status_page_settings(page_id).await?;
        let stored = self.storage.upsert_status_page_settings(settings).await?;
        let action = if before.is_some() {
            AuditAction::Update
        } else {
            AuditAction::Create
        };
        self.audit
            .record(
                action,
                "StatusPageSettings",
                page_id,
                before.as_ref().and_then(snapshot),
                snapshot(&stored),
                actor,
            )
            .await?;
        Ok(stored)
    }

    /// The anonymous view of a public page
    #[instrument(skip(self))]
    pub async fn public_view(&self, slug: &str) -> ServiceResult<PublicStatusPage> {
        let page = self
            .storage
            .find_status_page_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("StatusPage '{slug}' not found")))?;
        if !page.fields.is_public {
            return Err(ServiceError::Forbidden(format!("StatusPage '{slug}' is not public")));
        }

        let settings = self.storage.get_status_page_settings(page.id).await?.unwrap_or_default();
        let thresholds = self.defaults.merged_with(&settings);

        let mut monitor_ids: Vec<Id> = Vec::new();
        for item in self.storage.list_status_page_items(page.id).await? {
            if item.fields.item_type.is_http() && !monitor_ids.contains(&item.fields.item_id) {
                monitor_ids.push(item.fields.item_id);
            }
        }

        let (regions, monitors) = if monitor_ids.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let monitors: Vec<HttpMonitor> = self.storage.get_many(&monitor_ids).await?;
            let samples = self
                .storage
                .latest_http_heartbeats(&monitor_ids, thresholds.sample_size)
                .await?;
            debug!("aggregating {} samples over {} monitors", samples.len(), monitors.len());
            aggregate(&monitors, &samples, &thresholds)
        };

        Ok(PublicStatusPage {
            name: page.fields.name,
            slug: page.fields.slug,
            description: page.fields.description,
            logo_url: settings.logo_url,
            theme_color: settings.theme_color,
            header_text: settings.header_text,
            footer_text: settings.footer_text,
            show_response_times: settings.show_response_times.unwrap_or(true),
            show_uptime_percentage: settings.show_uptime_percentage.unwrap_or(true),
            auto_refresh_seconds: settings.auto_refresh_seconds,
            regions,
            monitors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Agent, HttpSample, NewAgent, NewHttpHeartbeat, NewHttpMonitor, NewStatusPage,
    };
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn sample(monitor_id: Id, agent: &str, success: bool, ms: i32) -> HeartbeatSample {
        HeartbeatSample {
            monitor_id,
            agent_id: agent.len() as Id,
            agent_name: agent.to_string(),
            success,
            response_time_ms: Some(ms),
            warning_threshold_ms: None,
            critical_threshold_ms: None,
        }
    }

    fn monitor(id: Id, name: &str) -> HttpMonitor {
        HttpMonitor {
            id,
            fields: NewHttpMonitor::new(name, format!("https://{name}.example")),
        }
    }

    #[test]
    fn test_classification_order() {
        let t = StatusThresholds::default();
        assert_eq!(classify(0.5, 10.0, &t), MonitorHealth::Down);
        assert_eq!(classify(0.7, 10.0, &t), MonitorHealth::Warning);
        // a low rate wins over latency
        assert_eq!(classify(0.7, 5000.0, &t), MonitorHealth::Warning);
        assert_eq!(classify(0.9, 1500.0, &t), MonitorHealth::Critical);
        assert_eq!(classify(0.9, 600.0, &t), MonitorHealth::Warning);
        assert_eq!(classify(1.0, 500.0, &t), MonitorHealth::Up);
        assert_eq!(classify(0.8, 100.0, &t), MonitorHealth::Up);
    }

    #[test]
    fn test_aggregate_groups_per_agent() {
        let monitors = [monitor(2, "api"), monitor(1, "web")];
        let samples = vec![
            sample(1, "eu-edge", true, 100),
            sample(1, "eu-edge", false, 300),
            sample(2, "us-edge", true, 120),
            sample(2, "eu-edge", true, 80),
            sample(2, "us-edge", true, 140),
        ];

        let (regions, statuses) = aggregate(&monitors, &samples, &StatusThresholds::default());

        assert_eq!(regions, vec!["us-edge".to_string(), "eu-edge".to_string()]);
        assert_eq!(statuses[0].monitor_name, "api");
        assert_eq!(statuses[1].monitor_name, "web");

        let us = &statuses[0].region_health["us-edge"];
        assert_eq!(us.status, MonitorHealth::Up);
        assert_eq!(us.response_time_ms, 130);
        assert_eq!(us.success_rate, 100);

        let eu = &statuses[1].region_health["eu-edge"];
        assert_eq!(eu.status, MonitorHealth::Down);
        assert_eq!(eu.success_rate, 50);
        assert_eq!(eu.response_time_ms, 200);
    }

    #[test]
    fn test_heartbeat_thresholds_take_the_minimum() {
        let mut fast = sample(1, "edge", true, 300);
        fast.warning_threshold_ms = Some(400);
        let mut strict = sample(1, "edge", true, 300);
        strict.warning_threshold_ms = Some(250);

        let (_, statuses) = aggregate(&[monitor(1, "web")], &[fast, strict], &StatusThresholds::default());
        assert_eq!(statuses[0].region_health["edge"].status, MonitorHealth::Warning);
    }

    #[test]
    fn test_monitor_without_heartbeats_has_no_regions() {
        let (regions, statuses) = aggregate(&[monitor(1, "web")], &[], &StatusThresholds::default());
        assert!(regions.is_empty());
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].region_health.is_empty());
    }

    async fn service() -> (tempfile::TempDir, Arc<SqliteBackend>, StatusPageService) {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteBackend::new(temp_dir.path().join("test.db")).await.unwrap());
        let service = StatusPageService::new(storage.clone(), StatusThresholds::default());
        (temp_dir, storage, service)
    }

    #[tokio::test]
    async fn test_public_view_visibility() {
        let (_dir, storage, pages) = service().await;
        let _: StatusPage = storage.insert(NewStatusPage::new("Internal", "internal", false)).await.unwrap();

        assert_matches!(pages.public_view("missing").await, Err(ServiceError::NotFound(_)));
        assert_matches!(pages.public_view("internal").await, Err(ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_public_view_aggregates_heartbeats() {
        let (_dir, storage, pages) = service().await;
        let actor = Actor::system();

        let page: StatusPage = storage.insert(NewStatusPage::new("Main", "main", true)).await.unwrap();
        let monitor: HttpMonitor = storage.insert(NewHttpMonitor::new("api", "https://api.example")).await.unwrap();
        let agent: Agent = storage.insert(NewAgent::named("fra-edge")).await.unwrap();

        pages
            .add_item(
                page.id,
                NewStatusPageItem {
                    item_type: StatusItemType::HttpMonitor,
                    item_id: monitor.id,
                    display_order: Some(1),
                },
                &actor,
            )
            .await
            .unwrap();

        for ms in [100, 200] {
            let mut sample = HttpSample::new(monitor.id, true);
            sample.response_time_ms = Some(ms);
            sample.agent_id = Some(agent.id);
            storage
                .insert_http_heartbeat(NewHttpHeartbeat {
                    executed_at: Some(Utc::now()),
                    sample,
                })
                .await
                .unwrap();
        }

        let view = pages.public_view("main").await.unwrap();
        assert_eq!(view.regions, vec!["fra-edge".to_string()]);
        assert_eq!(view.monitors.len(), 1);
        let health = &view.monitors[0].region_health["fra-edge"];
        assert_eq!(health.status, MonitorHealth::Up);
        assert_eq!(health.response_time_ms, 150);
        assert_eq!(health.success_rate, 100);
    }

    #[tokio::test]
    async fn test_items_must_reference_existing_targets() {
        let (_dir, storage, pages) = service().await;
        let page: StatusPage = storage.insert(NewStatusPage::new("Main", "main", true)).await.unwrap();

        let result = pages
            .add_item(
                page.id,
                NewStatusPageItem {
                    item_type: StatusItemType::Service,
                    item_id: 99,
                    display_order: None,
                },
                &Actor::system(),
            )
            .await;
        assert_matches!(result, Err(ServiceError::Validation(_)));
        assert_matches!(pages.list_items(404).await, Err(ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_settings_default_then_saved() {
        let (_dir, storage, pages) = service().await;
        let page: StatusPage = storage.insert(NewStatusPage::new("Main", "main", true)).await.unwrap();

        let empty = pages.settings(page.id).await.unwrap();
        assert_eq!(empty.status_page_id, page.id);
        assert!(empty.sample_size.is_none());

        let saved = pages
            .save_settings(
                page.id,
                StatusPageSettings {
                    sample_size: Some(5),
                    ..Default::default()
                },
                &Actor::system(),
            )
            .await
            .unwrap();
        assert_eq!(saved.status_page_id, page.id);
        assert_eq!(pages.settings(page.id).await.unwrap().sample_size, Some(5));
    }
}
