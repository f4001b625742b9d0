//! Status pages, their items and the public health view computed from them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Entity, Id, Patchable, Validate, ValidationResult, apply_patch, check};
use crate::search::{SearchDocument, SearchKind, join_content};

// ============================================================================
// StatusPage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStatusPage {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    pub is_active: Option<bool>,
    pub is_home_page: Option<bool>,
    pub allowed_roles: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPagePatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub is_active: Option<bool>,
    pub is_home_page: Option<bool>,
    pub allowed_roles: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPage {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewStatusPage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewStatusPage {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, is_public: bool) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            description: None,
            is_public,
            is_active: Some(true),
            is_home_page: None,
            allowed_roles: None,
        }
    }
}

fn check_slug(value: &str) -> ValidationResult {
    check::required("slug", value, 100)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(super::ValidationError::new(
            "slug",
            "may only contain lowercase letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

impl Validate for NewStatusPage {
    fn validate(&self) -> ValidationResult {
        check::required("name", &self.name, 200)?;
        check_slug(&self.slug)?;
        check::opt_len("description", self.description.as_ref(), 1000)?;
        check::opt_len("allowedRoles", self.allowed_roles.as_ref(), 500)
    }
}

impl Validate for StatusPagePatch {
    fn validate(&self) -> ValidationResult {
        check::opt_required("name", self.name.as_ref(), 200)?;
        if let Some(slug) = &self.slug {
            check_slug(slug)?;
        }
        check::opt_len("description", self.description.as_ref(), 1000)?;
        check::opt_len("allowedRoles", self.allowed_roles.as_ref(), 500)
    }
}

impl Patchable for NewStatusPage {
    type Patch = StatusPagePatch;

    fn apply(&mut self, patch: StatusPagePatch) {
        apply_patch!(self, patch,
            required: [name, slug, is_public],
            optional: [description, is_active, is_home_page, allowed_roles]
        );
    }
}

impl Entity for StatusPage {
    type Fields = NewStatusPage;

    const NAME: &'static str = "StatusPage";
    const SEARCH_KIND: Option<SearchKind> = Some(SearchKind::StatusPage);

    fn id(&self) -> Id {
        self.id
    }

    fn fields(&self) -> &NewStatusPage {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut NewStatusPage {
        &mut self.fields
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let f = &self.fields;
        Some(SearchDocument::new(
            SearchKind::StatusPage,
            self.id,
            &f.name,
            join_content([Some(f.name.as_str()), Some(f.slug.as_str()), f.description.as_deref()]),
        ))
    }
}

// ============================================================================
// Items and dependencies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusItemType {
    Http,
    HttpMonitor,
    Service,
    Instance,
}

impl StatusItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusItemType::Http => "HTTP",
            StatusItemType::HttpMonitor => "HTTP_MONITOR",
            StatusItemType::Service => "SERVICE",
            StatusItemType::Instance => "INSTANCE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HTTP" => Some(StatusItemType::Http),
            "HTTP_MONITOR" => Some(StatusItemType::HttpMonitor),
            "SERVICE" => Some(StatusItemType::Service),
            "INSTANCE" => Some(StatusItemType::Instance),
            _ => None,
        }
    }

    /// Items whose health comes from HTTP heartbeats
    pub fn is_http(&self) -> bool {
        matches!(self, StatusItemType::Http | StatusItemType::HttpMonitor)
    }
}

impl fmt::Display for StatusItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStatusPageItem {
    pub item_type: StatusItemType,
    pub item_id: Id,
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPageItem {
    pub id: Id,
    pub status_page_id: Id,
    #[serde(flatten)]
    pub fields: NewStatusPageItem,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStatusDependency {
    pub parent_type: String,
    pub parent_id: Id,
    pub child_type: String,
    pub child_id: Id,
    pub metadata: Option<Value>,
}

impl Validate for NewStatusDependency {
    fn validate(&self) -> ValidationResult {
        check::required("parentType", &self.parent_type, 50)?;
        check::required("childType", &self.child_type, 50)?;
        if self.parent_type == self.child_type && self.parent_id == self.child_id {
            return Err(super::ValidationError::new("childId", "an item cannot depend on itself"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDependency {
    pub id: Id,
    pub status_page_id: Option<Id>,
    #[serde(flatten)]
    pub fields: NewStatusDependency,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPageSettings {
    #[serde(default)]
    pub status_page_id: Id,
    pub logo_url: Option<String>,
    pub theme_color: Option<String>,
    pub header_text: Option<String>,
    pub footer_text: Option<String>,
    pub show_response_times: Option<bool>,
    pub show_uptime_percentage: Option<bool>,
    pub auto_refresh_seconds: Option<i32>,
    pub sample_size: Option<i32>,
    pub success_threshold_high: Option<f64>,
    pub success_threshold_low: Option<f64>,
    pub warning_threshold_ms: Option<i32>,
    pub critical_threshold_ms: Option<i32>,
}

impl Validate for StatusPageSettings {
    fn validate(&self) -> ValidationResult {
        check::opt_len("logoUrl", self.logo_url.as_ref(), 500)?;
        check::opt_len("themeColor", self.theme_color.as_ref(), 20)?;
        check::opt_positive("autoRefreshSeconds", self.auto_refresh_seconds)?;
        check::opt_positive("sampleSize", self.sample_size)?;
        check::opt_positive("warningThresholdMs", self.warning_threshold_ms)?;
        check::opt_positive("criticalThresholdMs", self.critical_threshold_ms)?;
        for (field, value) in [
            ("successThresholdHigh", self.success_threshold_high),
            ("successThresholdLow", self.success_threshold_low),
        ] {
            if value.is_some_and(|v| !(0.0..=1.0).contains(&v)) {
                return Err(super::ValidationError::new(field, "must be between 0 and 1"));
            }
        }
        Ok(())
    }
}

/// Classification inputs once settings and defaults are merged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusThresholds {
    pub sample_size: u32,
    pub success_threshold_high: f64,
    pub success_threshold_low: f64,
    pub warning_threshold_ms: i32,
    pub critical_threshold_ms: i32,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            sample_size: 20,
            success_threshold_high: 0.80,
            success_threshold_low: 0.60,
            warning_threshold_ms: 500,
            critical_threshold_ms: 1000,
        }
    }
}

impl StatusThresholds {
    /// Settings values win over these defaults
    pub fn merged_with(self, settings: &StatusPageSettings) -> Self {
        Self {
            sample_size: settings
                .sample_size
                .and_then(|s| u32::try_from(s).ok())
                .filter(|s| *s > 0)
                .unwrap_or(self.sample_size),
            success_threshold_high: settings.success_threshold_high.unwrap_or(self.success_threshold_high),
            success_threshold_low: settings.success_threshold_low.unwrap_or(self.success_threshold_low),
            warning_threshold_ms: settings.warning_threshold_ms.unwrap_or(self.warning_threshold_ms),
            critical_threshold_ms: settings.critical_threshold_ms.unwrap_or(self.critical_threshold_ms),
        }
    }
}

// ============================================================================
// Public view
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorHealth {
    Up,
    Warning,
    Critical,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionHealth {
    pub status: MonitorHealth,
    pub response_time_ms: i64,
    pub agent_name: String,
    pub success_rate: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub monitor_id: Id,
    pub monitor_name: String,
    pub url: Option<String>,
    pub region_health: BTreeMap<String, RegionHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicStatusPage {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub theme_color: Option<String>,
    pub header_text: Option<String>,
    pub footer_text: Option<String>,
    pub show_response_times: bool,
    pub show_uptime_percentage: bool,
    pub auto_refresh_seconds: Option<i32>,
    pub regions: Vec<String>,
    pub monitors: Vec<MonitorStatus>,
}

/// One HTTP heartbeat joined with the reporting agent's name
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatSample {
    pub monitor_id: Id,
    pub agent_id: Id,
    pub agent_name: String,
    pub success: bool,
    pub response_time_ms: Option<i32>,
    pub warning_threshold_ms: Option<i32>,
    pub critical_threshold_ms: Option<i32>,
}
