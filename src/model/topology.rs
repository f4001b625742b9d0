//! Regions, datacenters, agents and the instances they watch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Entity, Id, Patchable, Validate, ValidationResult, apply_patch, check};
use crate::search::{SearchDocument, SearchKind, join_content};

pub const AGENT_STATUS_REGISTERED: &str = "REGISTERED";
pub const AGENT_STATUS_ONLINE: &str = "ONLINE";

// ============================================================================
// Region
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRegion {
    pub name: String,
    pub region_code: Option<String>,
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPatch {
    pub name: Option<String>,
    pub region_code: Option<String>,
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewRegion,
}

impl NewRegion {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region_code: None,
            group_name: None,
        }
    }
}

impl Validate for NewRegion {
    fn validate(&self) -> ValidationResult {
        check::required("name", &self.name, 50)?;
        check::opt_len("regionCode", self.region_code.as_ref(), 20)?;
        check::opt_len("groupName", self.group_name.as_ref(), 20)
    }
}

impl Validate for RegionPatch {
    fn validate(&self) -> ValidationResult {
        check::opt_required("name", self.name.as_ref(), 50)?;
        check::opt_len("regionCode", self.region_code.as_ref(), 20)?;
        check::opt_len("groupName", self.group_name.as_ref(), 20)
    }
}

impl Patchable for NewRegion {
    type Patch = RegionPatch;

    fn apply(&mut self, patch: RegionPatch) {
        apply_patch!(self, patch, required: [name], optional: [region_code, group_name]);
    }
}

impl Entity for Region {
    type Fields = NewRegion;

    const NAME: &'static str = "Region";
    const SEARCH_KIND: Option<SearchKind> = Some(SearchKind::Region);

    fn id(&self) -> Id {
        self.id
    }

    fn fields(&self) -> &NewRegion {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut NewRegion {
        &mut self.fields
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let f = &self.fields;
        Some(SearchDocument::new(
            SearchKind::Region,
            self.id,
            &f.name,
            join_content([Some(f.name.as_str()), f.region_code.as_deref(), f.group_name.as_deref()]),
        ))
    }
}

// ============================================================================
// Datacenter
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDatacenter {
    pub code: String,
    pub name: String,
    pub region_id: Option<Id>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterPatch {
    pub code: Option<String>,
    pub name: Option<String>,
    pub region_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datacenter {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewDatacenter,
}

impl NewDatacenter {
    /// Datacenter whose code is derived from its name
    pub fn named(name: impl Into<String>, region_id: Option<Id>) -> Self {
        let name = name.into();
        Self {
            code: datacenter_code(&name),
            name,
            region_id,
        }
    }
}

/// The first ten alphanumeric characters of the name, upper-cased
pub fn datacenter_code(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(10)
        .collect::<String>()
        .to_ascii_uppercase()
}

impl Validate for NewDatacenter {
    fn validate(&self) -> ValidationResult {
        check::required("code", &self.code, 10)?;
        check::required("name", &self.name, 50)
    }
}

impl Validate for DatacenterPatch {
    fn validate(&self) -> ValidationResult {
        check::opt_required("code", self.code.as_ref(), 10)?;
        check::opt_required("name", self.name.as_ref(), 50)
    }
}

impl Patchable for NewDatacenter {
    type Patch = DatacenterPatch;

    fn apply(&mut self, patch: DatacenterPatch) {
        apply_patch!(self, patch, required: [code, name], optional: [region_id]);
    }
}

impl Entity for Datacenter {
    type Fields = NewDatacenter;

    const NAME: &'static str = "Datacenter";
    const SEARCH_KIND: Option<SearchKind> = Some(SearchKind::Datacenter);

    fn id(&self) -> Id {
        self.id
    }

    fn fields(&self) -> &NewDatacenter {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut NewDatacenter {
        &mut self.fields
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let f = &self.fields;
        Some(SearchDocument::new(
            SearchKind::Datacenter,
            self.id,
            &f.name,
            join_content([Some(f.name.as_str()), Some(f.code.as_str())]),
        ))
    }
}

// ============================================================================
// Agent
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub os_type: Option<String>,
    pub os_version: Option<String>,
    pub agent_version: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub tags: Option<Value>,
    pub datacenter_id: Option<Id>,
    pub region_id: Option<Id>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub os_type: Option<String>,
    pub os_version: Option<String>,
    pub agent_version: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub tags: Option<Value>,
    pub datacenter_id: Option<Id>,
    pub region_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewAgent,
}

impl NewAgent {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: None,
            ip_address: None,
            os_type: None,
            os_version: None,
            agent_version: None,
            last_seen_at: None,
            status: None,
            tags: None,
            datacenter_id: None,
            region_id: None,
        }
    }
}

impl Validate for NewAgent {
    fn validate(&self) -> ValidationResult {
        check::required("name", &self.name, 50)?;
        check::opt_len("hostname", self.hostname.as_ref(), 255)?;
        check::opt_len("ipAddress", self.ip_address.as_ref(), 45)?;
        check::opt_len("osType", self.os_type.as_ref(), 50)?;
        check::opt_len("osVersion", self.os_version.as_ref(), 50)?;
        check::opt_len("agentVersion", self.agent_version.as_ref(), 50)?;
        check::opt_len("status", self.status.as_ref(), 20)
    }
}

impl Validate for AgentPatch {
    fn validate(&self) -> ValidationResult {
        check::opt_required("name", self.name.as_ref(), 50)?;
        check::opt_len("hostname", self.hostname.as_ref(), 255)?;
        check::opt_len("ipAddress", self.ip_address.as_ref(), 45)?;
        check::opt_len("osType", self.os_type.as_ref(), 50)?;
        check::opt_len("osVersion", self.os_version.as_ref(), 50)?;
        check::opt_len("agentVersion", self.agent_version.as_ref(), 50)?;
        check::opt_len("status", self.status.as_ref(), 20)
    }
}

impl Patchable for NewAgent {
    type Patch = AgentPatch;

    fn apply(&mut self, patch: AgentPatch) {
        apply_patch!(self, patch,
            required: [name],
            optional: [
                hostname, ip_address, os_type, os_version, agent_version,
                last_seen_at, status, tags, datacenter_id, region_id,
            ]
        );
    }
}

impl Entity for Agent {
    type Fields = NewAgent;

    const NAME: &'static str = "Agent";
    const SEARCH_KIND: Option<SearchKind> = Some(SearchKind::Agent);

    fn id(&self) -> Id {
        self.id
    }

    fn fields(&self) -> &NewAgent {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut NewAgent {
        &mut self.fields
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let f = &self.fields;
        let tags = f.tags.as_ref().map(Value::to_string);
        Some(SearchDocument::new(
            SearchKind::Agent,
            self.id,
            &f.name,
            join_content([
                Some(f.name.as_str()),
                f.hostname.as_deref(),
                f.ip_address.as_deref(),
                f.os_type.as_deref(),
                f.os_version.as_deref(),
                f.agent_version.as_deref(),
                f.status.as_deref(),
                tags.as_deref(),
            ]),
        ))
    }
}

// ============================================================================
// Instance
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstance {
    pub name: String,
    pub hostname: String,
    pub description: Option<String>,
    pub instance_type: String,
    pub monitoring_type: String,
    pub operating_system: Option<String>,
    pub platform: Option<String>,
    pub private_ip_address: Option<String>,
    pub public_ip_address: Option<String>,
    pub tags: Option<Value>,
    #[serde(default = "defaults::enabled")]
    pub ping_enabled: bool,
    #[serde(default = "defaults::ping_interval")]
    pub ping_interval: i32,
    #[serde(default = "defaults::ping_timeout_ms")]
    pub ping_timeout_ms: i32,
    #[serde(default = "defaults::ping_retry_count")]
    pub ping_retry_count: i32,
    #[serde(default)]
    pub hardware_monitoring_enabled: bool,
    #[serde(default = "defaults::hardware_interval")]
    pub hardware_monitoring_interval: i32,
    #[serde(default = "defaults::cpu_warning")]
    pub cpu_warning_threshold: i32,
    #[serde(default = "defaults::cpu_danger")]
    pub cpu_danger_threshold: i32,
    #[serde(default = "defaults::memory_warning")]
    pub memory_warning_threshold: i32,
    #[serde(default = "defaults::memory_danger")]
    pub memory_danger_threshold: i32,
    #[serde(default = "defaults::disk_warning")]
    pub disk_warning_threshold: i32,
    #[serde(default = "defaults::disk_danger")]
    pub disk_danger_threshold: i32,
    pub datacenter_id: Option<Id>,
    pub agent_id: Option<Id>,
}

pub(crate) mod defaults {
    pub fn enabled() -> bool {
        true
    }

    pub fn ping_interval() -> i32 {
        30
    }

    pub fn ping_timeout_ms() -> i32 {
        5000
    }

    pub fn ping_retry_count() -> i32 {
        2
    }

    pub fn hardware_interval() -> i32 {
        300
    }

    pub fn cpu_warning() -> i32 {
        70
    }

    pub fn cpu_danger() -> i32 {
        90
    }

    pub fn memory_warning() -> i32 {
        75
    }

    pub fn memory_danger() -> i32 {
        90
    }

    pub fn disk_warning() -> i32 {
        80
    }

    pub fn disk_danger() -> i32 {
        95
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePatch {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub description: Option<String>,
    pub instance_type: Option<String>,
    pub monitoring_type: Option<String>,
    pub operating_system: Option<String>,
    pub platform: Option<String>,
    pub private_ip_address: Option<String>,
    pub public_ip_address: Option<String>,
    pub tags: Option<Value>,
    pub ping_enabled: Option<bool>,
    pub ping_interval: Option<i32>,
    pub ping_timeout_ms: Option<i32>,
    pub ping_retry_count: Option<i32>,
    pub hardware_monitoring_enabled: Option<bool>,
    pub hardware_monitoring_interval: Option<i32>,
    pub cpu_warning_threshold: Option<i32>,
    pub cpu_danger_threshold: Option<i32>,
    pub memory_warning_threshold: Option<i32>,
    pub memory_danger_threshold: Option<i32>,
    pub disk_warning_threshold: Option<i32>,
    pub disk_danger_threshold: Option<i32>,
    pub datacenter_id: Option<Id>,
    pub agent_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewInstance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub last_hardware_check_at: Option<DateTime<Utc>>,
}

impl NewInstance {
    /// An instance with the default ping and hardware settings
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        instance_type: impl Into<String>,
        monitoring_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            description: None,
            instance_type: instance_type.into(),
            monitoring_type: monitoring_type.into(),
            operating_system: None,
            platform: None,
            private_ip_address: None,
            public_ip_address: None,
            tags: None,
            ping_enabled: defaults::enabled(),
            ping_interval: defaults::ping_interval(),
            ping_timeout_ms: defaults::ping_timeout_ms(),
            ping_retry_count: defaults::ping_retry_count(),
            hardware_monitoring_enabled: false,
            hardware_monitoring_interval: defaults::hardware_interval(),
            cpu_warning_threshold: defaults::cpu_warning(),
            cpu_danger_threshold: defaults::cpu_danger(),
            memory_warning_threshold: defaults::memory_warning(),
            memory_danger_threshold: defaults::memory_danger(),
            disk_warning_threshold: defaults::disk_warning(),
            disk_danger_threshold: defaults::disk_danger(),
            datacenter_id: None,
            agent_id: None,
        }
    }
}

impl Validate for NewInstance {
    fn validate(&self) -> ValidationResult {
        check::required("name", &self.name, 255)?;
        check::required("hostname", &self.hostname, 255)?;
        check::opt_len("description", self.description.as_ref(), 500)?;
        check::required("instanceType", &self.instance_type, 50)?;
        check::required("monitoringType", &self.monitoring_type, 50)?;
        check::opt_len("operatingSystem", self.operating_system.as_ref(), 100)?;
        check::opt_len("platform", self.platform.as_ref(), 100)?;
        check::opt_len("privateIpAddress", self.private_ip_address.as_ref(), 50)?;
        check::opt_len("publicIpAddress", self.public_ip_address.as_ref(), 50)?;
        check::positive("pingInterval", self.ping_interval)?;
        check::positive("pingTimeoutMs", self.ping_timeout_ms)?;
        check::non_negative("pingRetryCount", self.ping_retry_count)?;
        check::positive("hardwareMonitoringInterval", self.hardware_monitoring_interval)?;
        check::percent("cpuWarningThreshold", f64::from(self.cpu_warning_threshold))?;
        check::percent("cpuDangerThreshold", f64::from(self.cpu_danger_threshold))?;
        check::percent("memoryWarningThreshold", f64::from(self.memory_warning_threshold))?;
        check::percent("memoryDangerThreshold", f64::from(self.memory_danger_threshold))?;
        check::percent("diskWarningThreshold", f64::from(self.disk_warning_threshold))?;
        check::percent("diskDangerThreshold", f64::from(self.disk_danger_threshold))
    }
}

impl Validate for InstancePatch {
    fn validate(&self) -> ValidationResult {
        check::opt_required("name", self.name.as_ref(), 255)?;
        check::opt_required("hostname", self.hostname.as_ref(), 255)?;
        check::opt_len("description", self.description.as_ref(), 500)?;
        check::opt_required("instanceType", self.instance_type.as_ref(), 50)?;
        check::opt_required("monitoringType", self.monitoring_type.as_ref(), 50)?;
        check::opt_len("operatingSystem", self.operating_system.as_ref(), 100)?;
        check::opt_len("platform", self.platform.as_ref(), 100)?;
        check::opt_len("privateIpAddress", self.private_ip_address.as_ref(), 50)?;
        check::opt_len("publicIpAddress", self.public_ip_address.as_ref(), 50)?;
        check::opt_positive("pingInterval", self.ping_interval)?;
        check::opt_positive("pingTimeoutMs", self.ping_timeout_ms)?;
        check::opt_non_negative("pingRetryCount", self.ping_retry_count)?;
        check::opt_positive("hardwareMonitoringInterval", self.hardware_monitoring_interval)?;
        check::opt_percent_i32("cpuWarningThreshold", self.cpu_warning_threshold)?;
        check::opt_percent_i32("cpuDangerThreshold", self.cpu_danger_threshold)?;
        check::opt_percent_i32("memoryWarningThreshold", self.memory_warning_threshold)?;
        check::opt_percent_i32("memoryDangerThreshold", self.memory_danger_threshold)?;
        check::opt_percent_i32("diskWarningThreshold", self.disk_warning_threshold)?;
        check::opt_percent_i32("diskDangerThreshold", self.disk_danger_threshold)
    }
}

impl Patchable for NewInstance {
    type Patch = InstancePatch;

    fn apply(&mut self, patch: InstancePatch) {
        apply_patch!(self, patch,
            required: [
                name, hostname, instance_type, monitoring_type,
                ping_enabled, ping_interval, ping_timeout_ms, ping_retry_count,
                hardware_monitoring_enabled, hardware_monitoring_interval,
                cpu_warning_threshold, cpu_danger_threshold,
                memory_warning_threshold, memory_danger_threshold,
                disk_warning_threshold, disk_danger_threshold,
            ],
            optional: [
                description, operating_system, platform, private_ip_address,
                public_ip_address, tags, datacenter_id, agent_id,
            ]
        );
    }
}

impl Entity for Instance {
    type Fields = NewInstance;

    const NAME: &'static str = "Instance";
    const SEARCH_KIND: Option<SearchKind> = Some(SearchKind::Instance);

    fn id(&self) -> Id {
        self.id
    }

    fn fields(&self) -> &NewInstance {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut NewInstance {
        &mut self.fields
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let f = &self.fields;
        let tags = f.tags.as_ref().map(Value::to_string);
        Some(SearchDocument::new(
            SearchKind::Instance,
            self.id,
            &f.name,
            join_content([
                Some(f.name.as_str()),
                Some(f.hostname.as_str()),
                f.description.as_deref(),
                Some(f.instance_type.as_str()),
                Some(f.monitoring_type.as_str()),
                f.operating_system.as_deref(),
                f.platform.as_deref(),
                f.private_ip_address.as_deref(),
                f.public_ip_address.as_deref(),
                tags.as_deref(),
            ]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_datacenter_code_from_name() {
        assert_eq!(datacenter_code("us-east-1a"), "USEAST1A");
        assert_eq!(datacenter_code("Frankfurt Main Campus"), "FRANKFURTM");
        assert_eq!(datacenter_code("--"), "");
    }

    #[test]
    fn test_region_validation() {
        assert!(NewRegion::named("eu-west").validate().is_ok());

        let err = NewRegion::named("").validate().unwrap_err();
        assert_eq!(err.field, "name");

        let mut region = NewRegion::named("eu-west");
        region.region_code = Some("x".repeat(21));
        assert_eq!(region.validate().unwrap_err().field, "regionCode");
    }

    #[test]
    fn test_agent_patch_keeps_absent_fields() {
        let mut agent = NewAgent::named("edge-1");
        agent.hostname = Some("host-a".to_string());

        agent.apply(AgentPatch {
            status: Some(AGENT_STATUS_ONLINE.to_string()),
            ..Default::default()
        });

        assert_eq!(agent.name, "edge-1");
        assert_eq!(agent.hostname.as_deref(), Some("host-a"));
        assert_eq!(agent.status.as_deref(), Some(AGENT_STATUS_ONLINE));
    }

    #[test]
    fn test_instance_defaults_from_json() {
        let instance: NewInstance = serde_json::from_str(
            r#"{"name":"web-1","hostname":"web-1.local","instanceType":"VM","monitoringType":"AGENT"}"#,
        )
        .unwrap();

        assert!(instance.ping_enabled);
        assert_eq!(instance.ping_interval, 30);
        assert_eq!(instance.cpu_danger_threshold, 90);
        assert!(instance.validate().is_ok());
    }

    #[test]
    fn test_instance_rejects_zero_interval() {
        let mut instance = NewInstance::new("web-1", "web-1.local", "VM", "AGENT");
        instance.ping_interval = 0;
        assert_eq!(instance.validate().unwrap_err().field, "pingInterval");

        let patch = InstancePatch {
            cpu_warning_threshold: Some(120),
            ..Default::default()
        };
        assert_eq!(patch.validate().unwrap_err().field, "cpuWarningThreshold");
    }

    #[test]
    fn test_region_serializes_flat_camel_case() {
        let region = Region {
            id: 7,
            fields: NewRegion {
                name: "eu".to_string(),
                region_code: Some("EU".to_string()),
                group_name: None,
            },
        };

        let json = serde_json::to_value(&region).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "eu");
        assert_eq!(json["regionCode"], "EU");
    }
}
