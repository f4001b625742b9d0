//! HTTP monitors, monitored services, their instances and monitor-to-agent
//! assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Entity, Id, Patchable, Validate, ValidationError, ValidationResult, apply_patch, check};
use crate::search::{SearchDocument, SearchKind, join_content};

// ============================================================================
// HttpMonitor
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHttpMonitor {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_monitor_type")]
    pub monitor_type: String,
    pub url: Option<String>,
    pub headers: Option<Value>,
    pub body: Option<Value>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: i32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i32,
    #[serde(default = "default_retry_count")]
    pub retry_count: i32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: i32,
    pub response_time_warning_ms: Option<i32>,
    pub response_time_critical_ms: Option<i32>,
    pub uptime_warning_percent: Option<f64>,
    pub uptime_critical_percent: Option<f64>,
    pub ignore_tls_error: Option<bool>,
    pub max_redirects: Option<i32>,
    pub description: Option<String>,
    pub tags: Option<Value>,
    pub enabled: Option<bool>,
    pub expected_status_codes: Option<String>,
    pub parent_id: Option<Id>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_monitor_type() -> String {
    "HTTP".to_string()
}

fn default_interval_seconds() -> i32 {
    60
}

fn default_timeout_seconds() -> i32 {
    30
}

fn default_retry_count() -> i32 {
    1
}

fn default_retry_delay_seconds() -> i32 {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMonitorPatch {
    pub name: Option<String>,
    pub method: Option<String>,
    pub monitor_type: Option<String>,
    pub url: Option<String>,
    pub headers: Option<Value>,
    pub body: Option<Value>,
    pub interval_seconds: Option<i32>,
    pub timeout_seconds: Option<i32>,
    pub retry_count: Option<i32>,
    pub retry_delay_seconds: Option<i32>,
    pub response_time_warning_ms: Option<i32>,
    pub response_time_critical_ms: Option<i32>,
    pub uptime_warning_percent: Option<f64>,
    pub uptime_critical_percent: Option<f64>,
    pub ignore_tls_error: Option<bool>,
    pub max_redirects: Option<i32>,
    pub description: Option<String>,
    pub tags: Option<Value>,
    pub enabled: Option<bool>,
    pub expected_status_codes: Option<String>,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpMonitor {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewHttpMonitor,
}

impl NewHttpMonitor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: default_method(),
            monitor_type: default_monitor_type(),
            url: Some(url.into()),
            headers: None,
            body: None,
            interval_seconds: default_interval_seconds(),
            timeout_seconds: default_timeout_seconds(),
            retry_count: default_retry_count(),
            retry_delay_seconds: default_retry_delay_seconds(),
            response_time_warning_ms: None,
            response_time_critical_ms: None,
            uptime_warning_percent: None,
            uptime_critical_percent: None,
            ignore_tls_error: None,
            max_redirects: None,
            description: None,
            tags: None,
            enabled: Some(true),
            expected_status_codes: None,
            parent_id: None,
        }
    }
}

impl HttpMonitor {
    /// Monitors without an explicit flag run
    pub fn is_enabled(&self) -> bool {
        self.fields.enabled.unwrap_or(true)
    }

    /// Whether `status` counts as a successful probe.
    ///
    /// `expected_status_codes` is a comma list of codes or `low-high` ranges;
    /// when unset any 2xx status succeeds.
    pub fn accepts_status(&self, status: u16) -> bool {
        match self.fields.expected_status_codes.as_deref().map(str::trim) {
            None | Some("") => (200..300).contains(&status),
            Some(list) => parse_status_codes(list)
                .unwrap_or_default()
                .iter()
                .any(|(low, high)| (*low..=*high).contains(&status)),
        }
    }
}

fn parse_status_codes(list: &str) -> Result<Vec<(u16, u16)>, ValidationError> {
    let invalid = || ValidationError::new("expectedStatusCodes", format!("invalid status list '{list}'"));

    list.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('-') {
            Some((low, high)) => {
                let low = low.trim().parse().map_err(|_| invalid())?;
                let high = high.trim().parse().map_err(|_| invalid())?;
                Ok((low, high))
            }
            None => {
                let code = part.parse().map_err(|_| invalid())?;
                Ok((code, code))
            }
        })
        .collect()
}

fn check_status_codes(value: Option<&String>) -> ValidationResult {
    match value {
        Some(list) => parse_status_codes(list).map(|_| ()),
        None => Ok(()),
    }
}

impl Validate for NewHttpMonitor {
    fn validate(&self) -> ValidationResult {
        check::required("name", &self.name, 100)?;
        check::required("method", &self.method, 10)?;
        check::required("monitorType", &self.monitor_type, 20)?;
        check::positive("intervalSeconds", self.interval_seconds)?;
        check::positive("timeoutSeconds", self.timeout_seconds)?;
        check::non_negative("retryCount", self.retry_count)?;
        check::non_negative("retryDelaySeconds", self.retry_delay_seconds)?;
        check::opt_positive("responseTimeWarningMs", self.response_time_warning_ms)?;
        check::opt_positive("responseTimeCriticalMs", self.response_time_critical_ms)?;
        check::opt_percent("uptimeWarningPercent", self.uptime_warning_percent)?;
        check::opt_percent("uptimeCriticalPercent", self.uptime_critical_percent)?;
        check::opt_non_negative("maxRedirects", self.max_redirects)?;
        check::opt_len("description", self.description.as_ref(), 500)?;
        check_status_codes(self.expected_status_codes.as_ref())
    }
}

impl Validate for HttpMonitorPatch {
    fn validate(&self) -> ValidationResult {
        check::opt_required("name", self.name.as_ref(), 100)?;
        check::opt_required("method", self.method.as_ref(), 10)?;
        check::opt_required("monitorType", self.monitor_type.as_ref(), 20)?;
        check::opt_positive("intervalSeconds", self.interval_seconds)?;
        check::opt_positive("timeoutSeconds", self.timeout_seconds)?;
        check::opt_non_negative("retryCount", self.retry_count)?;
        check::opt_non_negative("retryDelaySeconds", self.retry_delay_seconds)?;
        check::opt_positive("responseTimeWarningMs", self.response_time_warning_ms)?;
        check::opt_positive("responseTimeCriticalMs", self.response_time_critical_ms)?;
        check::opt_percent("uptimeWarningPercent", self.uptime_warning_percent)?;
        check::opt_percent("uptimeCriticalPercent", self.uptime_critical_percent)?;
        check::opt_non_negative("maxRedirects", self.max_redirects)?;
        check::opt_len("description", self.description.as_ref(), 500)?;
        check_status_codes(self.expected_status_codes.as_ref())
    }
}

impl Patchable for NewHttpMonitor {
    type Patch = HttpMonitorPatch;

    fn apply(&mut self, patch: HttpMonitorPatch) {
        apply_patch!(self, patch,
            required: [
                name, method, monitor_type, interval_seconds, timeout_seconds,
                retry_count, retry_delay_seconds,
            ],
            optional: [
                url, headers, body, response_time_warning_ms, response_time_critical_ms,
                uptime_warning_percent, uptime_critical_percent, ignore_tls_error,
                max_redirects, description, tags, enabled, expected_status_codes, parent_id,
            ]
        );
    }
}

impl Entity for HttpMonitor {
    type Fields = NewHttpMonitor;

    const NAME: &'static str = "HttpMonitor";
    const SEARCH_KIND: Option<SearchKind> = Some(SearchKind::HttpMonitor);

    fn id(&self) -> Id {
        self.id
    }

    fn fields(&self) -> &NewHttpMonitor {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut NewHttpMonitor {
        &mut self.fields
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let f = &self.fields;
        let tags = f.tags.as_ref().map(Value::to_string);
        Some(SearchDocument::new(
            SearchKind::HttpMonitor,
            self.id,
            &f.name,
            join_content([
                Some(f.name.as_str()),
                Some(f.method.as_str()),
                Some(f.monitor_type.as_str()),
                f.url.as_deref(),
                f.description.as_deref(),
                tags.as_deref(),
            ]),
        ))
    }
}

// ============================================================================
// MonitoredService
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMonitoredService {
    pub name: String,
    pub description: Option<String>,
    pub service_type: String,
    pub environment: String,
    pub monitoring_enabled: Option<bool>,
    pub cluster_monitoring_enabled: Option<bool>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: i32,
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: i32,
    #[serde(default = "default_retry_count")]
    pub retry_count: i32,
    pub latency_warning_ms: Option<i32>,
    pub latency_critical_ms: Option<i32>,
    pub advanced_config: Option<Value>,
    pub is_active: Option<bool>,
    pub datacenter_id: Option<Id>,
}

fn default_service_timeout_ms() -> i32 {
    5000
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredServicePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub service_type: Option<String>,
    pub environment: Option<String>,
    pub monitoring_enabled: Option<bool>,
    pub cluster_monitoring_enabled: Option<bool>,
    pub interval_seconds: Option<i32>,
    pub timeout_ms: Option<i32>,
    pub retry_count: Option<i32>,
    pub latency_warning_ms: Option<i32>,
    pub latency_critical_ms: Option<i32>,
    pub advanced_config: Option<Value>,
    pub is_active: Option<bool>,
    pub datacenter_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredService {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewMonitoredService,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewMonitoredService {
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            service_type: service_type.into(),
            environment: environment.into(),
            monitoring_enabled: Some(true),
            cluster_monitoring_enabled: None,
            interval_seconds: default_interval_seconds(),
            timeout_ms: default_service_timeout_ms(),
            retry_count: default_retry_count(),
            latency_warning_ms: None,
            latency_critical_ms: None,
            advanced_config: None,
            is_active: Some(true),
            datacenter_id: None,
        }
    }
}

impl Validate for NewMonitoredService {
    fn validate(&self) -> ValidationResult {
        check::required("name", &self.name, 200)?;
        check::opt_len("description", self.description.as_ref(), 1000)?;
        check::required("serviceType", &self.service_type, 50)?;
        check::required("environment", &self.environment, 50)?;
        check::positive("intervalSeconds", self.interval_seconds)?;
        check::positive("timeoutMs", self.timeout_ms)?;
        check::non_negative("retryCount", self.retry_count)?;
        check::opt_positive("latencyWarningMs", self.latency_warning_ms)?;
        check::opt_positive("latencyCriticalMs", self.latency_critical_ms)
    }
}

impl Validate for MonitoredServicePatch {
    fn validate(&self) -> ValidationResult {
        check::opt_required("name", self.name.as_ref(), 200)?;
        check::opt_len("description", self.description.as_ref(), 1000)?;
        check::opt_required("serviceType", self.service_type.as_ref(), 50)?;
        check::opt_required("environment", self.environment.as_ref(), 50)?;
        check::opt_positive("intervalSeconds", self.interval_seconds)?;
        check::opt_positive("timeoutMs", self.timeout_ms)?;
        check::opt_non_negative("retryCount", self.retry_count)?;
        check::opt_positive("latencyWarningMs", self.latency_warning_ms)?;
        check::opt_positive("latencyCriticalMs", self.latency_critical_ms)
    }
}

impl Patchable for NewMonitoredService {
    type Patch = MonitoredServicePatch;

    fn apply(&mut self, patch: MonitoredServicePatch) {
        apply_patch!(self, patch,
            required: [name, service_type, environment, interval_seconds, timeout_ms, retry_count],
            optional: [
                description, monitoring_enabled, cluster_monitoring_enabled,
                latency_warning_ms, latency_critical_ms, advanced_config, is_active, datacenter_id,
            ]
        );
    }
}

impl Entity for MonitoredService {
    type Fields = NewMonitoredService;

    const NAME: &'static str = "MonitoredService";
    const SEARCH_KIND: Option<SearchKind> = Some(SearchKind::MonitoredService);

    fn id(&self) -> Id {
        self.id
    }

    fn fields(&self) -> &NewMonitoredService {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut NewMonitoredService {
        &mut self.fields
    }

    fn search_document(&self) -> Option<SearchDocument> {
        let f = &self.fields;
        Some(SearchDocument::new(
            SearchKind::MonitoredService,
            self.id,
            &f.name,
            join_content([
                Some(f.name.as_str()),
                f.description.as_deref(),
                Some(f.service_type.as_str()),
                Some(f.environment.as_str()),
            ]),
        ))
    }
}

// ============================================================================
// Service instances
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewServiceInstance {
    pub port: i32,
    pub is_active: Option<bool>,
    pub instance_id: Id,
    pub monitored_service_id: Id,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstancePatch {
    pub port: Option<i32>,
    pub is_active: Option<bool>,
    pub instance_id: Option<Id>,
    pub monitored_service_id: Option<Id>,
}

/// A monitored service running on an instance, reachable on `port`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewServiceInstance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewServiceInstance {
    pub fn new(monitored_service_id: Id, instance_id: Id, port: i32) -> Self {
        Self {
            port,
            is_active: Some(true),
            instance_id,
            monitored_service_id,
        }
    }
}

fn check_port(port: i32) -> ValidationResult {
    if !(1..=65535).contains(&port) {
        return Err(ValidationError::new("port", "must be between 1 and 65535"));
    }
    Ok(())
}

impl Validate for NewServiceInstance {
    fn validate(&self) -> ValidationResult {
        check_port(self.port)
    }
}

impl Validate for ServiceInstancePatch {
    fn validate(&self) -> ValidationResult {
        self.port.map_or(Ok(()), check_port)
    }
}

impl Patchable for NewServiceInstance {
    type Patch = ServiceInstancePatch;

    fn apply(&mut self, patch: ServiceInstancePatch) {
        apply_patch!(self, patch,
            required: [port, instance_id, monitored_service_id],
            optional: [is_active]
        );
    }
}

impl Entity for ServiceInstance {
    type Fields = NewServiceInstance;

    const NAME: &'static str = "ServiceInstance";

    fn id(&self) -> Id {
        self.id
    }

    fn fields(&self) -> &NewServiceInstance {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut NewServiceInstance {
        &mut self.fields
    }
}

/// What an agent needs to check one service instance: the service's
/// schedule joined with the address of the instance it runs on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTarget {
    pub service_instance_id: Id,
    pub monitored_service_id: Id,
    pub instance_id: Id,
    pub name: String,
    pub service_type: String,
    pub host: String,
    pub port: i32,
    pub interval_seconds: i32,
    pub timeout_ms: i32,
    pub retry_count: i32,
    pub latency_warning_ms: Option<i32>,
    pub latency_critical_ms: Option<i32>,
}

pub const SERVICE_STATUS_UP: &str = "UP";
pub const SERVICE_STATUS_WARNING: &str = "WARNING";
pub const SERVICE_STATUS_CRITICAL: &str = "CRITICAL";
pub const SERVICE_STATUS_DOWN: &str = "DOWN";

impl ServiceTarget {
    /// `host:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Status of a check that connected after `latency_ms`
    pub fn latency_status(&self, latency_ms: i32) -> &'static str {
        match (self.latency_critical_ms, self.latency_warning_ms) {
            (Some(critical), _) if latency_ms >= critical => SERVICE_STATUS_CRITICAL,
            (_, Some(warning)) if latency_ms >= warning => SERVICE_STATUS_WARNING,
            _ => SERVICE_STATUS_UP,
        }
    }
}

// ============================================================================
// Agent assignment
// ============================================================================

/// Assignment of an HTTP monitor to the agent that should probe it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMonitor {
    pub id: Id,
    pub agent_id: Id,
    pub monitor_id: Id,
    pub active: bool,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignMonitor {
    pub agent_id: Id,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(expected: Option<&str>) -> HttpMonitor {
        let mut fields = NewHttpMonitor::new("api", "http://localhost/health");
        fields.expected_status_codes = expected.map(str::to_string);
        HttpMonitor { id: 1, fields }
    }

    #[test]
    fn test_accepts_2xx_by_default() {
        let monitor = monitor(None);
        assert!(monitor.accepts_status(200));
        assert!(monitor.accepts_status(204));
        assert!(!monitor.accepts_status(301));
        assert!(!monitor.accepts_status(500));
    }

    #[test]
    fn test_accepts_listed_codes_and_ranges() {
        let monitor = monitor(Some("200, 301-302,404"));
        assert!(monitor.accepts_status(200));
        assert!(monitor.accepts_status(302));
        assert!(monitor.accepts_status(404));
        assert!(!monitor.accepts_status(201));
    }

    #[test]
    fn test_rejects_malformed_status_list() {
        let mut fields = NewHttpMonitor::new("api", "http://localhost");
        fields.expected_status_codes = Some("2xx".to_string());
        assert_eq!(fields.validate().unwrap_err().field, "expectedStatusCodes");
    }

    #[test]
    fn test_monitor_validation() {
        let mut fields = NewHttpMonitor::new("api", "http://localhost");
        assert!(fields.validate().is_ok());

        fields.method = "PROPPATCHING".to_string();
        assert_eq!(fields.validate().unwrap_err().field, "method");

        let mut fields = NewHttpMonitor::new("api", "http://localhost");
        fields.uptime_warning_percent = Some(101.0);
        assert_eq!(fields.validate().unwrap_err().field, "uptimeWarningPercent");
    }

    #[test]
    fn test_monitor_defaults_from_json() {
        let fields: NewHttpMonitor = serde_json::from_str(r#"{"name":"home","url":"https://example.com"}"#).unwrap();
        assert_eq!(fields.method, "GET");
        assert_eq!(fields.interval_seconds, 60);
        assert!(HttpMonitor { id: 1, fields }.is_enabled());
    }

    #[test]
    fn test_service_instance_port_range() {
        assert!(NewServiceInstance::new(1, 1, 5432).validate().is_ok());
        assert_eq!(NewServiceInstance::new(1, 1, 0).validate().unwrap_err().field, "port");
        assert!(NewServiceInstance::new(1, 1, 70000).validate().is_err());

        let patch = ServiceInstancePatch {
            port: Some(-1),
            ..Default::default()
        };
        assert_eq!(patch.validate().unwrap_err().field, "port");
    }

    #[test]
    fn test_service_target_latency_status() {
        let mut target = ServiceTarget {
            service_instance_id: 1,
            monitored_service_id: 1,
            instance_id: 1,
            name: "cache".to_string(),
            service_type: "REDIS".to_string(),
            host: "10.0.0.5".to_string(),
            port: 6379,
            interval_seconds: 30,
            timeout_ms: 1000,
            retry_count: 0,
            latency_warning_ms: Some(100),
            latency_critical_ms: Some(500),
        };
        assert_eq!(target.latency_status(20), "UP");
        assert_eq!(target.latency_status(100), "WARNING");
        assert_eq!(target.latency_status(900), "CRITICAL");
        assert_eq!(target.address(), "10.0.0.5:6379");

        target.latency_warning_ms = None;
        assert_eq!(target.latency_status(300), "UP");

        target.host = "::1".to_string();
        assert_eq!(target.address(), "[::1]:6379");
    }

    #[test]
    fn test_service_patch() {
        let mut service = NewMonitoredService::new("orders-db", "POSTGRES", "prod");
        service.apply(MonitoredServicePatch {
            environment: Some("staging".to_string()),
            latency_warning_ms: Some(250),
            ..Default::default()
        });

        assert_eq!(service.environment, "staging");
        assert_eq!(service.latency_warning_ms, Some(250));
        assert_eq!(service.service_type, "POSTGRES");
    }
}
