//! Configuration files of the hub and the agent
//!
//! Both are read from JSON, or TOML when the file name ends in `.toml`.
//! Every section has serde defaults, so an empty object is a valid hub
//! configuration.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::model::{NewInstance, StatusThresholds};

/// SQLite storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./inframirror.db"),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Bearer token guarding the admin routes
    pub admin_token: Option<String>,

    /// Enable CORS for browser dashboards
    pub enable_cors: bool,

    /// Capacity of the heartbeat broadcast channel
    pub event_buffer: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            admin_token: None,
            enable_cors: true,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,

    /// Heartbeats older than this are deleted
    pub retention_days: u32,

    pub cleanup_interval_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 30,
            cleanup_interval_hours: 24,
        }
    }
}

/// Hub configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,

    pub api: ApiConfig,

    pub retention: RetentionConfig,

    /// Classification defaults for pages without settings
    pub status_defaults: StatusThresholds,
}

impl Config {
    /// Reads the file, then applies `INFRAMIRROR_ADMIN_TOKEN`
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config: Config = read_config_file(path)?;
        if let Some(token) = crate::util::get_admin_token() {
            config.api.admin_token = Some(token);
        }
        Ok(config)
    }
}

/// Overrides for the instance the agent reports about itself
///
/// Unset values keep the instance defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub instance_type: Option<String>,
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
}

impl InstanceConfig {
    pub fn apply(&self, instance: &mut NewInstance) {
        if let Some(v) = &self.instance_type {
            instance.instance_type = v.clone();
        }
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field {
                    instance.$field = v;
                })*
            };
        }
        set!(
            ping_enabled,
            ping_interval,
            ping_timeout_ms,
            ping_retry_count,
            hardware_monitoring_enabled,
            hardware_monitoring_interval,
            cpu_warning_threshold,
            cpu_danger_threshold,
            memory_warning_threshold,
            memory_danger_threshold,
            disk_warning_threshold,
            disk_danger_threshold
        );
    }
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the hub, e.g. `http://hub.local:8080`
    pub hub_url: String,

    /// Key used for the first registration; `INFRAMIRROR_API_KEY` wins
    pub bootstrap_api_key: Option<String>,

    /// Agent name; defaults to the host name
    pub name: Option<String>,

    pub region: String,

    pub datacenter: String,

    /// Extra registration tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Seconds between agent heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,

    /// Seconds between refreshes of the monitor list
    #[serde(default = "default_sync_interval")]
    pub monitor_sync_interval: u64,

    /// Probe only monitors assigned to this agent
    #[serde(default)]
    pub assigned_only: bool,

    #[serde(default)]
    pub instance: InstanceConfig,

    /// Defaults to `<data dir>/inframirror/agent-state.json`
    pub state_file: Option<PathBuf>,
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_sync_interval() -> u64 {
    300
}

/// Reads a JSON or TOML file, chosen by extension
pub fn read_config_file<T: DeserializeOwned + Debug>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    let is_toml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let config = if is_toml {
        toml::from_str(&file_content).with_context(|| format!("invalid TOML in {}", path.display()))?
    } else {
        serde_json::from_str(&file_content).with_context(|| format!("invalid JSON in {}", path.display()))?
    };

    trace!("loaded config: {config:?}");
    Ok(config)
}
