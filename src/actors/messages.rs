//! Message types for actor communication
//!
//! Every actor owns an mpsc command channel. Request/response commands carry
//! a oneshot sender; heartbeat events fan out on the hub's broadcast channel
//! (see [`HeartbeatEvent`](crate::model::HeartbeatEvent)).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::model::{NewHttpHeartbeat, NewInstanceHeartbeat, NewServiceHeartbeat};

/// Commands that can be sent to the RetentionActor
#[derive(Debug)]
pub enum RetentionCommand {
    /// Run a cleanup pass now, answering with the number of rows deleted
    CleanupNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    GetStats {
        respond_to: oneshot::Sender<RetentionStats>,
    },

    /// Gracefully shut down the retention actor
    Shutdown,
}

/// Counters kept by the RetentionActor
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionStats {
    pub retention_days: u32,
    pub cleanup_interval_hours: u32,
    pub cleanup_runs: u64,
    pub total_heartbeats_deleted: u64,
    pub last_cleanup: Option<DateTime<Utc>>,
}

/// Commands that can be sent to an HttpProbeActor
#[derive(Debug)]
pub enum ProbeCommand {
    /// Probe immediately, bypassing the interval timer
    ///
    /// Answers with the heartbeat that was submitted.
    CheckNow {
        respond_to: oneshot::Sender<anyhow::Result<NewHttpHeartbeat>>,
    },

    /// Update the probe interval
    UpdateInterval {
        /// New interval in seconds
        interval_secs: u64,
    },

    /// Gracefully shut down the probe
    Shutdown,
}

/// Commands that can be sent to a ServiceProbeActor
#[derive(Debug)]
pub enum ServiceProbeCommand {
    /// Check immediately, answering with the heartbeat that was submitted
    CheckNow {
        respond_to: oneshot::Sender<anyhow::Result<NewServiceHeartbeat>>,
    },

    Shutdown,
}

/// Commands that can be sent to an InstanceMonitorActor
#[derive(Debug)]
pub enum InstanceCommand {
    /// Take and submit a hardware sample now
    SampleNow {
        respond_to: oneshot::Sender<anyhow::Result<NewInstanceHeartbeat>>,
    },

    /// Ping the hub now
    PingNow {
        respond_to: oneshot::Sender<anyhow::Result<NewInstanceHeartbeat>>,
    },

    Shutdown,
}
