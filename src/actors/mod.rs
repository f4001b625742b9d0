//! Actor-based background work
//!
//! Each actor runs as an independent async task and is controlled through a
//! cloneable handle wrapping its mpsc command channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!   hub                                  agent
//!   ───                                  ─────
//!   RetentionActor ── timer ──┐          HttpProbeActor (one per monitor) ──┐
//!                             ▼          ServiceProbeActor (one per target) ┤
//!                       StorageBackend   InstanceMonitorActor ──────────────┤
//!                                                                           ▼
//!                                                            HeartbeatSink (HubClient)
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for synchronous queries
//! 3. **Events**: the hub publishes accepted heartbeats on a broadcast channel

use async_trait::async_trait;

use crate::model::{NewHttpHeartbeat, NewInstanceHeartbeat, NewServiceHeartbeat};

#[cfg(feature = "agent")]
pub mod hardware;
pub mod messages;
pub mod probe;
pub mod retention;
pub mod service_probe;

/// Where agent-side actors deliver their samples
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn submit_http(&self, heartbeat: NewHttpHeartbeat) -> anyhow::Result<()>;

    async fn submit_instance(&self, heartbeat: NewInstanceHeartbeat) -> anyhow::Result<()>;

    async fn submit_service(&self, heartbeat: NewServiceHeartbeat) -> anyhow::Result<()>;

    /// Liveness ping for the agent itself
    async fn agent_heartbeat(&self) -> anyhow::Result<()>;
}
