//! RetentionActor - Deletes heartbeats older than the retention window
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick (cleanup interval) → cleanup_heartbeats(now - retention) → stats
//!     ↑
//!     └─── Commands (CleanupNow, GetStats, Shutdown)
//! ```
//!
//! The first tick fires on startup so a hub that was down for a while
//! catches up immediately.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{RetentionCommand, RetentionStats};
use crate::storage::StorageBackend;

pub struct RetentionActor {
    backend: Arc<dyn StorageBackend>,

    command_rx: mpsc::Receiver<RetentionCommand>,

    cleanup_interval: Duration,

    stats: RetentionStats,
}

impl RetentionActor {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        command_rx: mpsc::Receiver<RetentionCommand>,
        retention_days: u32,
        cleanup_interval_hours: u32,
    ) -> Self {
        let cleanup_interval_hours = cleanup_interval_hours.max(1);
        Self {
            backend,
            command_rx,
            cleanup_interval: Duration::from_secs(u64::from(cleanup_interval_hours) * 3600),
            stats: RetentionStats {
                retention_days,
                cleanup_interval_hours,
                ..Default::default()
            },
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(retention_days = self.stats.retention_days))]
    pub async fn run(mut self) {
        debug!("starting retention actor");

        let mut ticker = time::interval(self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cleanup().await {
                        error!("retention cleanup failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RetentionCommand::CleanupNow { respond_to } => {
                            debug!("received CleanupNow command");
                            let result = self.run_cleanup().await;
                            let _ = respond_to.send(result);
                        }

                        RetentionCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats.clone());
                        }

                        RetentionCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("retention actor stopped");
    }

    async fn run_cleanup(&mut self) -> Result<usize> {
        let now = Utc::now();
        let before = now - chrono::Duration::days(i64::from(self.stats.retention_days));

        let deleted = self.backend.cleanup_heartbeats(before).await?;

        self.stats.cleanup_runs += 1;
        self.stats.total_heartbeats_deleted += deleted as u64;
        self.stats.last_cleanup = Some(now);

        if deleted > 0 {
            info!("retention cleanup deleted {} heartbeats older than {}", deleted, before);
        } else {
            debug!("retention cleanup found nothing to delete");
        }
        Ok(deleted)
    }
}

/// Handle for controlling the RetentionActor
#[derive(Clone)]
pub struct RetentionHandle {
    sender: mpsc::Sender<RetentionCommand>,
}

impl RetentionHandle {
    pub fn spawn(backend: Arc<dyn StorageBackend>, retention_days: u32, cleanup_interval_hours: u32) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = RetentionActor::new(backend, cmd_rx, retention_days, cleanup_interval_hours);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a cleanup pass now
    pub async fn cleanup_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::CleanupNow { respond_to: tx })
            .await?;

        rx.await?
    }

    pub async fn get_stats(&self) -> Option<RetentionStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(RetentionCommand::Shutdown).await;
    }
}
