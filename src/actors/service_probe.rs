//! ServiceProbeActor - TCP reachability checks of one service instance
//!
//! The hub hands each agent the service instances running on its instances
//! (see [`ServiceTarget`]). Every target gets an actor that opens a TCP
//! connection on the service's interval, within `timeout_ms`, retrying up to
//! `retry_count` times. The connect latency is graded against the service's
//! latency thresholds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, instrument, warn};

use super::HeartbeatSink;
use super::messages::ServiceProbeCommand;
use super::probe::ProbeSync;
use crate::model::{Id, NewServiceHeartbeat, SERVICE_STATUS_DOWN, ServiceSample, ServiceTarget};

fn millis(elapsed: Duration) -> i32 {
    elapsed.as_millis().min(i32::MAX as u128) as i32
}

pub struct ServiceProbeActor {
    target: ServiceTarget,
    sink: Arc<dyn HeartbeatSink>,
    command_rx: mpsc::Receiver<ServiceProbeCommand>,
}

impl ServiceProbeActor {
    pub fn new(
        target: ServiceTarget,
        sink: Arc<dyn HeartbeatSink>,
        command_rx: mpsc::Receiver<ServiceProbeCommand>,
    ) -> Self {
        Self {
            target,
            sink,
            command_rx,
        }
    }

    #[instrument(skip(self), fields(service = %self.target.name, address = %self.target.address()))]
    pub async fn run(mut self) {
        debug!("starting service probe actor");

        let mut ticker = interval(Duration::from_secs(self.target.interval_seconds.max(1) as u64));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.perform_check().await {
                        error!("service check failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ServiceProbeCommand::CheckNow { respond_to } => {
                            let result = self.perform_check().await;
                            let _ = respond_to.send(result);
                        }
                        ServiceProbeCommand::Shutdown => {
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

        debug!("service probe actor stopped");
    }

    async fn perform_check(&self) -> Result<NewServiceHeartbeat> {
        let heartbeat = self.run_check().await;
        self.sink
            .submit_service(heartbeat.clone())
            .await
            .context("failed to submit service heartbeat")?;
        Ok(heartbeat)
    }

    /// Connects to the target; failures are recorded in the heartbeat
    pub async fn run_check(&self) -> NewServiceHeartbeat {
        let target = &self.target;
        let executed_at = Utc::now();
        let address = target.address();
        let limit = Duration::from_millis(target.timeout_ms.max(1) as u64);
        let attempts = 1 + target.retry_count.max(0) as u32;

        let mut sample = ServiceSample::new(target.monitored_service_id, false, SERVICE_STATUS_DOWN);
        sample.service_instance_id = Some(target.service_instance_id);

        let mut attempt = 0;
        while attempt < attempts {
            attempt += 1;
            let start = Instant::now();
            let error = match timeout(limit, TcpStream::connect(&address)).await {
                Ok(Ok(_stream)) => {
                    let latency = millis(start.elapsed());
                    sample.success = true;
                    sample.status = target.latency_status(latency).to_string();
                    sample.response_time_ms = Some(latency);
                    sample.error_message = None;
                    break;
                }
                Ok(Err(e)) => format!("connection to {address} failed: {e}"),
                Err(_) => format!("connection to {address} timed out after {}ms", limit.as_millis()),
            };
            warn!("service check attempt {} failed: {}", attempt, error);
            sample.response_time_ms = Some(millis(start.elapsed()));
            sample.error_message = Some(error);
        }

        sample.metadata = Some(json!({
            "serviceType": target.service_type,
            "host": target.host,
            "port": target.port,
            "attempts": attempt,
        }));

        NewServiceHeartbeat {
            executed_at: Some(executed_at),
            sample,
        }
    }
}

/// Handle for controlling a ServiceProbeActor
#[derive(Clone)]
pub struct ServiceProbeHandle {
    sender: mpsc::Sender<ServiceProbeCommand>,
    target: ServiceTarget,
}

impl ServiceProbeHandle {
    pub fn spawn(target: ServiceTarget, sink: Arc<dyn HeartbeatSink>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        tokio::spawn(ServiceProbeActor::new(target.clone(), sink, cmd_rx).run());

        Self { sender: cmd_tx, target }
    }

    /// Trigger an immediate check
    pub async fn check_now(&self) -> Result<NewServiceHeartbeat> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ServiceProbeCommand::CheckNow { respond_to: tx })
            .await?;

        rx.await?
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(ServiceProbeCommand::Shutdown).await;
    }

    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }
}

/// Reconciles the running service probes with the hub's target list
///
/// Vanished targets are stopped and changed ones restarted.
pub async fn sync_service_probes(
    probes: &mut HashMap<Id, ServiceProbeHandle>,
    targets: Vec<ServiceTarget>,
    sink: &Arc<dyn HeartbeatSink>,
) -> ProbeSync {
    let mut summary = ProbeSync::default();
    let wanted: HashMap<Id, ServiceTarget> = targets
        .into_iter()
        .map(|t| (t.service_instance_id, t))
        .collect();

    let stale: Vec<Id> = probes
        .iter()
        .filter(|(id, handle)| wanted.get(id) != Some(handle.target()))
        .map(|(id, _)| *id)
        .collect();
    for id in stale {
        if let Some(handle) = probes.remove(&id) {
            handle.shutdown().await;
            summary.stopped += 1;
        }
    }

    for (id, target) in wanted {
        if probes.contains_key(&id) {
            continue;
        }
        info!("starting service probe for {} on {}", target.name, target.address());
        probes.insert(id, ServiceProbeHandle::spawn(target, sink.clone()));
        summary.started += 1;
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::testing::RecordingSink;
    use tokio::net::TcpListener;

    fn target(id: Id, host: &str, port: u16) -> ServiceTarget {
        ServiceTarget {
            service_instance_id: id,
            monitored_service_id: 10,
            instance_id: 20,
            name: format!("service-{id}"),
            service_type: "REDIS".to_string(),
            host: host.to_string(),
            port: i32::from(port),
            interval_seconds: 3600,
            timeout_ms: 2000,
            retry_count: 0,
            latency_warning_ms: None,
            latency_critical_ms: None,
        }
    }

    /// A port that refuses connections
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_open_port_is_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let recording = Arc::new(RecordingSink::default());
        let handle = ServiceProbeHandle::spawn(target(1, "127.0.0.1", port), recording.clone());

        let heartbeat = handle.check_now().await.unwrap();
        assert!(heartbeat.sample.success);
        assert_eq!(heartbeat.sample.status, "UP");
        assert_eq!(heartbeat.sample.monitored_service_id, 10);
        assert_eq!(heartbeat.sample.service_instance_id, Some(1));
        assert!(heartbeat.sample.response_time_ms.is_some());
        assert_eq!(heartbeat.sample.metadata.as_ref().unwrap()["port"], i64::from(port));
        assert!(!recording.service.lock().unwrap().is_empty());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_latency_thresholds_grade_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut slow = target(2, "127.0.0.1", port);
        // any connect takes at least 0ms
        slow.latency_critical_ms = Some(0);

        let (_tx, rx) = mpsc::channel(1);
        let heartbeat = ServiceProbeActor::new(slow, Arc::new(RecordingSink::default()), rx)
            .run_check()
            .await;
        assert!(heartbeat.sample.success);
        assert_eq!(heartbeat.sample.status, "CRITICAL");
    }

    #[tokio::test]
    async fn test_refused_connection_is_down_after_retries() {
        let port = closed_port().await;
        let mut refused = target(3, "127.0.0.1", port);
        refused.retry_count = 2;

        let (_tx, rx) = mpsc::channel(1);
        let heartbeat = ServiceProbeActor::new(refused, Arc::new(RecordingSink::default()), rx)
            .run_check()
            .await;
        assert!(!heartbeat.sample.success);
        assert_eq!(heartbeat.sample.status, "DOWN");
        assert!(heartbeat.sample.error_message.is_some());
        assert_eq!(heartbeat.sample.metadata.unwrap()["attempts"], 3);
    }

    #[tokio::test]
    async fn test_sync_restarts_changed_targets() {
        let sink: Arc<dyn HeartbeatSink> = Arc::new(RecordingSink::default());
        let mut checks = HashMap::new();
        let port = closed_port().await;

        let a = target(1, "127.0.0.1", port);
        let b = target(2, "127.0.0.1", port);
        let summary = sync_service_probes(&mut checks, vec![a.clone(), b], &sink).await;
        assert_eq!(summary.started, 2);

        let mut moved = a;
        moved.port = i32::from(port) + 1;
        let summary = sync_service_probes(&mut checks, vec![moved.clone()], &sink).await;
        assert_eq!(
            summary,
            ProbeSync {
                started: 1,
                stopped: 2,
                rescheduled: 0
            }
        );
        assert_eq!(checks[&1].target(), &moved);

        let summary = sync_service_probes(&mut checks, Vec::new(), &sink).await;
        assert_eq!(summary.stopped, 1);
        assert!(checks.is_empty());
    }
}
