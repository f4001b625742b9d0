//! InstanceMonitorActor - Reports the agent host's own health
//!
//! Three timers drive the actor:
//!
//! - hardware: samples CPU, memory, disk, load, processes, network and uptime
//!   via `sysinfo` and submits a `HARDWARE` heartbeat
//! - ping: measures a TCP connect to the hub and submits a `PING` heartbeat
//! - agent: posts the agent liveness heartbeat
//!
//! Disabled checks keep their timer but never fire.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use sysinfo::{Disks, Networks, System};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, instrument, trace, warn};

use super::HeartbeatSink;
use super::messages::InstanceCommand;
use crate::model::{HeartbeatType, Instance, InstanceSample, NewInstance, NewInstanceHeartbeat};

pub const STATUS_UP: &str = "UP";
pub const STATUS_WARNING: &str = "WARNING";
pub const STATUS_CRITICAL: &str = "CRITICAL";
pub const STATUS_DOWN: &str = "DOWN";

/// One reading of the host
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareSnapshot {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub load_average: f64,
    pub process_count: i32,
    pub network_rx_bytes: i64,
    pub network_tx_bytes: i64,
    pub uptime_seconds: i64,
}

fn percent(used: f64, total: f64) -> f64 {
    if total <= 0.0 {
        0.0
    } else {
        (used / total * 100.0).clamp(0.0, 100.0)
    }
}

/// Keeps one `System` so CPU usage is measured between two samples
pub struct HardwareSampler {
    system: System,
}

impl Default for HardwareSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareSampler {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self { system }
    }

    pub fn sample(&mut self) -> HardwareSnapshot {
        self.system.refresh_all();

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            let sum: f32 = cpus.iter().map(|cpu| cpu.cpu_usage()).sum();
            f64::from(sum / cpus.len() as f32).clamp(0.0, 100.0)
        };

        let memory_usage = percent(
            self.system.used_memory() as f64,
            self.system.total_memory() as f64,
        );

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks
            .iter()
            .fold((0u64, 0u64), |(total, available), disk| {
                (total + disk.total_space(), available + disk.available_space())
            });
        let disk_usage = percent(total.saturating_sub(available) as f64, total as f64);

        let networks = Networks::new_with_refreshed_list();
        let (rx, tx) = networks.iter().fold((0u64, 0u64), |(rx, tx), (_, data)| {
            (rx + data.total_received(), tx + data.total_transmitted())
        });

        HardwareSnapshot {
            cpu_usage,
            memory_usage,
            disk_usage,
            load_average: System::load_average().one,
            process_count: self.system.processes().len().min(i32::MAX as usize) as i32,
            network_rx_bytes: rx.min(i64::MAX as u64) as i64,
            network_tx_bytes: tx.min(i64::MAX as u64) as i64,
            uptime_seconds: System::uptime().min(i64::MAX as u64) as i64,
        }
    }
}

/// `CRITICAL` at or above a danger threshold, `WARNING` at or above a
/// warning threshold, `UP` otherwise
pub fn hardware_status(snapshot: &HardwareSnapshot, thresholds: &NewInstance) -> &'static str {
    let readings = [
        (snapshot.cpu_usage, thresholds.cpu_warning_threshold, thresholds.cpu_danger_threshold),
        (snapshot.memory_usage, thresholds.memory_warning_threshold, thresholds.memory_danger_threshold),
        (snapshot.disk_usage, thresholds.disk_warning_threshold, thresholds.disk_danger_threshold),
    ];

    if readings.iter().any(|(value, _, danger)| *value >= f64::from(*danger)) {
        STATUS_CRITICAL
    } else if readings.iter().any(|(value, warning, _)| *value >= f64::from(*warning)) {
        STATUS_WARNING
    } else {
        STATUS_UP
    }
}

pub fn hardware_heartbeat(instance: &Instance, snapshot: &HardwareSnapshot) -> NewInstanceHeartbeat {
    let status = hardware_status(snapshot, &instance.fields);

    let mut sample = InstanceSample::new(instance.id, HeartbeatType::Hardware, true, status);
    sample.cpu_usage = Some(snapshot.cpu_usage);
    sample.memory_usage = Some(snapshot.memory_usage);
    sample.disk_usage = Some(snapshot.disk_usage);
    sample.load_average = Some(snapshot.load_average);
    sample.process_count = Some(snapshot.process_count);
    sample.network_rx_bytes = Some(snapshot.network_rx_bytes);
    sample.network_tx_bytes = Some(snapshot.network_tx_bytes);
    sample.uptime_seconds = Some(snapshot.uptime_seconds);

    NewInstanceHeartbeat {
        executed_at: Some(Utc::now()),
        sample,
    }
}

/// `host:port` of the hub, used as the ping target
pub fn ping_target(hub_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(hub_url).with_context(|| format!("invalid hub url '{hub_url}'"))?;
    let host = url.host_str().ok_or_else(|| anyhow!("hub url '{hub_url}' has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("hub url '{hub_url}' has no port"))?;
    Ok(format!("{host}:{port}"))
}

/// TCP connect to `target`, retried `retries` times
pub async fn tcp_ping(instance_id: i64, target: &str, timeout_ms: u64, retries: u32) -> NewInstanceHeartbeat {
    let executed_at = Utc::now();
    let attempts = retries + 1;
    let mut failures = 0u32;
    let mut last_error = None;
    let mut elapsed = None;

    for _ in 0..attempts {
        let start = Instant::now();
        match timeout(Duration::from_millis(timeout_ms), TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => {
                elapsed = Some(start.elapsed());
                break;
            }
            Ok(Err(e)) => last_error = Some(("CONNECTION_ERROR", e.to_string())),
            Err(_) => last_error = Some(("TIMEOUT", format!("no answer within {timeout_ms}ms"))),
        }
        failures += 1;
    }

    let made = if elapsed.is_some() { failures + 1 } else { failures };
    let success = elapsed.is_some();

    let mut sample = InstanceSample::new(
        instance_id,
        HeartbeatType::Ping,
        success,
        if success { STATUS_UP } else { STATUS_DOWN },
    );
    sample.response_time_ms = elapsed.map(|d| d.as_millis().min(i32::MAX as u128) as i32);
    sample.packet_loss = Some(f64::from(failures) / f64::from(made.max(1)) * 100.0);
    if !success {
        if let Some((kind, message)) = last_error {
            sample.error_type = Some(kind.to_string());
            sample.error_message = Some(message);
        }
    }

    NewInstanceHeartbeat {
        executed_at: Some(executed_at),
        sample,
    }
}

pub struct InstanceMonitorActor {
    instance: Instance,

    /// Ping target, `host:port`
    target: String,

    sampler: HardwareSampler,

    sink: Arc<dyn HeartbeatSink>,

    command_rx: mpsc::Receiver<InstanceCommand>,

    heartbeat_interval: Duration,
}

impl InstanceMonitorActor {
    pub fn new(
        instance: Instance,
        target: String,
        heartbeat_interval: Duration,
        sink: Arc<dyn HeartbeatSink>,
        command_rx: mpsc::Receiver<InstanceCommand>,
    ) -> Self {
        Self {
            instance,
            target,
            sampler: HardwareSampler::new(),
            sink,
            command_rx,
            heartbeat_interval,
        }
    }

    #[instrument(skip(self), fields(instance = %self.instance.fields.name))]
    pub async fn run(mut self) {
        debug!("starting instance monitor actor");

        let fields = &self.instance.fields;
        let hardware_enabled = fields.hardware_monitoring_enabled;
        let ping_enabled = fields.ping_enabled;

        let mut hardware_ticker = interval(Duration::from_secs(fields.hardware_monitoring_interval.max(1) as u64));
        let mut ping_ticker = interval(Duration::from_secs(fields.ping_interval.max(1) as u64));
        let mut heartbeat_ticker = interval(self.heartbeat_interval);
        for ticker in [&mut hardware_ticker, &mut ping_ticker, &mut heartbeat_ticker] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = hardware_ticker.tick(), if hardware_enabled => {
                    if let Err(e) = self.report_hardware().await {
                        error!("hardware report failed: {:#}", e);
                    }
                }

                _ = ping_ticker.tick(), if ping_enabled => {
                    if let Err(e) = self.report_ping().await {
                        error!("ping report failed: {:#}", e);
                    }
                }

                _ = heartbeat_ticker.tick() => {
                    match self.sink.agent_heartbeat().await {
                        Ok(()) => trace!("agent heartbeat sent"),
                        Err(e) => warn!("agent heartbeat failed: {:#}", e),
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        InstanceCommand::SampleNow { respond_to } => {
                            let _ = respond_to.send(self.report_hardware().await);
                        }

                        InstanceCommand::PingNow { respond_to } => {
                            let _ = respond_to.send(self.report_ping().await);
                        }

                        InstanceCommand::Shutdown => {
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

        debug!("instance monitor actor stopped");
    }

    async fn report_hardware(&mut self) -> Result<NewInstanceHeartbeat> {
        let snapshot = self.sampler.sample();
        let heartbeat = hardware_heartbeat(&self.instance, &snapshot);
        trace!(
            "hardware cpu={:.1}% mem={:.1}% disk={:.1}% -> {}",
            snapshot.cpu_usage, snapshot.memory_usage, snapshot.disk_usage, heartbeat.sample.status
        );

        self.sink
            .submit_instance(heartbeat.clone())
            .await
            .context("failed to submit hardware heartbeat")?;
        Ok(heartbeat)
    }

    async fn report_ping(&self) -> Result<NewInstanceHeartbeat> {
        let fields = &self.instance.fields;
        let heartbeat = tcp_ping(
            self.instance.id,
            &self.target,
            fields.ping_timeout_ms.max(1) as u64,
            fields.ping_retry_count.max(0) as u32,
        )
        .await;

        self.sink
            .submit_instance(heartbeat.clone())
            .await
            .context("failed to submit ping heartbeat")?;
        Ok(heartbeat)
    }
}

/// Handle for controlling an InstanceMonitorActor
#[derive(Clone)]
pub struct InstanceMonitorHandle {
    sender: mpsc::Sender<InstanceCommand>,
}

impl InstanceMonitorHandle {
    pub fn spawn(
        instance: Instance,
        target: String,
        heartbeat_interval: Duration,
        sink: Arc<dyn HeartbeatSink>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = InstanceMonitorActor::new(instance, target, heartbeat_interval, sink, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn sample_now(&self) -> Result<NewInstanceHeartbeat> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(InstanceCommand::SampleNow { respond_to: tx }).await?;
        rx.await?
    }

    pub async fn ping_now(&self) -> Result<NewInstanceHeartbeat> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(InstanceCommand::PingNow { respond_to: tx }).await?;
        rx.await?
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(InstanceCommand::Shutdown).await;
    }
}
