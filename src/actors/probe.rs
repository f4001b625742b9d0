//! HttpProbeActor - Runs the HTTP checks of one monitor
//!
//! Each monitor assigned to the agent gets its own probe actor. The probe
//! executes the monitor's request on its interval, measures it and hands the
//! resulting heartbeat to a [`HeartbeatSink`].
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → HTTP request (with retries) → classify status → HeartbeatSink
//!     ↑
//!     └─── Commands (CheckNow, UpdateInterval, Shutdown)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, trace, warn};

use super::HeartbeatSink;
use super::messages::ProbeCommand;
use crate::model::{HttpMonitor, HttpSample, Id, NewHttpHeartbeat};

fn millis(elapsed: Duration) -> i32 {
    elapsed.as_millis().min(i32::MAX as u128) as i32
}

fn error_type(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "TIMEOUT"
    } else if err.is_connect() {
        "CONNECTION_ERROR"
    } else if err.is_redirect() {
        "REDIRECT_ERROR"
    } else if err.is_builder() {
        "INVALID_REQUEST"
    } else {
        "HTTP_ERROR"
    }
}

fn build_client(monitor: &HttpMonitor) -> Result<reqwest::Client> {
    let fields = &monitor.fields;
    let redirects = match fields.max_redirects {
        Some(n) if n <= 0 => Policy::none(),
        Some(n) => Policy::limited(n as usize),
        None => Policy::default(),
    };

    reqwest::Client::builder()
        .timeout(Duration::from_secs(fields.timeout_seconds.max(1) as u64))
        .redirect(redirects)
        .danger_accept_invalid_certs(fields.ignore_tls_error.unwrap_or(false))
        .build()
        .context("failed to build HTTP client")
}

/// Actor that probes a single HTTP monitor
pub struct HttpProbeActor {
    monitor: HttpMonitor,

    /// HTTP client configured from the monitor (timeout, redirects, TLS)
    client: reqwest::Client,

    sink: Arc<dyn HeartbeatSink>,

    command_rx: mpsc::Receiver<ProbeCommand>,

    interval_duration: Duration,
}

impl HttpProbeActor {
    pub fn new(
        monitor: HttpMonitor,
        sink: Arc<dyn HeartbeatSink>,
        command_rx: mpsc::Receiver<ProbeCommand>,
    ) -> Result<Self> {
        let client = build_client(&monitor)?;
        let interval_duration = Duration::from_secs(monitor.fields.interval_seconds.max(1) as u64);

        Ok(Self {
            monitor,
            client,
            sink,
            command_rx,
            interval_duration,
        })
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(monitor = %self.monitor.fields.name))]
    pub async fn run(mut self) {
        debug!("starting http probe actor");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.perform_check().await {
                        error!("http probe failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ProbeCommand::CheckNow { respond_to } => {
                            debug!("received CheckNow command");
                            let result = self.perform_check().await;
                            let _ = respond_to.send(result);
                        }

                        ProbeCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = interval(self.interval_duration);
                        }

                        ProbeCommand::Shutdown => {
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

        debug!("http probe actor stopped");
    }

    async fn perform_check(&self) -> Result<NewHttpHeartbeat> {
        let heartbeat = self.probe().await;
        self.sink
            .submit_http(heartbeat.clone())
            .await
            .context("failed to submit http heartbeat")?;
        Ok(heartbeat)
    }

    fn request(&self) -> Result<reqwest::RequestBuilder, String> {
        let fields = &self.monitor.fields;
        let url = fields
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| "monitor has no url".to_string())?;
        let method = reqwest::Method::from_bytes(fields.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| format!("invalid method '{}'", fields.method))?;

        let mut builder = self.client.request(method, url);

        if let Some(Value::Object(headers)) = &fields.headers {
            for (name, value) in headers {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                builder = builder.header(name.as_str(), value);
            }
        }

        builder = match &fields.body {
            None | Some(Value::Null) => builder,
            Some(Value::String(body)) => builder.body(body.clone()),
            Some(body) => builder.json(body),
        };
        Ok(builder)
    }

    /// Executes the request, retrying transport failures
    ///
    /// Never fails: errors are recorded in the heartbeat.
    #[instrument(skip(self), fields(monitor_id = self.monitor.id))]
    pub async fn probe(&self) -> NewHttpHeartbeat {
        let fields = &self.monitor.fields;
        let executed_at = Utc::now();

        let mut sample = HttpSample::new(self.monitor.id, false);
        sample.warning_threshold_ms = fields.response_time_warning_ms;
        sample.critical_threshold_ms = fields.response_time_critical_ms;

        let attempts = 1 + fields.retry_count.max(0) as u32;
        let retry_delay = Duration::from_secs(fields.retry_delay_seconds.max(0) as u64);

        for attempt in 0..attempts {
            if attempt > 0 {
                trace!("retry {} after {:?}", attempt, retry_delay);
                tokio::time::sleep(retry_delay).await;
            }

            let builder = match self.request() {
                Ok(builder) => builder,
                Err(message) => {
                    sample.error_type = Some("INVALID_REQUEST".to_string());
                    sample.error_message = Some(message);
                    break;
                }
            };

            let start = Instant::now();
            match builder.send().await {
                Ok(response) => {
                    sample.time_to_first_byte_ms = Some(millis(start.elapsed()));
                    let status = response.status().as_u16();
                    sample.response_content_type = response
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    sample.response_size_bytes = response
                        .bytes()
                        .await
                        .ok()
                        .map(|body| body.len().min(i32::MAX as usize) as i32);
                    sample.response_time_ms = Some(millis(start.elapsed()));
                    sample.response_status_code = Some(i32::from(status));
                    sample.error_type = None;
                    sample.error_message = None;

                    sample.success = self.monitor.accepts_status(status);
                    if !sample.success {
                        sample.error_type = Some("UNEXPECTED_STATUS".to_string());
                        sample.error_message = Some(format!("Unexpected status code: {}", status));
                    }
                    break;
                }
                Err(e) => {
                    warn!("http probe attempt {} failed: {}", attempt + 1, e);
                    sample.response_time_ms = Some(millis(start.elapsed()));
                    sample.error_type = Some(error_type(&e).to_string());
                    sample.error_message = Some(e.to_string());
                }
            }
        }

        NewHttpHeartbeat {
            executed_at: Some(executed_at),
            sample,
        }
    }
}

/// Handle for controlling an HttpProbeActor
#[derive(Clone)]
pub struct ProbeHandle {
    sender: mpsc::Sender<ProbeCommand>,
    monitor: HttpMonitor,
}

impl ProbeHandle {
    /// Spawn a new probe actor for `monitor`
    pub fn spawn(monitor: HttpMonitor, sink: Arc<dyn HeartbeatSink>) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = HttpProbeActor::new(monitor.clone(), sink, cmd_rx)?;
        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            monitor,
        })
    }

    /// Trigger an immediate probe
    pub async fn check_now(&self) -> Result<NewHttpHeartbeat> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProbeCommand::CheckNow { respond_to: tx })
            .await?;

        rx.await?
    }

    /// Update the probe interval
    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(ProbeCommand::UpdateInterval { interval_secs })
            .await?;
        Ok(())
    }

    /// Shut down the probe
    pub async fn shutdown(self) {
        let _ = self.sender.send(ProbeCommand::Shutdown).await;
    }

    pub fn monitor(&self) -> &HttpMonitor {
        &self.monitor
    }
}

/// What a [`sync_probes`] pass changed
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProbeSync {
    pub started: usize,
    pub stopped: usize,
    pub rescheduled: usize,
}

/// Reconciles the running probes with the monitors the hub assigns
///
/// New monitors get a probe, vanished or disabled ones are shut down. A
/// monitor whose interval alone changed is rescheduled; any other change
/// restarts its probe.
pub async fn sync_probes(
    probes: &mut HashMap<Id, ProbeHandle>,
    monitors: Vec<HttpMonitor>,
    sink: &Arc<dyn HeartbeatSink>,
) -> Result<ProbeSync> {
    let mut summary = ProbeSync::default();
    let wanted: HashMap<Id, HttpMonitor> = monitors
        .into_iter()
        .filter(HttpMonitor::is_enabled)
        .map(|m| (m.id, m))
        .collect();

    let gone: Vec<Id> = probes.keys().filter(|id| !wanted.contains_key(id)).copied().collect();
    for id in gone {
        if let Some(handle) = probes.remove(&id) {
            handle.shutdown().await;
            summary.stopped += 1;
        }
    }

    for (id, monitor) in wanted {
        match probes.get(&id) {
            Some(handle) if *handle.monitor() == monitor => {}
            Some(handle) if only_interval_changed(handle.monitor(), &monitor) => {
                let sender = handle.sender.clone();
                let rescheduled = ProbeHandle { sender, monitor };
                rescheduled
                    .update_interval(rescheduled.monitor.fields.interval_seconds.max(1) as u64)
                    .await?;
                probes.insert(id, rescheduled);
                summary.rescheduled += 1;
            }
            Some(_) => {
                if let Some(old) = probes.remove(&id) {
                    old.shutdown().await;
                }
                probes.insert(id, ProbeHandle::spawn(monitor, sink.clone())?);
                summary.stopped += 1;
                summary.started += 1;
            }
            None => {
                info!("starting probe for monitor {} ({})", id, monitor.fields.name);
                probes.insert(id, ProbeHandle::spawn(monitor, sink.clone())?);
                summary.started += 1;
            }
        }
    }

    Ok(summary)
}

fn only_interval_changed(running: &HttpMonitor, wanted: &HttpMonitor) -> bool {
    let mut normalized = running.clone();
    normalized.fields.interval_seconds = wanted.fields.interval_seconds;
    normalized == *wanted
}
