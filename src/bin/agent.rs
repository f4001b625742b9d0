use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use inframirror::{
    actors::{
        HeartbeatSink,
        hardware::{InstanceMonitorHandle, ping_target},
        probe::{ProbeHandle, sync_probes},
        service_probe::{ServiceProbeHandle, sync_service_probes},
    },
    agent_state::AgentState,
    client::HubClient,
    config::{AgentConfig, read_config_file},
    model::{Id, Instance, NewInstance},
    services::RegisterAgent,
    util::{get_agent_api_key, get_state_file},
};
use sysinfo::System;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// TTL of the lock held while the agent sets itself up
const SETUP_LOCK_TTL_SECS: u64 = 120;

#[derive(Debug, Clone, Parser)]
#[command(name = "inframirror-agent", about = "Monitoring agent reporting to an InfraMirror hub")]
struct Args {
    /// Config file (JSON, or TOML by extension)
    #[arg(short)]
    file: String,

    /// Log level for the inframirror targets
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("inframirror", level),
        ("inframirror_agent", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn agent_name(config: &AgentConfig) -> String {
    config
        .name
        .clone()
        .or_else(System::host_name)
        .unwrap_or_else(|| "inframirror-agent".to_string())
}

fn state_path(config: &AgentConfig) -> anyhow::Result<PathBuf> {
    match get_state_file().map(PathBuf::from).or_else(|| config.state_file.clone()) {
        Some(path) => Ok(path),
        None => AgentState::default_path(),
    }
}

#[instrument(skip_all)]
async fn register(config: &AgentConfig, state: &mut AgentState, path: &Path) -> anyhow::Result<()> {
    let bootstrap = get_agent_api_key()
        .or_else(|| config.bootstrap_api_key.clone())
        .context("no agent state and no bootstrap API key (set bootstrap_api_key or INFRAMIRROR_API_KEY)")?;
    let client = HubClient::new(&config.hub_url, bootstrap)?;

    let mut tags = config.tags.clone();
    tags.insert("region".to_string(), config.region.clone());
    tags.insert("datacenter".to_string(), config.datacenter.clone());

    let response = client
        .register(&RegisterAgent {
            name: agent_name(config),
            hostname: System::host_name(),
            ip_address: None,
            os_type: System::name(),
            os_version: System::os_version(),
            agent_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            tags,
        })
        .await?;
    info!("{}", response.message);

    state.agent_id = Some(response.agent_id);
    state.api_key = Some(response.api_key);
    state.region = Some(response.region);
    state.datacenter = Some(response.datacenter);
    state.instance_id = None;
    state.save(path)
}

fn own_instance(config: &AgentConfig, agent_id: Id) -> NewInstance {
    let name = agent_name(config);
    let hostname = System::host_name().unwrap_or_else(|| name.clone());

    let mut instance = NewInstance::new(name, hostname, "VM", "AGENT");
    instance.operating_system = System::long_os_version();
    instance.platform = Some(System::cpu_arch());
    instance.hardware_monitoring_enabled = true;
    instance.agent_id = Some(agent_id);
    config.instance.apply(&mut instance);
    instance
}

async fn acquire_setup_lock(client: &HubClient) -> anyhow::Result<()> {
    loop {
        match client.acquire_lock(Some(SETUP_LOCK_TTL_SECS)).await? {
            Some(lock) => {
                debug!("setup lock held until {}", lock.expires_at);
                return Ok(());
            }
            None => {
                warn!("another process holds this agent's lock, retrying in 5s");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// Registers if needed and makes sure the agent's own instance exists
async fn setup(config: &AgentConfig, state: &mut AgentState, path: &Path) -> anyhow::Result<(HubClient, Instance)> {
    if !state.is_registered() {
        register(config, state, path).await?;
    }
    let (Some(agent_id), Some(api_key)) = (state.agent_id, state.api_key.clone()) else {
        bail!("agent state in {} has no identity", path.display());
    };
    let client = HubClient::new(&config.hub_url, api_key)?;

    acquire_setup_lock(&client).await?;
    let fields = own_instance(config, agent_id);
    let instance = match state.instance_id {
        Some(id) => {
            let now = Utc::now();
            Instance {
                id,
                fields,
                created_at: now,
                updated_at: now,
                last_ping_at: None,
                last_hardware_check_at: None,
            }
        }
        None => {
            let created = client.create_instance(&fields).await;
            let created = match created {
                Ok(instance) => instance,
                Err(e) => {
                    client.release_lock().await.ok();
                    return Err(e);
                }
            };
            info!("created instance {} ({})", created.id, created.fields.name);
            state.instance_id = Some(created.id);
            state.save(path)?;
            created
        }
    };
    client.release_lock().await?;

    Ok((client, instance))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config: AgentConfig = read_config_file(&args.file)?;
    let path = state_path(&config)?;
    let mut state = AgentState::load(&path)?;

    let (client, instance) = setup(&config, &mut state, &path).await?;
    let agent_id = instance.fields.agent_id;
    info!("agent {:?} reporting to {}", agent_id, client.base_url());

    let sink: Arc<dyn HeartbeatSink> = Arc::new(client.clone());
    let instance_monitor = InstanceMonitorHandle::spawn(
        instance,
        ping_target(&config.hub_url)?,
        Duration::from_secs(config.heartbeat_interval.max(1)),
        sink.clone(),
    );

    let mut probes: HashMap<Id, ProbeHandle> = HashMap::new();
    let mut service_probes: HashMap<Id, ServiceProbeHandle> = HashMap::new();
    let mut sync_ticker = interval(Duration::from_secs(config.monitor_sync_interval.max(10)));
    sync_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let scope = if config.assigned_only { agent_id } else { None };

    loop {
        tokio::select! {
            _ = sync_ticker.tick() => {
                match client.list_monitors(scope).await {
                    Ok(monitors) => match sync_probes(&mut probes, monitors, &sink).await {
                        Ok(sync) => debug!(
                            "probes: {} started, {} stopped, {} rescheduled",
                            sync.started, sync.stopped, sync.rescheduled
                        ),
                        Err(e) => error!("failed to sync probes: {:#}", e),
                    },
                    Err(e) => error!("failed to fetch monitors: {:#}", e),
                }

                match client.list_service_targets().await {
                    Ok(targets) => {
                        let sync = sync_service_probes(&mut service_probes, targets, &sink).await;
                        debug!("service checks: {} started, {} stopped", sync.started, sync.stopped);
                    }
                    Err(e) => error!("failed to fetch service targets: {:#}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    for (_, probe) in probes.drain() {
        probe.shutdown().await;
    }
    for (_, service) in service_probes.drain() {
        service.shutdown().await;
    }
    instance_monitor.shutdown().await;

    Ok(())
}
