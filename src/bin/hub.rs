use std::sync::Arc;

use clap::Parser;
use inframirror::{
    actors::retention::RetentionHandle,
    api::{ApiState, spawn_api_server},
    config::Config,
    services::Services,
    storage::{SqliteBackend, StorageBackend},
};
use tokio::sync::broadcast;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "inframirror-hub", about = "Infrastructure inventory and monitoring hub")]
struct Args {
    /// Config file (JSON, or TOML by extension)
    #[arg(short)]
    file: Option<String>,

    /// Log level for the inframirror targets
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("inframirror", level),
        ("inframirror_hub", level),
        ("tower_http", level),
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => Config::load(path)?,
        None => {
            let mut config = Config::default();
            config.api.admin_token = inframirror::util::get_admin_token();
            config
        }
    };
    if config.api.admin_token.is_none() {
        info!("no admin token configured, admin routes are open");
    }

    let storage = Arc::new(SqliteBackend::new(&config.storage.path).await?);
    let (events, _) = broadcast::channel(config.api.event_buffer.max(16));
    let services = Services::new(storage.clone(), events, config.status_defaults);

    let mut state = ApiState::new(services, config.api.admin_token.clone());
    let retention = config.retention.enabled.then(|| {
        RetentionHandle::spawn(
            storage.clone(),
            config.retention.retention_days,
            config.retention.cleanup_interval_hours,
        )
    });
    if let Some(handle) = &retention {
        state = state.with_retention(handle.clone());
    }

    let addr = spawn_api_server(config.api.clone(), state).await?;
    info!("hub ready on http://{addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(handle) = retention {
        handle.shutdown().await;
    }
    storage.close().await?;

    Ok(())
}
