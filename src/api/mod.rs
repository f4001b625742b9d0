//! REST API and WebSocket server of the hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Services** ([`crate::services`]) behind every handler
//! - **WebSocket** streaming of accepted heartbeats
//!
//! ## Route groups
//!
//! - admin (`/api/*`): Bearer token when one is configured
//! - agent (`/api/agent/*`): `X-API-Key`
//! - public (`/api/health`, `/public/*`): no credentials

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{ApiJson, HealthResponse, StatsResponse};

pub use crate::config::ApiConfig;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::model::{
    Agent, Datacenter, HttpMonitor, Instance, MonitoredService, Region, ServiceInstance, StatusPage,
};

fn admin_routes(state: &ApiState) -> Router<ApiState> {
    let mut router = Router::new();
    router = routes::resources::routes::<Region>(router, "/api/regions");
    router = routes::resources::routes::<Datacenter>(router, "/api/datacenters");
    router = routes::resources::routes::<Agent>(router, "/api/agents");
    router = routes::resources::routes::<Instance>(router, "/api/instances");
    router = routes::resources::routes::<HttpMonitor>(router, "/api/http-monitors");
    router = routes::resources::routes::<MonitoredService>(router, "/api/monitored-services");
    router = routes::resources::routes::<ServiceInstance>(router, "/api/service-instances");
    router = routes::resources::routes::<StatusPage>(router, "/api/status-pages");

    router
        .route("/api/stats", get(routes::stats::get_stats))
        .route("/api/stream", get(websocket::websocket_handler))
        // heartbeat history
        .route("/api/instances/:id/heartbeats", get(routes::heartbeats::instance_history))
        .route("/api/http-monitors/:id/heartbeats", get(routes::heartbeats::http_history))
        .route("/api/monitored-services/:id/heartbeats", get(routes::heartbeats::service_history))
        // monitor assignments
        .route(
            "/api/http-monitors/:id/agents",
            get(routes::assignments::list).post(routes::assignments::assign),
        )
        .route("/api/http-monitors/:id/agents/:agent_id", delete(routes::assignments::unassign))
        // status page children
        .route(
            "/api/status-pages/:id/items",
            get(routes::status_pages::list_items).post(routes::status_pages::add_item),
        )
        .route("/api/status-page-items/:id", delete(routes::status_pages::remove_item))
        .route(
            "/api/status-pages/:id/dependencies",
            get(routes::status_pages::list_dependencies).post(routes::status_pages::add_dependency),
        )
        .route("/api/status-dependencies/:id", delete(routes::status_pages::remove_dependency))
        .route(
            "/api/status-pages/:id/settings",
            get(routes::status_pages::get_settings).put(routes::status_pages::save_settings),
        )
        // api keys
        .route("/api/api-keys", get(routes::api_keys::list).post(routes::api_keys::issue))
        .route("/api/api-keys/_search", get(routes::api_keys::search))
        .route("/api/api-keys/_search/highlight", get(routes::api_keys::search_highlight))
        .route(
            "/api/api-keys/:id",
            get(routes::api_keys::get_one).delete(routes::api_keys::remove),
        )
        .route("/api/api-keys/:id/deactivate", put(routes::api_keys::deactivate))
        // audit
        .route("/api/audit-trails", get(routes::audit::list))
        .route("/api/audit-trails/_search", get(routes::audit::search))
        .route("/api/audit-trails/_search/highlight", get(routes::audit::search_highlight))
        .route("/api/audit-trails/:id", get(routes::audit::get_one))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth,
        ))
}

fn agent_routes(state: &ApiState) -> Router<ApiState> {
    Router::new()
        .route("/api/agent/register", post(routes::agent::register))
        .route("/api/agent/heartbeat", post(routes::agent::heartbeat))
        .route("/api/agent/instances", post(routes::agent::create_instance))
        .route("/api/agent/instance-heartbeats", post(routes::agent::instance_heartbeat))
        .route("/api/agent/http-monitors", get(routes::agent::list_monitors))
        .route("/api/agent/http-monitors/:id", get(routes::agent::get_monitor))
        .route("/api/agent/http-heartbeats", post(routes::agent::http_heartbeat))
        .route("/api/agent/service-heartbeats", post(routes::agent::service_heartbeat))
        .route("/api/agent/service-targets", get(routes::agent::list_service_targets))
        .route(
            "/api/agent/lock",
            post(routes::agent::acquire_lock).delete(routes::agent::release_lock),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::agent_auth,
        ))
}

/// The full application router
pub fn build_router(state: ApiState, enable_cors: bool) -> Router {
    let public = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/public/status/:slug", get(routes::public::status_page));

    let mut app = Router::new()
        .merge(public)
        .merge(agent_routes(&state))
        .merge(admin_routes(&state))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = build_router(state, config.enable_cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
