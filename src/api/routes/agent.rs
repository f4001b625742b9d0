//! Agent-facing API, authenticated by `X-API-Key`
//!
//! Heartbeats submitted with a key bound to an agent are attributed to that
//! agent regardless of the payload.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::middleware::AgentIdentity;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{ApiJson, ApiQuery, LockRequest, MonitorQuery},
};
use crate::model::{
    Actor, Agent, AgentLock, HttpHeartbeat, HttpMonitor, Id, Instance, InstanceHeartbeat, NewHttpHeartbeat,
    NewInstance, NewInstanceHeartbeat, NewServiceHeartbeat, ServiceHeartbeat, ServiceTarget,
};
use crate::services::{RegisterAgent, RegistrationResponse};

fn bound_agent(identity: &AgentIdentity) -> ApiResult<Id> {
    identity
        .key
        .agent_id
        .ok_or_else(|| ApiError::Forbidden("API key is not bound to an agent".to_string()))
}

/// POST /api/agent/register
pub async fn register(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    ApiJson(request): ApiJson<RegisterAgent>,
) -> ApiResult<(StatusCode, Json<RegistrationResponse>)> {
    let response = state.services.registration.register(request, &actor).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/agent/heartbeat
pub async fn heartbeat(
    State(state): State<ApiState>,
    Extension(identity): Extension<AgentIdentity>,
) -> ApiResult<Json<Agent>> {
    Ok(Json(state.services.heartbeats.agent_heartbeat(&identity.key).await?))
}

/// POST /api/agent/instances
pub async fn create_instance(
    State(state): State<ApiState>,
    Extension(identity): Extension<AgentIdentity>,
    Extension(actor): Extension<Actor>,
    ApiJson(mut instance): ApiJson<NewInstance>,
) -> ApiResult<(StatusCode, Json<Instance>)> {
    if instance.agent_id.is_none() {
        instance.agent_id = identity.key.agent_id;
    }

    let instance: Instance = state.services.inventory.create(instance, &actor).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

/// POST /api/agent/instance-heartbeats
pub async fn instance_heartbeat(
    State(state): State<ApiState>,
    Extension(identity): Extension<AgentIdentity>,
    ApiJson(heartbeat): ApiJson<NewInstanceHeartbeat>,
) -> ApiResult<Json<InstanceHeartbeat>> {
    let stored = state
        .services
        .heartbeats
        .submit_instance_heartbeat(heartbeat, identity.key.agent_id)
        .await?;
    Ok(Json(stored))
}

/// GET /api/agent/http-monitors?agentId
///
/// Monitors assigned to `agentId`, or every enabled monitor without it
pub async fn list_monitors(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<MonitorQuery>,
) -> ApiResult<Json<Vec<HttpMonitor>>> {
    Ok(Json(state.services.inventory.monitors_for_agent(query.agent_id).await?))
}

/// GET /api/agent/http-monitors/:id
pub async fn get_monitor(State(state): State<ApiState>, Path(id): Path<Id>) -> ApiResult<Json<HttpMonitor>> {
    Ok(Json(state.services.inventory.get(id).await?))
}

/// POST /api/agent/http-heartbeats
pub async fn http_heartbeat(
    State(state): State<ApiState>,
    Extension(identity): Extension<AgentIdentity>,
    ApiJson(heartbeat): ApiJson<NewHttpHeartbeat>,
) -> ApiResult<Json<HttpHeartbeat>> {
    let stored = state
        .services
        .heartbeats
        .submit_http_heartbeat(heartbeat, identity.key.agent_id)
        .await?;
    Ok(Json(stored))
}

/// GET /api/agent/service-targets
///
/// Service instances running on the calling agent's instances
pub async fn list_service_targets(
    State(state): State<ApiState>,
    Extension(identity): Extension<AgentIdentity>,
) -> ApiResult<Json<Vec<ServiceTarget>>> {
    let agent_id = bound_agent(&identity)?;
    Ok(Json(state.services.inventory.service_targets(agent_id).await?))
}

/// POST /api/agent/service-heartbeats
pub async fn service_heartbeat(
    State(state): State<ApiState>,
    Extension(identity): Extension<AgentIdentity>,
    ApiJson(heartbeat): ApiJson<NewServiceHeartbeat>,
) -> ApiResult<Json<ServiceHeartbeat>> {
    let stored = state
        .services
        .heartbeats
        .submit_service_heartbeat(heartbeat, identity.key.agent_id)
        .await?;
    Ok(Json(stored))
}

/// An empty body takes the default TTL; anything else must be a valid
/// [`LockRequest`]
fn lock_ttl(body: &[u8]) -> ApiResult<Option<u64>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let Json(request) = Json::<LockRequest>::from_bytes(body)?;
    Ok(request.ttl_seconds)
}

/// POST /api/agent/lock
///
/// 409 while another holder's lock is unexpired
pub async fn acquire_lock(
    State(state): State<ApiState>,
    Extension(identity): Extension<AgentIdentity>,
    body: Bytes,
) -> ApiResult<Json<AgentLock>> {
    let agent_id = bound_agent(&identity)?;
    let ttl = lock_ttl(&body)?;

    Ok(Json(state.services.locks.acquire(agent_id, ttl).await?))
}

/// DELETE /api/agent/lock
pub async fn release_lock(
    State(state): State<ApiState>,
    Extension(identity): Extension<AgentIdentity>,
) -> ApiResult<StatusCode> {
    let agent_id = bound_agent(&identity)?;

    if state.services.locks.release(agent_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("agent {agent_id} holds no lock")))
    }
}
