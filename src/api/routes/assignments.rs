//! Agent assignments of HTTP monitors

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::{error::ApiResult, state::ApiState, types::ApiJson};
use crate::model::{Actor, AgentMonitor, AssignMonitor, Id};

/// GET /api/http-monitors/:id/agents
pub async fn list(State(state): State<ApiState>, Path(id): Path<Id>) -> ApiResult<Json<Vec<AgentMonitor>>> {
    Ok(Json(state.services.inventory.list_monitor_assignments(id).await?))
}

/// POST /api/http-monitors/:id/agents
///
/// Assigning an agent twice updates the existing assignment
pub async fn assign(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
    ApiJson(request): ApiJson<AssignMonitor>,
) -> ApiResult<(StatusCode, Json<AgentMonitor>)> {
    let assignment = state.services.inventory.assign_monitor(id, request, &actor).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// DELETE /api/http-monitors/:id/agents/:agent_id
pub async fn unassign(
    State(state): State<ApiState>,
    Path((id, agent_id)): Path<(Id, Id)>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<StatusCode> {
    state
        .services
        .inventory
        .unassign_monitor(id, agent_id, &actor)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
