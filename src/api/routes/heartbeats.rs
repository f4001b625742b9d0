//! Heartbeat history per instance, monitor and service

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

use super::paged;
use crate::api::{error::ApiResult, state::ApiState, types::ApiQuery, types::HistoryParams};
use crate::model::{Id, PageRequest};

/// GET /api/instances/:id/heartbeats?type&page&size
///
/// Newest first; `type` narrows to `PING` or `HARDWARE`
pub async fn instance_history(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    ApiQuery(params): ApiQuery<HistoryParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    let heartbeat_type = params.heartbeat_type()?;
    let page = state
        .services
        .heartbeats
        .instance_history(id, heartbeat_type, page)
        .await?;
    Ok(paged(page))
}

/// GET /api/http-monitors/:id/heartbeats
pub async fn http_history(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(paged(state.services.heartbeats.http_history(id, page).await?))
}

/// GET /api/monitored-services/:id/heartbeats
pub async fn service_history(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(paged(state.services.heartbeats.service_history(id, page).await?))
}
