//! Status page items, dependencies and settings

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::{error::ApiResult, state::ApiState, types::ApiJson};
use crate::model::{
    Actor, Id, NewStatusDependency, NewStatusPageItem, StatusDependency, StatusPageItem, StatusPageSettings,
};

/// GET /api/status-pages/:id/items
pub async fn list_items(State(state): State<ApiState>, Path(id): Path<Id>) -> ApiResult<Json<Vec<StatusPageItem>>> {
    Ok(Json(state.services.status_pages.list_items(id).await?))
}

/// POST /api/status-pages/:id/items
pub async fn add_item(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
    ApiJson(item): ApiJson<NewStatusPageItem>,
) -> ApiResult<(StatusCode, Json<StatusPageItem>)> {
    let item = state.services.status_pages.add_item(id, item, &actor).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// DELETE /api/status-page-items/:id
pub async fn remove_item(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<StatusCode> {
    state.services.status_pages.remove_item(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/status-pages/:id/dependencies
pub async fn list_dependencies(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<StatusDependency>>> {
    Ok(Json(state.services.status_pages.list_dependencies(id).await?))
}

/// POST /api/status-pages/:id/dependencies
pub async fn add_dependency(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
    ApiJson(dependency): ApiJson<NewStatusDependency>,
) -> ApiResult<(StatusCode, Json<StatusDependency>)> {
    let dependency = state
        .services
        .status_pages
        .add_dependency(id, dependency, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(dependency)))
}

/// DELETE /api/status-dependencies/:id
pub async fn remove_dependency(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<StatusCode> {
    state.services.status_pages.remove_dependency(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/status-pages/:id/settings
pub async fn get_settings(State(state): State<ApiState>, Path(id): Path<Id>) -> ApiResult<Json<StatusPageSettings>> {
    Ok(Json(state.services.status_pages.settings(id).await?))
}

/// PUT /api/status-pages/:id/settings
pub async fn save_settings(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
    ApiJson(settings): ApiJson<StatusPageSettings>,
) -> ApiResult<Json<StatusPageSettings>> {
    Ok(Json(
        state
            .services
            .status_pages
            .save_settings(id, settings, &actor)
            .await?,
    ))
}
