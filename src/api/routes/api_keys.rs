//! Admin management of API keys

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::paged;
use crate::api::{error::ApiResult, state::ApiState, types::ApiJson, types::ApiQuery, types::SearchParams};
use crate::model::{Actor, ApiKey, Id, IssueApiKey, IssuedApiKey, PageRequest};
use crate::search::SearchMode;

/// POST /api/api-keys
///
/// The only response that ever carries the plaintext key
pub async fn issue(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    ApiJson(request): ApiJson<IssueApiKey>,
) -> ApiResult<(StatusCode, Json<IssuedApiKey>)> {
    let issued = state.services.credentials.issue(request, &actor).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// GET /api/api-keys
pub async fn list(State(state): State<ApiState>, ApiQuery(page): ApiQuery<PageRequest>) -> ApiResult<impl IntoResponse> {
    Ok(paged(state.services.credentials.list(page).await?))
}

/// GET /api/api-keys/:id
pub async fn get_one(State(state): State<ApiState>, Path(id): Path<Id>) -> ApiResult<Json<ApiKey>> {
    Ok(Json(state.services.credentials.get(id).await?))
}

/// PUT /api/api-keys/:id/deactivate
pub async fn deactivate(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<ApiKey>> {
    Ok(Json(state.services.credentials.deactivate(id, &actor).await?))
}

/// DELETE /api/api-keys/:id
pub async fn remove(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<StatusCode> {
    state.services.credentials.delete(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/api-keys/_search
pub async fn search(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .services
        .credentials
        .search(&params.query, SearchMode::FullText, page)
        .await?;
    Ok(paged(page))
}

/// GET /api/api-keys/_search/highlight
pub async fn search_highlight(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    let hits = state
        .services
        .credentials
        .search_highlight(&params.query, page)
        .await?;
    Ok(paged(hits))
}
