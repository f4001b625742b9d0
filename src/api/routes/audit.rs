//! Read-only access to the audit trail

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use super::paged;
use crate::api::{error::ApiResult, state::ApiState, types::ApiQuery, types::SearchParams};
use crate::model::{AuditTrail, Id, PageRequest};
use crate::search::SearchMode;

/// GET /api/audit-trails?page&size
///
/// Newest entries first
pub async fn list(State(state): State<ApiState>, ApiQuery(page): ApiQuery<PageRequest>) -> ApiResult<impl IntoResponse> {
    Ok(paged(state.services.audit.list(page).await?))
}

/// GET /api/audit-trails/:id
pub async fn get_one(State(state): State<ApiState>, Path(id): Path<Id>) -> ApiResult<Json<AuditTrail>> {
    Ok(Json(state.services.audit.get(id).await?))
}

/// GET /api/audit-trails/_search
pub async fn search(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .services
        .audit
        .search(&params.query, SearchMode::FullText, page)
        .await?;
    Ok(paged(page))
}

/// GET /api/audit-trails/_search/highlight
pub async fn search_highlight(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(paged(state.services.audit.search_highlight(&params.query, page).await?))
}
