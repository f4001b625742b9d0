//! Anonymous status page view

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{error::ApiResult, state::ApiState};
use crate::model::PublicStatusPage;

/// GET /public/status/:slug
///
/// 404 for an unknown slug, 403 for a page that is not public
pub async fn status_page(State(state): State<ApiState>, Path(slug): Path<String>) -> ApiResult<Json<PublicStatusPage>> {
    Ok(Json(state.services.status_pages.public_view(&slug).await?))
}
