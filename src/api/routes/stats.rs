//! Hub statistics endpoint

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState, types::StatsResponse};
use crate::storage::StorageBackend;

/// GET /api/stats
///
/// Row counts from storage plus the retention actor's counters
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<StatsResponse>> {
    let storage = state.services.storage.get_stats().await?;

    let retention = match &state.retention {
        Some(handle) => handle.get_stats().await,
        None => None,
    };

    Ok(Json(StatsResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
        retention,
        stream_subscribers: state.services.heartbeats.subscriber_count(),
    }))
}
