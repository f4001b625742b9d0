//! Health check endpoint

use axum::{Json, extract::State};
use tracing::warn;

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;
use crate::storage::StorageBackend;

/// GET /api/health
///
/// Always answers 200; a failing database shows up as `degraded`
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let (status, database) = match state.services.storage.health_check().await {
        Ok(health) if health.healthy => ("ok", health.message),
        Ok(health) => ("degraded", health.message),
        Err(e) => {
            warn!("health check failed: {}", e);
            ("degraded", e.to_string())
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        database,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
