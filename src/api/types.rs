//! Request and response shapes that only exist at the HTTP boundary
//!
//! Domain records serialize themselves (see [`crate::model`]); the types here
//! cover query strings, small request bodies and the operational endpoints.

use std::str::FromStr;

use axum::extract::{FromRequest, FromRequestParts};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::actors::messages::RetentionStats;
use crate::model::{HeartbeatType, Id};
use crate::storage::StorageStats;

/// `axum::Json` whose rejections render as [`ApiError`]
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` whose rejections render as [`ApiError`]
#[derive(Debug, Clone, Copy, Default, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Response for `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` when the database answers, `degraded` otherwise
    pub status: String,

    pub database: String,

    /// Current time (RFC3339)
    pub timestamp: String,
}

/// Response for `GET /api/stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub timestamp: String,

    pub storage: StorageStats,

    /// `None` when the hub runs without a retention actor
    pub retention: Option<RetentionStats>,

    /// Live WebSocket subscribers
    pub stream_subscribers: usize,
}

/// `?query=` of the `_search` endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

/// `?type=` of the instance heartbeat history
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(rename = "type")]
    pub heartbeat_type: Option<String>,
}

impl HistoryParams {
    pub fn heartbeat_type(&self) -> Result<Option<HeartbeatType>, ApiError> {
        match self.heartbeat_type.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => Ok(Some(HeartbeatType::from_str(raw)?)),
        }
    }
}

/// `?agentId=` of the agent monitor listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorQuery {
    pub agent_id: Option<Id>,
}

/// Optional body of `POST /api/agent/lock`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub ttl_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_type_parsing() {
        let params = HistoryParams {
            heartbeat_type: Some("hardware".into()),
        };
        assert_eq!(params.heartbeat_type().unwrap(), Some(HeartbeatType::Hardware));

        let params = HistoryParams {
            heartbeat_type: Some(" ".into()),
        };
        assert_eq!(params.heartbeat_type().unwrap(), None);

        let params = HistoryParams {
            heartbeat_type: Some("smoke".into()),
        };
        assert!(params.heartbeat_type().is_err());
    }
}
