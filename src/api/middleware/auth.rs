//! Authentication middleware for the admin and agent routers
//!
//! Both layers put the [`Actor`] performing the request into the request
//! extensions so handlers can pass it on to the audit trail.

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::api::error::ApiError;
use crate::api::state::ApiState;
use crate::model::{Actor, ApiKey};

pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated key behind an agent request
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub key: ApiKey,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn actor_from(name: String, headers: &HeaderMap) -> Actor {
    Actor {
        name,
        ip_address: client_ip(headers),
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Admin authentication middleware
///
/// Checks for the Bearer token in the Authorization header when one is
/// configured; the routes stay open otherwise.
pub async fn admin_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if let Some(expected_token) = state.admin_token.as_deref() {
        let auth_header = request
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?;

        if token != expected_token {
            return Err(AuthError::InvalidToken);
        }
    }

    let actor = actor_from("admin".to_string(), request.headers());
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}

/// Agent authentication middleware
///
/// Requires an active, unexpired key in `X-API-Key`.
pub async fn agent_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let plaintext = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let key = state
        .services
        .credentials
        .authenticate(plaintext.as_deref(), Utc::now())
        .await?;
    debug!("agent request authenticated with key {}", key.id);

    let actor = actor_from(format!("api-key:{}", key.name), request.headers());
    request.extensions_mut().insert(actor);
    request.extensions_mut().insert(AgentIdentity { key });

    Ok(next.run(request).await)
}

/// Authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing Authorization header"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization format (expected: Bearer <token>)",
            ),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid token"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
