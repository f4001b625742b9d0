//! Route handlers, grouped by resource

use axum::{Json, response::IntoResponse};
use serde::Serialize;

use crate::model::Page;

pub mod agent;
pub mod api_keys;
pub mod assignments;
pub mod audit;
pub mod health;
pub mod heartbeats;
pub mod public;
pub mod resources;
pub mod stats;
pub mod status_pages;

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// A page body plus the `X-Total-Count` header
pub(crate) fn paged<T: Serialize>(page: Page<T>) -> impl IntoResponse {
    ([(TOTAL_COUNT_HEADER, page.total.to_string())], Json(page))
}
