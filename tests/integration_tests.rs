//! Integration tests for the hub and the agent pipeline

#[path = "integration/helpers.rs"]
mod helpers;

#[path = "integration/storage_persistence.rs"]
mod storage_persistence;

#[cfg(feature = "api")]
#[path = "integration/api_endpoints.rs"]
mod api_endpoints;

#[cfg(feature = "api")]
#[path = "integration/registration_flow.rs"]
mod registration_flow;

#[cfg(feature = "api")]
#[path = "integration/status_page.rs"]
mod status_page;

#[cfg(feature = "api")]
#[path = "integration/probe_pipeline.rs"]
mod probe_pipeline;
