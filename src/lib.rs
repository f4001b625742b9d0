//! InfraMirror: infrastructure inventory and monitoring
//!
//! The hub keeps an inventory of regions, datacenters, agents, instances,
//! HTTP monitors, monitored services and status pages in SQLite, ingests
//! heartbeats from agents and serves public status pages. The agent
//! registers with the hub, probes HTTP monitors and reports on its own host.
//!
//! ## Layers
//!
//! ```text
//! api (axum) → services → storage (sqlx sqlite) ← actors::retention
//!                 ↑
//! agent: client::HubClient ← actors::{probe, hardware}
//! ```

pub mod actors;
#[cfg(feature = "agent")]
pub mod agent_state;
#[cfg(feature = "api")]
pub mod api;
pub mod client;
pub mod config;
pub mod model;
pub mod search;
pub mod services;
pub mod storage;
pub mod util;
