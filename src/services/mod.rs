//! Business logic between the HTTP handlers and storage
//!
//! Every service holds the shared [`SqliteBackend`] and talks to it through
//! the storage traits. Writes follow the same sequence: validate, persist,
//! refresh the search document, then record an audit row.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::model::{HeartbeatEvent, Page, StatusThresholds};
use crate::search::SearchHit;
use crate::storage::SqliteBackend;

pub mod audit;
pub mod credentials;
pub mod error;
pub mod heartbeats;
pub mod inventory;
pub mod locks;
pub mod registration;
pub mod status_pages;

pub use audit::AuditService;
pub use credentials::CredentialService;
pub use error::{ServiceError, ServiceResult};
pub use heartbeats::HeartbeatService;
pub use inventory::InventoryService;
pub use locks::AgentLockService;
pub use registration::{RegisterAgent, RegistrationResponse, RegistrationService};
pub use status_pages::StatusPageService;

/// Records loaded for a page of hits, keeping the hit totals
pub(crate) fn search_page<T>(hits: Page<SearchHit>, items: Vec<T>) -> Page<T> {
    Page {
        items,
        total: hits.total,
        page: hits.page,
        size: hits.size,
    }
}

/// All services, wired to one backend
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<SqliteBackend>,
    pub inventory: InventoryService,
    pub registration: RegistrationService,
    pub credentials: CredentialService,
    pub heartbeats: HeartbeatService,
    pub status_pages: StatusPageService,
    pub audit: AuditService,
    pub locks: AgentLockService,
}

impl Services {
    pub fn new(
        storage: Arc<SqliteBackend>,
        events: broadcast::Sender<HeartbeatEvent>,
        status_defaults: StatusThresholds,
    ) -> Self {
        let audit = AuditService::new(storage.clone());
        let credentials = CredentialService::new(storage.clone(), audit.clone());

        Self {
            inventory: InventoryService::new(storage.clone(), audit.clone()),
            registration: RegistrationService::new(storage.clone(), audit.clone()),
            heartbeats: HeartbeatService::new(storage.clone(), events),
            status_pages: StatusPageService::new(storage.clone(), status_defaults),
            locks: AgentLockService::new(storage.clone()),
            credentials,
            audit,
            storage,
        }
    }
}
