//! Persistence for the inventory, heartbeats, status pages and credentials
//!
//! The services talk to storage through the traits in [`backend`]:
//!
//! - **`Repository<E>`**: generic CRUD for every inventory entity
//! - **Specialised stores**: topology, heartbeats, status pages, credentials,
//!   audit, locks and the search index
//! - **`StorageBackend`**: health, statistics and retention cleanup
//!
//! [`sqlite::SqliteBackend`] implements all of them on one connection pool.
//!
//! ## Usage
//!
//! ```no_run
//! use inframirror::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./inframirror.db").await?;
//!     let health = backend.health_check().await?;
//!     println!("{}", health.message);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::{
    AuditStore, CredentialStore, HealthStatus, HeartbeatStore, LockStore, Registration, Repository,
    SearchIndex, StatusPageStore, StorageBackend, StorageStats, TopologyStore,
};
pub use error::{StorageError, StorageResult};
pub use sqlite::SqliteBackend;
