//! Campaign synchronization service.
//!
//! Ties the pipeline together per campaign: load and migrate the stored
//! document, parse the proposed delta, validate it, merge, reconcile
//! combat and entities, persist. One update is one atomic turn; a
//! rejected update leaves the stored document untouched.
//!
//! The engine stays pure; everything stateful (persistence, per-campaign
//! locking, clock reads) lives here.

pub mod config;
pub mod error;
pub mod logging;
pub mod result;
pub mod service;

pub use config::{ConfigError, SyncConfig};
pub use error::SyncError;
pub use result::{SnapshotExport, UpdateRequest, UpdateResult};
pub use service::SyncService;
