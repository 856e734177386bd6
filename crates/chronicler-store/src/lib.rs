//! Document persistence backends.
//!
//! Documents are stored in their serialized [`Value`] form, not as typed
//! structs: migration has to read documents written under older schema
//! versions, so deserialization into the current model happens after the
//! migration chain runs, never here.
//!
//! Two backends ship: [`MemoryStore`] for tests and embedding, and
//! [`JsonFileStore`] persisting one pretty-printed JSON file per
//! campaign.

pub mod error;
pub mod file;
pub mod memory;

pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde_json::Value;

use chronicler_types::CampaignId;

/// A keyed document store.
///
/// Implementations are shared across threads; interior mutability is the
/// implementation's concern.
pub trait DocumentStore: Send + Sync {
    /// Load the raw stored document for a campaign, or `None` if the
    /// campaign has never been saved.
    fn load(&self, campaign: CampaignId) -> Result<Option<Value>, StoreError>;

    /// Persist the raw document for a campaign, replacing any previous
    /// version atomically.
    fn save(&self, campaign: CampaignId, document: &Value) -> Result<(), StoreError>;
}
