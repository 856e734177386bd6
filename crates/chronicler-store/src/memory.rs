//! In-memory document store for tests and embedded use.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use chronicler_types::CampaignId;

use crate::error::StoreError;
use crate::DocumentStore;

/// A [`DocumentStore`] backed by a mutex-guarded map. Nothing survives
/// the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<CampaignId, Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, campaign: CampaignId) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(documents.get(&campaign).cloned())
    }

    fn save(&self, campaign: CampaignId, document: &Value) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().map_err(|_| StoreError::Poisoned)?;
        documents.insert(campaign, document.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_before_save_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.load(CampaignId::new()).unwrap(), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = MemoryStore::new();
        let campaign = CampaignId::new();
        store.save(campaign, &json!({"turn_number": 3})).unwrap();
        assert_eq!(store.load(campaign).unwrap(), Some(json!({"turn_number": 3})));
    }

    #[test]
    fn save_replaces_previous_version() {
        let store = MemoryStore::new();
        let campaign = CampaignId::new();
        store.save(campaign, &json!({"turn_number": 1})).unwrap();
        store.save(campaign, &json!({"turn_number": 2})).unwrap();
        assert_eq!(store.load(campaign).unwrap(), Some(json!({"turn_number": 2})));
    }
}
