//! One-JSON-file-per-campaign document store.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use chronicler_types::CampaignId;

use crate::error::StoreError;
use crate::DocumentStore;

/// A [`DocumentStore`] persisting each campaign as `<id>.json` in one
/// directory. Writes go through a temp file followed by a rename, so a
/// crash mid-write never leaves a torn document behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, campaign: CampaignId) -> PathBuf {
        self.dir.join(format!("{campaign}.json"))
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self, campaign: CampaignId) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(campaign);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, campaign: CampaignId, document: &Value) -> Result<(), StoreError> {
        let path = self.path_for(campaign);
        let tmp = path.with_extension("json.tmp");
        write_atomically(&tmp, &path, document)?;
        debug!(campaign = %campaign, path = %path.display(), "saved document");
        Ok(())
    }
}

fn write_atomically(tmp: &Path, path: &Path, document: &Value) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(document)?;
    let mut file = fs::File::create(tmp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}
