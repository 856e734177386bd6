//! Service error type.

use chronicler_engine::{
    MergeError, MigrationError, PatchShapeError, SchemaError, Violation,
};
use chronicler_store::StoreError;
use chronicler_types::CampaignId;

/// A failure while servicing a campaign operation.
///
/// Validation rejections of a normal update are not errors (see
/// [`UpdateResult::accepted`]); an `Err` from the service means the
/// operation could not run at all, and the stored document is unchanged.
///
/// [`UpdateResult::accepted`]: crate::result::UpdateResult::accepted
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The raw delta or recovery directive was malformed.
    #[error(transparent)]
    Shape(#[from] PatchShapeError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The stored document could not be migrated to the current schema.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// A validated patch failed to apply.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// No schema table is available for the document's version.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The document could not round-trip through JSON.
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No document exists for this campaign.
    #[error("campaign {0} not found")]
    CampaignNotFound(CampaignId),

    /// A document already exists for this campaign.
    #[error("campaign {0} already exists")]
    CampaignExists(CampaignId),

    /// A recovery directive violated the schema. Directives are applied
    /// whole or not at all; the violations say what failed.
    #[error("recovery directive rejected with {} violation(s)", violations.len())]
    DirectiveRejected {
        /// Everything the validator flagged.
        violations: Vec<Violation>,
    },

    /// A campaign lock was poisoned by a panicking holder.
    #[error("campaign lock poisoned")]
    LockPoisoned,
}
