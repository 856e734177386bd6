//! Request and response types for the synchronization service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use chronicler_engine::{UnresolvedEntityReference, Violation};
use chronicler_types::{CampaignId, EntityId};

/// One proposed turn update.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// The campaign to update.
    pub campaign_id: CampaignId,

    /// The narrative text the delta was derived from; scanned for entity
    /// mentions.
    pub narrative_text: String,

    /// The raw proposed delta, as produced by the generation
    /// collaborator.
    pub raw_patch: Value,

    /// Apply the sanitized remainder when validation flags part of the
    /// patch, instead of rejecting the whole update.
    pub accept_sanitized: bool,
}

/// The outcome of one update, whether applied or rejected.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    /// Whether the document changed.
    pub accepted: bool,

    /// Human-readable lines describing what was applied. Empty when the
    /// update was rejected.
    pub applied_patch_summary: Vec<String>,

    /// Everything the validator flagged. Non-empty on a rejection, and
    /// on a sanitized apply.
    pub validation_warnings: Vec<Violation>,

    /// Narrative mentions that resolved to no known entity.
    pub unresolved_entities: Vec<UnresolvedEntityReference>,

    /// Whether this update ended a combat encounter.
    pub combat_ended: bool,

    /// Dead enemies garbage-collected at combat end.
    pub removed_npcs: Vec<EntityId>,

    /// The document's turn counter after this update.
    pub new_turn_number: u64,

    /// When the service finished handling the update.
    pub applied_at: DateTime<Utc>,
}

/// A full document export for backup or inspection.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotExport {
    /// The exported campaign.
    pub campaign_id: CampaignId,

    /// Schema version of the exported document.
    pub schema_version: u32,

    /// Turn counter at export time.
    pub turn_number: u64,

    /// The serialized document.
    pub document: Value,

    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
}
