//! The synchronization service.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use chronicler_engine::{
    apply_patch, parse_directive, parse_patch, reconcile, reconcile_entities, Extractor,
    HeuristicExtractor, Introduction, MigrationManager, Schema, SchemaCatalog,
};
use chronicler_store::{DocumentStore, JsonFileStore, MemoryStore};
use chronicler_types::{ActorState, CampaignId, EntityId, EntityKind, GameDocument, ItemRef};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::result::{SnapshotExport, UpdateRequest, UpdateResult};

/// Per-campaign orchestration of the full pipeline.
///
/// Updates to the same campaign are serialized through a per-campaign
/// lock; updates to different campaigns proceed concurrently.
pub struct SyncService {
    store: Box<dyn DocumentStore>,
    schemas: SchemaCatalog,
    migrations: MigrationManager,
    extractor: Box<dyn Extractor + Send + Sync>,
    accept_sanitized_default: bool,
    locks: Mutex<BTreeMap<CampaignId, Arc<Mutex<()>>>>,
}

impl SyncService {
    /// Build a service over the given store and schema catalog, with the
    /// default extraction heuristic.
    #[must_use]
    pub fn new(store: Box<dyn DocumentStore>, schemas: SchemaCatalog) -> Self {
        Self {
            store,
            schemas,
            migrations: MigrationManager::new(),
            extractor: Box::new(HeuristicExtractor::new()),
            accept_sanitized_default: false,
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replace the entity extraction strategy.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor + Send + Sync>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Build a service from configuration: a file store under the
    /// configured data directory, and the configured (or builtin) schema
    /// catalog.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the data directory cannot be created
    /// or the configured schema file does not load.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let store = JsonFileStore::open(config.storage.data_dir.as_str())?;
        let schemas = match &config.update.schema_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(chronicler_store::StoreError::from)?;
                SchemaCatalog::from_yaml_str(&text)?
            }
            None => SchemaCatalog::builtin(),
        };
        let mut service = Self::new(Box::new(store), schemas);
        service.accept_sanitized_default = config.update.accept_sanitized_default;
        Ok(service)
    }

    /// Build an in-memory service for tests and embedding.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), SchemaCatalog::builtin())
    }

    /// Create a fresh campaign with an initial player state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on persistence failure.
    pub fn create_campaign(
        &self,
        player_id: EntityId,
        player: ActorState,
    ) -> Result<CampaignId, SyncError> {
        let campaign = CampaignId::new();
        let doc = GameDocument::new(player_id, player);
        self.store.save(campaign, &serde_json::to_value(&doc)?)?;
        info!(campaign = %campaign, "created campaign");
        Ok(campaign)
    }

    /// Import an existing raw document under a caller-chosen campaign id,
    /// for example from a [`SnapshotExport`]. The document is migrated on
    /// first load, not here.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CampaignExists`] if the id is already in use.
    pub fn import_campaign(
        &self,
        campaign: CampaignId,
        document: &serde_json::Value,
    ) -> Result<(), SyncError> {
        let lock = self.lock_for(campaign)?;
        let _guard = acquire(&lock)?;
        if self.store.load(campaign)?.is_some() {
            return Err(SyncError::CampaignExists(campaign));
        }
        self.store.save(campaign, document)?;
        info!(campaign = %campaign, "imported campaign");
        Ok(())
    }

    /// Load a campaign's document, migrating it to the current schema
    /// first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CampaignNotFound`] for an unknown id, or the
    /// underlying store or migration failure.
    pub fn load(&self, campaign: CampaignId) -> Result<GameDocument, SyncError> {
        let lock = self.lock_for(campaign)?;
        let _guard = acquire(&lock)?;
        self.load_migrated(campaign)
    }

    /// Export a campaign's document for backup or inspection.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::load`].
    pub fn export_snapshot(&self, campaign: CampaignId) -> Result<SnapshotExport, SyncError> {
        let doc = self.load(campaign)?;
        Ok(SnapshotExport {
            campaign_id: campaign,
            schema_version: doc.schema_version,
            turn_number: doc.turn_number,
            document: serde_json::to_value(&doc)?,
            exported_at: Utc::now(),
        })
    }

    /// Run one proposed update through the full pipeline.
    ///
    /// A patch that fails validation yields `Ok` with
    /// `accepted: false` and the stored document untouched, unless the
    /// request opts into sanitized application and a non-empty sanitized
    /// remainder exists. An `Err` means the pipeline could not run
    /// (unknown campaign, malformed delta, storage failure).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] per the above.
    pub fn apply_update(&self, request: &UpdateRequest) -> Result<UpdateResult, SyncError> {
        let lock = self.lock_for(request.campaign_id)?;
        let _guard = acquire(&lock)?;

        let doc = self.load_migrated(request.campaign_id)?;
        let schema = self.schemas.for_version(doc.schema_version)?;

        let patch = parse_patch(&request.raw_patch, schema)?;
        let report = chronicler_engine::validate(schema, &doc, &patch)?;

        let accept_sanitized = request.accept_sanitized || self.accept_sanitized_default;
        let (patch, warnings) = if report.is_clean() {
            (patch, Vec::new())
        } else if accept_sanitized && !report.sanitized.is_empty() {
            debug!(
                campaign = %request.campaign_id,
                flagged = report.violations.len(),
                "applying sanitized remainder of a partially-valid patch"
            );
            (report.sanitized, report.violations)
        } else {
            warn!(
                campaign = %request.campaign_id,
                flagged = report.violations.len(),
                "rejected update"
            );
            return Ok(self.rejected(&doc, &request.narrative_text, report.violations));
        };

        let previous_round = doc.combat.round;
        let mut merged = apply_patch(&doc, &patch)?;

        let introductions = introductions_in(&doc, &merged);
        let combat = reconcile(&mut merged, previous_round);
        let candidates = self.extractor.extract(&request.narrative_text);
        let tracker = reconcile_entities(
            &mut merged.entities,
            &candidates,
            &introductions,
            merged.turn_number,
        );

        self.store
            .save(request.campaign_id, &serde_json::to_value(&merged)?)?;
        info!(
            campaign = %request.campaign_id,
            turn = merged.turn_number,
            combat_ended = combat.ended,
            "applied update"
        );

        Ok(UpdateResult {
            accepted: true,
            applied_patch_summary: patch.summary(),
            validation_warnings: warnings,
            unresolved_entities: tracker.unresolved,
            combat_ended: combat.ended,
            removed_npcs: combat.removed_npcs,
            new_turn_number: merged.turn_number,
            applied_at: Utc::now(),
        })
    }

    /// Apply an operator recovery directive.
    ///
    /// Directives skip entity tracking but still pass full validation
    /// and the combat reconciler: an operator cannot write state the
    /// schema forbids, and cannot leave combat bookkeeping inconsistent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DirectiveRejected`] when any part of the
    /// directive fails validation; directives apply whole or not at all.
    pub fn apply_recovery(
        &self,
        campaign: CampaignId,
        directive: &str,
    ) -> Result<UpdateResult, SyncError> {
        let lock = self.lock_for(campaign)?;
        let _guard = acquire(&lock)?;

        let doc = self.load_migrated(campaign)?;
        let schema = self.schemas.for_version(doc.schema_version)?;

        let patch = parse_directive(directive)?;
        let report = chronicler_engine::validate(schema, &doc, &patch)?;
        if !report.is_clean() {
            return Err(SyncError::DirectiveRejected { violations: report.violations });
        }

        let previous_round = doc.combat.round;
        let mut merged = apply_patch(&doc, &patch)?;
        let combat = reconcile(&mut merged, previous_round);

        self.store.save(campaign, &serde_json::to_value(&merged)?)?;
        info!(campaign = %campaign, turn = merged.turn_number, "applied recovery directive");

        Ok(UpdateResult {
            accepted: true,
            applied_patch_summary: patch.summary(),
            validation_warnings: Vec::new(),
            unresolved_entities: Vec::new(),
            combat_ended: combat.ended,
            removed_npcs: combat.removed_npcs,
            new_turn_number: merged.turn_number,
            applied_at: Utc::now(),
        })
    }

    /// The active schema table for a document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Schema`] when no table covers the version.
    pub fn schema_for(&self, doc: &GameDocument) -> Result<&Schema, SyncError> {
        Ok(self.schemas.for_version(doc.schema_version)?)
    }

    /// Load and migrate; a migrated document is persisted immediately so
    /// migration runs at most once per campaign per version step.
    fn load_migrated(&self, campaign: CampaignId) -> Result<GameDocument, SyncError> {
        let raw = self
            .store
            .load(campaign)?
            .ok_or(SyncError::CampaignNotFound(campaign))?;
        let outcome = self.migrations.migrate(raw)?;
        if outcome.migrated {
            info!(campaign = %campaign, steps = ?outcome.steps, "migrated stored document");
            self.store
                .save(campaign, &serde_json::to_value(&outcome.document)?)?;
        }
        Ok(outcome.document)
    }

    /// Build the rejection result, still scanning the narrative for
    /// unresolved mentions (against a scratch copy of the manifest; a
    /// rejected update must not move lifecycle state).
    fn rejected(
        &self,
        doc: &GameDocument,
        narrative: &str,
        violations: Vec<chronicler_engine::Violation>,
    ) -> UpdateResult {
        let candidates = self.extractor.extract(narrative);
        let mut scratch = doc.entities.clone();
        let tracker = reconcile_entities(&mut scratch, &candidates, &[], doc.turn_number);
        UpdateResult {
            accepted: false,
            applied_patch_summary: Vec::new(),
            validation_warnings: violations,
            unresolved_entities: tracker.unresolved,
            combat_ended: false,
            removed_npcs: Vec::new(),
            new_turn_number: doc.turn_number,
            applied_at: Utc::now(),
        }
    }

    fn lock_for(&self, campaign: CampaignId) -> Result<Arc<Mutex<()>>, SyncError> {
        let mut locks = self.locks.lock().map_err(|_| SyncError::LockPoisoned)?;
        Ok(Arc::clone(locks.entry(campaign).or_default()))
    }
}

fn acquire(lock: &Arc<Mutex<()>>) -> Result<MutexGuard<'_, ()>, SyncError> {
    lock.lock().map_err(|_| SyncError::LockPoisoned)
}

/// Entities present after the merge but not before: new NPCs, new
/// inventory items, and newly discovered locations. Each gets a manifest
/// introduction so same-turn narrative mentions of them resolve.
fn introductions_in(before: &GameDocument, after: &GameDocument) -> Vec<Introduction> {
    let mut introductions: Vec<Introduction> = after
        .npcs
        .iter()
        .filter(|(id, _)| !before.npcs.contains_key(*id))
        .map(|(id, npc)| Introduction {
            id: id.clone(),
            display_name: npc.display_name.clone(),
            kind: EntityKind::Character,
        })
        .collect();

    let known_items: BTreeSet<&EntityId> = inventories(before).map(|item| &item.id).collect();
    let mut new_items: BTreeSet<&EntityId> = BTreeSet::new();
    for item in inventories(after) {
        if !known_items.contains(&item.id) && new_items.insert(&item.id) {
            introductions.push(Introduction {
                id: item.id.clone(),
                display_name: item.display_name.clone(),
                kind: EntityKind::Item,
            });
        }
    }

    for location in after
        .world
        .discovered_locations
        .difference(&before.world.discovered_locations)
    {
        if let Some(id) = EntityId::from_display_name(location) {
            introductions.push(Introduction {
                id,
                display_name: location.clone(),
                kind: EntityKind::Location,
            });
        }
    }

    introductions
}

/// Every inventory item in a document, across the player and all NPCs.
fn inventories(doc: &GameDocument) -> impl Iterator<Item = &ItemRef> {
    doc.player
        .inventory
        .iter()
        .chain(doc.npcs.values().flat_map(|npc| npc.inventory.iter()))
}
