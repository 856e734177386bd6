//! End-to-end tests of load-time schema migration.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use serde_json::json;

use chronicler_engine::MigrationError;
use chronicler_sync::{SyncError, SyncService, UpdateRequest};
use chronicler_types::{CampaignId, EntityId, Lifecycle, CURRENT_SCHEMA_VERSION};

/// A pre-versioning document: bare-integer hit points, quests as a list,
/// no entity manifest, no `schema_version` field.
fn v1_document() -> serde_json::Value {
    json!({
        "player_id": "pc_kaelan",
        "turn_number": 12,
        "player": {"display_name": "Kaelan", "role": "player", "hp": 14},
        "npcs": {
            "npc_lyra": {"display_name": "Lyra", "role": "ally", "hp": 9}
        },
        "quests": [
            {"name": "Guard the Caravan", "status": "active"}
        ],
        "world": {"location": "Harrow Deep"}
    })
}

fn imported(raw: serde_json::Value) -> (SyncService, CampaignId) {
    let service = SyncService::in_memory();
    let campaign = CampaignId::new();
    service.import_campaign(campaign, &raw).unwrap();
    (service, campaign)
}

#[test]
fn legacy_document_is_migrated_on_load() {
    let (service, campaign) = imported(v1_document());
    let doc = service.load(campaign).unwrap();

    assert_eq!(doc.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(doc.turn_number, 12);
    assert_eq!(doc.player.hp.current, 14);
    assert_eq!(doc.player.hp.max, 14);

    // Quest list became a keyed map.
    assert!(doc
        .quests
        .contains_key(&chronicler_types::QuestId::new("guard_the_caravan").unwrap()));

    // Manifest synthesized from the actors present at migration time.
    let lyra = doc.entities.get(&EntityId::new("npc_lyra").unwrap()).unwrap();
    assert_eq!(lyra.lifecycle, Lifecycle::Active);
    assert_eq!(lyra.last_turn_seen, 12);
}

#[test]
fn migration_persists_before_the_first_update() {
    let (service, campaign) = imported(v1_document());

    // Touch the campaign once; the migrated form must be stored even
    // though this update is rejected.
    let result = service
        .apply_update(&UpdateRequest {
            campaign_id: campaign,
            narrative_text: String::new(),
            raw_patch: json!({"player": {"hp": {"current": 99}}}),
            accept_sanitized: false,
        })
        .unwrap();
    assert!(!result.accepted);

    let snapshot = service.export_snapshot(campaign).unwrap();
    assert_eq!(snapshot.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(
        snapshot.document.get("schema_version").and_then(serde_json::Value::as_u64),
        Some(u64::from(CURRENT_SCHEMA_VERSION))
    );
}

#[test]
fn migrated_document_accepts_updates() {
    let (service, campaign) = imported(v1_document());
    let result = service
        .apply_update(&UpdateRequest {
            campaign_id: campaign,
            narrative_text: "Kaelan rests by the fire with Lyra.".to_owned(),
            raw_patch: json!({"player": {"hp": {"current": 14}}, "world": {"calendar": "dawn"}}),
            accept_sanitized: false,
        })
        .unwrap();

    assert!(result.accepted);
    assert_eq!(result.new_turn_number, 13);
    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.world.calendar, "dawn");
    assert_eq!(doc.world.location, "Harrow Deep");
}

#[test]
fn migration_is_idempotent() {
    let (service, campaign) = imported(v1_document());
    let first = service.load(campaign).unwrap();
    let second = service.load(campaign).unwrap();
    assert_eq!(first, second);
}

#[test]
fn future_versions_are_refused() {
    let mut raw = v1_document();
    raw["schema_version"] = json!(CURRENT_SCHEMA_VERSION + 1);
    let (service, campaign) = imported(raw);

    let err = service.load(campaign).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Migration(MigrationError::FutureVersion { .. })
    ));
}

#[test]
fn unmigratable_versions_are_refused() {
    let mut raw = v1_document();
    raw["schema_version"] = json!(0);
    let (service, campaign) = imported(raw);

    let err = service.load(campaign).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Migration(MigrationError::UnmigratableVersion { from: 0, .. })
    ));
}
