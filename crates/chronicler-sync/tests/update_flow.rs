//! End-to-end tests of the update pipeline: parse, validate, merge,
//! combat reconciliation, entity tracking, persistence.

#![allow(clippy::unwrap_used, clippy::too_many_lines)]

use serde_json::json;

use chronicler_sync::{SyncError, SyncService, UpdateRequest};
use chronicler_types::{
    ActorRole, ActorState, CampaignId, CombatState, EntityId, EntityKind, GameDocument,
    HitPoints, ItemRef, Lifecycle,
};

fn id(raw: &str) -> EntityId {
    EntityId::new(raw).unwrap()
}

/// A campaign mid-session: player at 10/20 HP, an ally, a hostile goblin
/// in an active encounter, and one inventory item.
fn seeded_service() -> (SyncService, CampaignId) {
    chronicler_sync::logging::init(&chronicler_sync::config::LoggingConfig::default());

    let mut player = ActorState::named("Kaelan", ActorRole::Player);
    player.hp = HitPoints { current: 10, max: 20, temp: 0 };
    player.inventory.push(ItemRef {
        id: id("rusty_sword"),
        display_name: "Rusty Sword".to_owned(),
        quantity: 1,
    });
    let mut doc = GameDocument::new(id("pc_kaelan"), player);

    let mut lyra = ActorState::named("Lyra", ActorRole::Ally);
    lyra.hp = HitPoints { current: 11, max: 11, temp: 0 };
    doc.npcs.insert(id("npc_lyra"), lyra);

    let mut goblin = ActorState::named("Goblin", ActorRole::Enemy);
    goblin.hp = HitPoints { current: 5, max: 5, temp: 0 };
    doc.npcs.insert(id("npc_goblin_1"), goblin);

    doc.combat = CombatState {
        active: true,
        round: Some(1),
        turn_order: vec![id("npc_goblin_1"), id("pc_kaelan"), id("npc_lyra")],
        current_turn_index: Some(0),
    };

    doc.entities.introduce(id("npc_lyra"), "Lyra", EntityKind::Character, 0);
    doc.entities.introduce(id("npc_goblin_1"), "Goblin", EntityKind::Character, 0);

    let service = SyncService::in_memory();
    let campaign = CampaignId::new();
    service
        .import_campaign(campaign, &serde_json::to_value(&doc).unwrap())
        .unwrap();
    (service, campaign)
}

fn request(campaign: CampaignId, narrative: &str, patch: serde_json::Value) -> UpdateRequest {
    UpdateRequest {
        campaign_id: campaign,
        narrative_text: narrative.to_owned(),
        raw_patch: patch,
        accept_sanitized: false,
    }
}

#[test]
fn clean_update_applies_and_increments_the_turn() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "Kaelan presses the attack.",
            json!({"player": {"hp": {"current": 7}}}),
        ))
        .unwrap();

    assert!(result.accepted);
    assert!(result.validation_warnings.is_empty());
    assert_eq!(result.new_turn_number, 1);

    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.player.hp.current, 7);
    assert_eq!(doc.turn_number, 1);
}

#[test]
fn overhealing_is_rejected_and_nothing_persists() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "A warm light washes over Kaelan.",
            json!({"player": {"hp": {"current": 45}}}),
        ))
        .unwrap();

    assert!(!result.accepted);
    assert!(!result.validation_warnings.is_empty());
    assert!(result.applied_patch_summary.is_empty());
    assert_eq!(result.new_turn_number, 0);

    // The stored document is byte-for-byte the pre-update state.
    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.player.hp.current, 10);
    assert_eq!(doc.turn_number, 0);
}

#[test]
fn raising_max_in_the_same_patch_allows_a_higher_current() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "Kaelan feels tougher.",
            json!({"player": {"hp": {"current": 25, "max": 25}}}),
        ))
        .unwrap();
    assert!(result.accepted);
}

#[test]
fn killing_the_last_hostile_ends_combat() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "Kaelan's blade finds its mark.",
            json!({"npcs": {"npc_goblin_1": {"hp": {"current": 0}}}}),
        ))
        .unwrap();

    assert!(result.accepted);
    assert!(result.combat_ended);
    assert_eq!(result.removed_npcs, vec![id("npc_goblin_1")]);

    let doc = service.load(campaign).unwrap();
    assert!(!doc.combat.active);
    assert!(doc.combat.turn_order.is_empty());
    assert!(!doc.npcs.contains_key(&id("npc_goblin_1")));
    assert_eq!(
        doc.entities.get(&id("npc_goblin_1")).map(|r| r.lifecycle),
        Some(Lifecycle::Departed)
    );
    // The ally survives the encounter untouched.
    assert!(doc.npcs.contains_key(&id("npc_lyra")));
}

#[test]
fn deleting_one_npc_leaves_its_siblings() {
    let (service, campaign) = seeded_service();
    service
        .apply_update(&request(
            campaign,
            "Lyra slips away into the crowd.",
            json!({"npcs": {"npc_lyra": "__DELETE__"}, "combat": "__DELETE__"}),
        ))
        .unwrap();

    let doc = service.load(campaign).unwrap();
    assert!(!doc.npcs.contains_key(&id("npc_lyra")));
    assert!(doc.npcs.contains_key(&id("npc_goblin_1")));
}

#[test]
fn malformed_list_shape_is_an_error_not_a_rejection() {
    let (service, campaign) = seeded_service();
    let err = service
        .apply_update(&request(
            campaign,
            "Nothing much happens.",
            json!({"player": {"inventory": {"torch": {"display_name": "Torch"}}}}),
        ))
        .unwrap_err();
    assert!(matches!(err, SyncError::Shape(_)));

    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.turn_number, 0);
}

#[test]
fn sanitized_apply_keeps_the_valid_remainder() {
    let (service, campaign) = seeded_service();
    let mut req = request(
        campaign,
        "The fight spills into the old mill.",
        json!({
            "player": {"hp": {"current": 45}},
            "world": {"location": "Old Mill"}
        }),
    );
    req.accept_sanitized = true;

    let result = service.apply_update(&req).unwrap();
    assert!(result.accepted);
    assert!(!result.validation_warnings.is_empty());

    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.world.location, "Old Mill");
    // The flagged sub-operation was stripped, not applied.
    assert_eq!(doc.player.hp.current, 10);
}

#[test]
fn fully_invalid_patch_is_rejected_even_when_sanitized_apply_is_on() {
    let (service, campaign) = seeded_service();
    let mut req = request(
        campaign,
        "A strange surge of vitality.",
        json!({"player": {"hp": {"current": 45}}}),
    );
    req.accept_sanitized = true;

    let result = service.apply_update(&req).unwrap();
    assert!(!result.accepted);
    assert_eq!(service.load(campaign).unwrap().turn_number, 0);
}

#[test]
fn mentioned_entity_goes_active_and_unknown_names_are_reported() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "You glimpse Strahd behind Lyra. Strahd says nothing.",
            json!({"world": {"calendar": "midnight"}}),
        ))
        .unwrap();

    assert!(result.accepted);
    assert_eq!(
        result.unresolved_entities.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(),
        vec!["Strahd"]
    );

    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.entities.get(&id("npc_lyra")).map(|r| r.lifecycle), Some(Lifecycle::Active));
    assert_eq!(doc.entities.get(&id("npc_lyra")).map(|r| r.last_turn_seen), Some(1));
}

#[test]
fn patch_introduced_npc_gets_a_manifest_entry() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "A dire wolf lunges from the treeline.",
            json!({"npcs": {"npc_wolf_1": {
                "display_name": "Dire Wolf",
                "role": "enemy",
                "hp": {"current": 8, "max": 8}
            }}}),
        ))
        .unwrap();

    assert!(result.accepted);
    let doc = service.load(campaign).unwrap();
    let record = doc.entities.get(&id("npc_wolf_1")).unwrap();
    assert_eq!(record.display_name, "Dire Wolf");
    assert_eq!(record.lifecycle, Lifecycle::Introduced);
}

#[test]
fn appended_item_resolves_same_turn_mentions() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "You pocket the Moonstone Amulet.",
            json!({"player": {"inventory": {"append": [
                {"id": "moonstone_amulet", "display_name": "Moonstone Amulet"}
            ]}}}),
        ))
        .unwrap();

    assert!(result.accepted);
    assert!(result.unresolved_entities.is_empty());

    let doc = service.load(campaign).unwrap();
    let record = doc.entities.get(&id("moonstone_amulet")).unwrap();
    assert_eq!(record.kind, EntityKind::Item);
    assert_eq!(record.lifecycle, Lifecycle::Introduced);
}

#[test]
fn discovered_location_gets_a_manifest_entry() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "The party crests the ridge above Harrow Deep.",
            json!({"world": {"discovered_locations": {"append": "Harrow Deep"}}}),
        ))
        .unwrap();

    assert!(result.accepted);
    assert!(result.unresolved_entities.is_empty());

    let doc = service.load(campaign).unwrap();
    let record = doc.entities.get(&id("harrow_deep")).unwrap();
    assert_eq!(record.kind, EntityKind::Location);
    assert_eq!(record.display_name, "Harrow Deep");
}

#[test]
fn departed_entity_cannot_be_resurrected_by_patch() {
    let (service, campaign) = seeded_service();
    // Fell the goblin; combat end marks its manifest entry departed.
    service
        .apply_update(&request(
            campaign,
            "The goblin falls.",
            json!({"npcs": {"npc_goblin_1": {"hp": {"current": 0}}}}),
        ))
        .unwrap();

    let result = service
        .apply_update(&request(
            campaign,
            "Something stirs in the dark.",
            json!({"entities": {"npc_goblin_1": {"lifecycle": "active"}}}),
        ))
        .unwrap();

    assert!(!result.accepted);
    let doc = service.load(campaign).unwrap();
    assert_eq!(
        doc.entities.get(&id("npc_goblin_1")).map(|r| r.lifecycle),
        Some(Lifecycle::Departed)
    );
}

#[test]
fn deleting_the_player_is_rejected() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "Kaelan is no more.",
            json!({"player": "__DELETE__"}),
        ))
        .unwrap();

    assert!(!result.accepted);
    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.player.display_name, "Kaelan");
}

#[test]
fn rejected_update_does_not_move_entity_lifecycles() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "Lyra shouts a warning.",
            json!({"player": {"hp": {"current": 45}}}),
        ))
        .unwrap();

    assert!(!result.accepted);
    let doc = service.load(campaign).unwrap();
    // Still introduced, not active: the rejected turn never happened.
    assert_eq!(
        doc.entities.get(&id("npc_lyra")).map(|r| r.lifecycle),
        Some(Lifecycle::Introduced)
    );
}

#[test]
fn turn_order_referencing_an_unknown_npc_is_rejected() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_update(&request(
            campaign,
            "Shadows gather.",
            json!({"combat": {"turn_order": ["npc_goblin_1", "npc_phantom", "pc_kaelan"]}}),
        ))
        .unwrap();
    assert!(!result.accepted);
}

#[test]
fn unknown_campaign_is_an_error() {
    let service = SyncService::in_memory();
    let err = service
        .apply_update(&request(CampaignId::new(), "…", json!({})))
        .unwrap_err();
    assert!(matches!(err, SyncError::CampaignNotFound(_)));
}

#[test]
fn recovery_directive_applies_whole() {
    let (service, campaign) = seeded_service();
    let result = service
        .apply_recovery(
            campaign,
            "# unwedge the session\nworld.location = \"Harrow Deep\"\ncombat = __DELETE__\n",
        )
        .unwrap();

    assert!(result.accepted);
    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.world.location, "Harrow Deep");
    assert!(!doc.combat.active);
    assert!(doc.combat.turn_order.is_empty());
}

#[test]
fn recovery_directive_with_any_violation_is_rejected_whole() {
    let (service, campaign) = seeded_service();
    let err = service
        .apply_recovery(
            campaign,
            "world.location = \"Harrow Deep\"\nplayer.hp.current = 45\n",
        )
        .unwrap_err();
    assert!(matches!(err, SyncError::DirectiveRejected { .. }));

    // Including the valid line.
    let doc = service.load(campaign).unwrap();
    assert_ne!(doc.world.location, "Harrow Deep");
}

#[test]
fn snapshot_export_round_trips_through_import() {
    let (service, campaign) = seeded_service();
    let snapshot = service.export_snapshot(campaign).unwrap();
    assert_eq!(snapshot.turn_number, 0);

    let other = SyncService::in_memory();
    let restored = CampaignId::new();
    other.import_campaign(restored, &snapshot.document).unwrap();
    assert_eq!(other.load(restored).unwrap(), service.load(campaign).unwrap());

    // The id is taken now.
    assert!(matches!(
        other.import_campaign(restored, &snapshot.document),
        Err(SyncError::CampaignExists(_))
    ));
}

#[test]
fn create_campaign_starts_at_turn_zero() {
    let service = SyncService::in_memory();
    let campaign = service
        .create_campaign(id("pc_kaelan"), ActorState::named("Kaelan", ActorRole::Player))
        .unwrap();
    let doc = service.load(campaign).unwrap();
    assert_eq!(doc.turn_number, 0);
    assert_eq!(doc.player.display_name, "Kaelan");
    assert!(doc.npcs.is_empty());
}
