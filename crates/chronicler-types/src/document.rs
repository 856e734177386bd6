//! The authoritative campaign document and its constituent state types.
//!
//! A [`GameDocument`] is created once at campaign start and mutated in place
//! for the campaign's lifetime. Every update flows through the merge engine;
//! nothing else writes to it. The document round-trips through
//! [`serde_json::Value`] during merges, so every field here carries serde
//! defaults where a partial construction (a patch introducing a new NPC with
//! only a name and hit points) must still deserialize.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EntityId, QuestId};
use crate::manifest::EntityManifest;

/// The schema version written by this build of the engine.
///
/// Documents persisted under earlier versions are upgraded by the migration
/// manager before any patch is applied.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// The authoritative, persisted aggregate of campaign state.
///
/// One document exists per campaign id. `schema_version` and `turn_number`
/// are engine-owned: no patch may touch them, and `turn_number` increments
/// exactly once per applied update batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameDocument {
    /// Version of the schema this document was serialized under.
    pub schema_version: u32,

    /// Monotonic turn counter; never decreases.
    pub turn_number: u64,

    /// The player character's stable entity id (persists through 0 HP).
    pub player_id: EntityId,

    /// The player character's state.
    pub player: ActorState,

    /// Non-player characters, keyed by stable entity id.
    ///
    /// Keys are never reused after deletion within a session.
    #[serde(default)]
    pub npcs: BTreeMap<EntityId, ActorState>,

    /// World-level state (location, calendar, factions, free-form extras).
    #[serde(default)]
    pub world: WorldState,

    /// Quests, keyed by stable quest id.
    #[serde(default)]
    pub quests: BTreeMap<QuestId, QuestState>,

    /// Combat bookkeeping; inactive outside encounters.
    #[serde(default)]
    pub combat: CombatState,

    /// The narrative entity manifest.
    #[serde(default)]
    pub entities: EntityManifest,
}

impl GameDocument {
    /// Create a fresh turn-0 document at the current schema version.
    pub fn new(player_id: EntityId, player: ActorState) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            turn_number: 0,
            player_id,
            player,
            npcs: BTreeMap::new(),
            world: WorldState::default(),
            quests: BTreeMap::new(),
            combat: CombatState::default(),
            entities: EntityManifest::default(),
        }
    }

    /// Resolve a combatant id to its actor state (player or NPC).
    pub fn actor(&self, id: &EntityId) -> Option<&ActorState> {
        if *id == self.player_id {
            Some(&self.player)
        } else {
            self.npcs.get(id)
        }
    }

    /// Mutable variant of [`GameDocument::actor`].
    pub fn actor_mut(&mut self, id: &EntityId) -> Option<&mut ActorState> {
        if *id == self.player_id {
            Some(&mut self.player)
        } else {
            self.npcs.get_mut(id)
        }
    }
}

/// How an actor relates to the party; drives combat garbage collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// The player character.
    Player,
    /// Fights alongside the party.
    Ally,
    /// Bystander; never garbage-collected by the reconciler.
    #[default]
    Neutral,
    /// Hostile; removed from the document when dead at combat end.
    Enemy,
}

/// State of one actor (the player or an NPC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActorState {
    /// Display name used in narrative text.
    pub display_name: String,

    /// Relationship to the party.
    #[serde(default)]
    pub role: ActorRole,

    /// Hit points. Invariant: `current <= max + temp`.
    #[serde(default)]
    pub hp: HitPoints,

    /// The six ability scores, each at least 1.
    #[serde(default)]
    pub abilities: AbilityScores,

    /// Named expendable pools (spell slots, ki, charges).
    /// Invariant per pool: `used <= total`.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourcePool>,

    /// Active conditions, identified by name.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Ordered inventory. Duplicates allowed; stackable by item id.
    #[serde(default)]
    pub inventory: Vec<ItemRef>,

    /// Death-save progress; only present while the player is at 0 HP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_saves: Option<DeathSaves>,
}

impl ActorState {
    /// Create a named actor with default stats.
    pub fn named(display_name: &str, role: ActorRole) -> Self {
        Self {
            display_name: display_name.to_owned(),
            role,
            hp: HitPoints::default(),
            abilities: AbilityScores::default(),
            resources: BTreeMap::new(),
            conditions: Vec::new(),
            inventory: Vec::new(),
            death_saves: None,
        }
    }

    /// Whether this actor is at 0 hit points.
    pub const fn is_down(&self) -> bool {
        self.hp.current == 0
    }
}

/// Hit point block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HitPoints {
    /// Current hit points; 0 means down (or dead, for NPCs).
    #[serde(default)]
    pub current: u32,
    /// Maximum hit points.
    #[serde(default = "default_hp_max")]
    pub max: u32,
    /// Temporary hit points layered on top of `max`.
    #[serde(default)]
    pub temp: u32,
}

const fn default_hp_max() -> u32 {
    10
}

impl Default for HitPoints {
    fn default() -> Self {
        Self { current: default_hp_max(), max: default_hp_max(), temp: 0 }
    }
}

impl HitPoints {
    /// The ceiling `current` may not exceed (`max + temp`, saturating).
    pub const fn ceiling(&self) -> u32 {
        self.max.saturating_add(self.temp)
    }
}

/// The six ability scores. Each score is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbilityScores {
    /// Strength.
    #[serde(default = "default_ability")]
    pub strength: u8,
    /// Dexterity.
    #[serde(default = "default_ability")]
    pub dexterity: u8,
    /// Constitution.
    #[serde(default = "default_ability")]
    pub constitution: u8,
    /// Intelligence.
    #[serde(default = "default_ability")]
    pub intelligence: u8,
    /// Wisdom.
    #[serde(default = "default_ability")]
    pub wisdom: u8,
    /// Charisma.
    #[serde(default = "default_ability")]
    pub charisma: u8,
}

const fn default_ability() -> u8 {
    10
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            strength: default_ability(),
            dexterity: default_ability(),
            constitution: default_ability(),
            intelligence: default_ability(),
            wisdom: default_ability(),
            charisma: default_ability(),
        }
    }
}

/// A named expendable counter (`used` out of `total`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePool {
    /// Units expended so far.
    #[serde(default)]
    pub used: u32,
    /// Units available per rest/refresh.
    #[serde(default)]
    pub total: u32,
}

/// An active condition on an actor, identified by name within the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    /// Condition name (`poisoned`, `stunned`, ...). List identity key.
    pub name: String,
    /// Rounds remaining, if the condition is timed. Decremented by the
    /// combat reconciler on round advance; the condition is dropped at 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_rounds: Option<u32>,
}

/// A reference to an item held in an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemRef {
    /// Stable item entity id. List identity key; appends with a matching
    /// id merge into the existing entry instead of duplicating it.
    pub id: EntityId,
    /// Display name used in narrative text.
    #[serde(default)]
    pub display_name: String,
    /// Stack size.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Death-save progress for a player at 0 HP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeathSaves {
    /// Successful saves (3 stabilizes).
    #[serde(default)]
    pub successes: u8,
    /// Failed saves (3 kills).
    #[serde(default)]
    pub failures: u8,
}

/// World-level state: location, calendar, discoveries, faction standings,
/// plus free-form extras that remain schema-checked by path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// The party's current location name.
    #[serde(default)]
    pub location: String,

    /// In-world calendar time, free text (`"3rd of Mirtul, evening"`).
    #[serde(default)]
    pub calendar: String,

    /// Locations the party has discovered.
    #[serde(default)]
    pub discovered_locations: BTreeSet<String>,

    /// Faction standings, -100 (hostile) to 100 (revered).
    #[serde(default)]
    pub faction_standings: BTreeMap<String, i32>,

    /// Free-form keys tolerated by the schema's `world.*` wildcard.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Lifecycle status of a quest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    /// In progress.
    #[default]
    Active,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
    /// Dropped by the party.
    Abandoned,
}

/// One objective inside a quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Objective {
    /// What must be done. List identity key.
    pub name: String,
    /// Whether the objective is complete.
    #[serde(default)]
    pub complete: bool,
}

/// State of one quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestState {
    /// Quest title.
    pub name: String,
    /// Current status.
    #[serde(default)]
    pub status: QuestStatus,
    /// Ordered objectives.
    #[serde(default)]
    pub objectives: Vec<Objective>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Combat bookkeeping.
///
/// Invariants (enforced by the combat reconciler after every merge):
/// when `active` is false, `turn_order` is empty and `round` /
/// `current_turn_index` are `None`; when active, every entry in
/// `turn_order` resolves to a living actor or to the player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombatState {
    /// Whether an encounter is in progress.
    #[serde(default)]
    pub active: bool,

    /// Round counter, starting at 1. `None` outside combat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,

    /// Initiative order of combatant ids.
    #[serde(default)]
    pub turn_order: Vec<EntityId>,

    /// Index into `turn_order` of the combatant whose turn it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn_index: Option<usize>,
}

impl CombatState {
    /// Reset to the inactive state, clearing all encounter bookkeeping.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.round = None;
        self.turn_order.clear();
        self.current_turn_index = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn player_id() -> EntityId {
        EntityId::new("pc_kaelan").unwrap()
    }

    #[test]
    fn new_document_starts_at_turn_zero() {
        let doc = GameDocument::new(player_id(), ActorState::named("Kaelan", ActorRole::Player));
        assert_eq!(doc.turn_number, 0);
        assert_eq!(doc.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(!doc.combat.active);
    }

    #[test]
    fn actor_resolves_player_and_npcs() {
        let mut doc =
            GameDocument::new(player_id(), ActorState::named("Kaelan", ActorRole::Player));
        let goblin = EntityId::new("npc_goblin_1").unwrap();
        doc.npcs.insert(goblin.clone(), ActorState::named("Goblin", ActorRole::Enemy));

        assert_eq!(doc.actor(&player_id()).map(|a| a.display_name.as_str()), Some("Kaelan"));
        assert_eq!(doc.actor(&goblin).map(|a| a.display_name.as_str()), Some("Goblin"));
    }

    #[test]
    fn hp_ceiling_saturates() {
        let hp = HitPoints { current: 0, max: u32::MAX, temp: 5 };
        assert_eq!(hp.ceiling(), u32::MAX);
    }

    #[test]
    fn partial_actor_json_deserializes_with_defaults() {
        let raw = serde_json::json!({
            "display_name": "Lyra",
            "hp": { "current": 7 }
        });
        let actor: ActorState = serde_json::from_value(raw).unwrap();
        assert_eq!(actor.hp.current, 7);
        assert_eq!(actor.hp.max, 10);
        assert_eq!(actor.role, ActorRole::Neutral);
        assert_eq!(actor.abilities.strength, 10);
    }

    #[test]
    fn combat_deactivate_clears_bookkeeping() {
        let mut combat = CombatState {
            active: true,
            round: Some(3),
            turn_order: vec![EntityId::new("npc_goblin_1").unwrap()],
            current_turn_index: Some(0),
        };
        combat.deactivate();
        assert_eq!(combat, CombatState::default());
    }
}
