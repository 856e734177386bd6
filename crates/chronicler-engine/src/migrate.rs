//! Ordered schema-version migration chain.
//!
//! Documents are migrated at load time, before any patch parsing runs.
//! Each step is a pure transform on the serialized document from one
//! version to the next; the manager walks the chain until the document
//! reaches [`CURRENT_SCHEMA_VERSION`], then re-types it. Migration is
//! all-or-nothing: a failing step returns an error and no partial
//! document is ever produced.
//!
//! Documents with no `schema_version` field predate versioning and are
//! treated as version 1. A `schema_version` that is present but not an
//! unsigned integer is an unreadable document, not a legacy one.

use serde_json::{Map, Value};
use tracing::info;

use chronicler_types::{GameDocument, CURRENT_SCHEMA_VERSION};

use crate::error::MigrationError;

/// One migration step from `from` to `from + 1`.
struct Step {
    from: u32,
    to: u32,
    run: fn(Value) -> Result<Value, String>,
}

/// What a migration pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    /// The fully migrated, re-typed document.
    pub document: GameDocument,
    /// The `(from, to)` steps that ran, in order.
    pub steps: Vec<(u32, u32)>,
    /// Whether any step ran. When `true` the caller should persist the
    /// migrated form before applying anything else.
    pub migrated: bool,
}

/// The registered migration chain.
pub struct MigrationManager {
    steps: Vec<Step>,
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    /// Build the manager with the builtin chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: vec![
                Step { from: 1, to: 2, run: v1_to_v2 },
                Step { from: 2, to: 3, run: v2_to_v3 },
            ],
        }
    }

    /// Migrate a raw stored document up to the current schema version.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] when the version is unreadable, newer
    /// than this engine, has no registered path to current, or a step
    /// produces a document that no longer deserializes.
    pub fn migrate(&self, raw: Value) -> Result<MigrationOutcome, MigrationError> {
        let mut version = read_version(&raw)?;
        if version > CURRENT_SCHEMA_VERSION {
            return Err(MigrationError::FutureVersion {
                found: version,
                current: CURRENT_SCHEMA_VERSION,
            });
        }

        let mut value = raw;
        let mut steps = Vec::new();
        while version < CURRENT_SCHEMA_VERSION {
            let step = self
                .steps
                .iter()
                .find(|s| s.from == version)
                .ok_or(MigrationError::UnmigratableVersion {
                    from: version,
                    current: CURRENT_SCHEMA_VERSION,
                })?;

            value = (step.run)(value).map_err(|reason| MigrationError::StepFailed {
                from: step.from,
                to: step.to,
                reason,
            })?;
            if let Value::Object(root) = &mut value {
                root.insert("schema_version".to_owned(), Value::from(step.to));
            }
            info!(from = step.from, to = step.to, "migrated document schema");
            steps.push((step.from, step.to));
            version = step.to;
        }

        let document: GameDocument = serde_json::from_value(value)?;
        let migrated = !steps.is_empty();
        Ok(MigrationOutcome { document, steps, migrated })
    }
}

/// Read the stored schema version; absent means a pre-versioning v1
/// document.
fn read_version(raw: &Value) -> Result<u32, MigrationError> {
    let Value::Object(root) = raw else {
        return Err(MigrationError::MissingVersion);
    };
    match root.get("schema_version") {
        None => Ok(1),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(MigrationError::MissingVersion),
    }
}

/// v1 -> v2: actor hit points grow from a bare integer to the
/// `{current, max, temp}` object, and the quest list becomes a map keyed
/// by slugified quest name.
fn v1_to_v2(mut value: Value) -> Result<Value, String> {
    let Value::Object(root) = &mut value else {
        return Err("document root is not an object".to_owned());
    };

    if let Some(player) = root.get_mut("player") {
        upgrade_hp(player);
    }
    if let Some(Value::Object(npcs)) = root.get_mut("npcs") {
        for npc in npcs.values_mut() {
            upgrade_hp(npc);
        }
    }

    if let Some(Value::Array(quests)) = root.get("quests").cloned().as_ref() {
        let mut keyed = Map::new();
        for quest in quests {
            let name = quest
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| "quest entry has no name to key by".to_owned())?;
            let key = chronicler_types::QuestId::from_display_name(name)
                .ok_or_else(|| format!("quest name {name:?} yields no usable id"))?;
            keyed.insert(key.as_str().to_owned(), quest.clone());
        }
        root.insert("quests".to_owned(), Value::Object(keyed));
    }

    Ok(value)
}

fn upgrade_hp(actor: &mut Value) {
    let Value::Object(fields) = actor else { return };
    if let Some(bare) = fields.get("hp").and_then(Value::as_i64) {
        let mut hp = Map::new();
        hp.insert("current".to_owned(), Value::from(bare));
        hp.insert("max".to_owned(), Value::from(bare));
        hp.insert("temp".to_owned(), Value::from(0));
        fields.insert("hp".to_owned(), Value::Object(hp));
    }
}

/// v2 -> v3: synthesize the entity manifest from the known actors and
/// give the world its faction-standing and discovered-location fields.
fn v2_to_v3(mut value: Value) -> Result<Value, String> {
    let Value::Object(root) = &mut value else {
        return Err("document root is not an object".to_owned());
    };

    let turn = root.get("turn_number").and_then(Value::as_u64).unwrap_or(0);

    let mut entities = root
        .get("entities")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(player_id) = root.get("player_id").and_then(Value::as_str) {
        let display_name = root
            .get("player")
            .and_then(|p| p.get("display_name"))
            .and_then(Value::as_str)
            .unwrap_or(player_id);
        entities
            .entry(player_id.to_owned())
            .or_insert_with(|| manifest_entry(display_name, turn));
    }
    if let Some(Value::Object(npcs)) = root.get("npcs") {
        for (id, npc) in npcs {
            let display_name = npc
                .get("display_name")
                .and_then(Value::as_str)
                .unwrap_or(id.as_str());
            entities
                .entry(id.clone())
                .or_insert_with(|| manifest_entry(display_name, turn));
        }
    }
    root.insert("entities".to_owned(), Value::Object(entities));

    let world = root
        .entry("world")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(world) = world {
        world
            .entry("faction_standings")
            .or_insert_with(|| Value::Object(Map::new()));
        world
            .entry("discovered_locations")
            .or_insert_with(|| Value::Array(Vec::new()));
    }

    Ok(value)
}

fn manifest_entry(display_name: &str, turn: u64) -> Value {
    let mut entry = Map::new();
    entry.insert("display_name".to_owned(), Value::from(display_name));
    entry.insert("kind".to_owned(), Value::from("character"));
    entry.insert("lifecycle".to_owned(), Value::from("active"));
    entry.insert("last_turn_seen".to_owned(), Value::from(turn));
    Value::Object(entry)
}
