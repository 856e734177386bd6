//! Versioned declarative field schema.
//!
//! A schema is a flat table mapping dotted field-path patterns to the
//! type, numeric range, and enum membership permitted there. Patterns may
//! use `*` to match any single segment (map keys: `npcs.*.hp.current`).
//! The catalog holds one table per schema version and is loaded once at
//! startup, either from YAML or from the built-in current-version table.
//!
//! The parser consults the schema only to learn which paths are
//! list-typed; the validator uses the full table.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chronicler_types::{FieldPath, CURRENT_SCHEMA_VERSION};

/// The permitted shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// JSON boolean.
    Boolean,
    /// JSON integer (no fractional part).
    Integer,
    /// Any JSON number.
    Number,
    /// JSON string.
    String,
    /// JSON array; element kind given by [`FieldSpec::item`].
    List,
    /// JSON object whose children are schema-checked individually.
    Object,
    /// Anything; used for declared free-form regions (`world.*`).
    Any,
}

impl FieldKind {
    /// Human-readable name for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::List => "list",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    /// Whether a JSON value conforms to this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Boolean => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::List => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

/// Constraints on one field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// Permitted shape.
    #[serde(rename = "type")]
    pub kind: FieldKind,

    /// Element kind for lists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<FieldKind>,

    /// Inclusive lower bound for numeric fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,

    /// Inclusive upper bound for numeric fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,

    /// Permitted values for string enums.
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<BTreeSet<String>>,

    /// Whether the field must always exist; required fields cannot be
    /// deleted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

impl FieldSpec {
    /// A bare spec of the given kind with no further constraints.
    pub const fn of(kind: FieldKind) -> Self {
        Self { kind, item: None, min: None, max: None, allowed: None, required: false }
    }

    /// Attach an inclusive numeric range.
    #[must_use]
    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Attach an inclusive lower bound only.
    #[must_use]
    pub const fn at_least(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    /// Attach a list element kind.
    #[must_use]
    pub const fn items(mut self, item: FieldKind) -> Self {
        self.item = Some(item);
        self
    }

    /// Attach enum membership.
    #[must_use]
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| (*v).to_owned()).collect());
        self
    }

    /// Mark the field as required (never deletable).
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// One version's field table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    /// The document schema version this table describes.
    pub version: u32,

    /// Field-path patterns to constraints.
    pub fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    /// Find the most specific spec matching a concrete path.
    ///
    /// An exact pattern beats a wildcard one; among wildcard patterns the
    /// one with the most literal segments wins.
    pub fn spec_for(&self, path: &FieldPath) -> Option<&FieldSpec> {
        let mut best: Option<(usize, &FieldSpec)> = None;
        for (pattern, spec) in &self.fields {
            if let Some(score) = pattern_score(pattern, path)
                && best.is_none_or(|(b, _)| score > b)
            {
                best = Some((score, spec));
            }
        }
        best.map(|(_, spec)| spec)
    }

    /// Whether the path is declared list-typed.
    pub fn is_list_path(&self, path: &FieldPath) -> bool {
        self.spec_for(path).is_some_and(|spec| spec.kind == FieldKind::List)
    }
}

/// Match a dotted pattern against a concrete path.
///
/// Returns a specificity score (literal segments matched, with a large
/// bonus for fully-literal patterns) or `None` on mismatch.
fn pattern_score(pattern: &str, path: &FieldPath) -> Option<usize> {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let segments = path.segments();
    if pattern_segments.len() != segments.len() {
        return None;
    }
    let mut literals = 0usize;
    for (p, s) in pattern_segments.iter().zip(segments.iter()) {
        if *p == "*" {
            continue;
        }
        if *p != s.as_str() {
            return None;
        }
        literals = literals.saturating_add(1);
    }
    if literals == pattern_segments.len() {
        // Exact pattern: always preferred over any wildcard match.
        Some(literals.saturating_add(1000))
    } else {
        Some(literals)
    }
}

/// Errors raised while loading a schema catalog.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The YAML text failed to parse.
    #[error("failed to parse schema YAML: {0}")]
    Yaml(#[from] serde_yml::Error),

    /// The catalog contained no schemas.
    #[error("schema catalog is empty")]
    EmptyCatalog,

    /// Two schemas declared the same version.
    #[error("schema catalog declares version {version} more than once")]
    DuplicateVersion {
        /// The repeated version.
        version: u32,
    },

    /// The requested version has no table.
    #[error("no schema table for version {version}")]
    UnknownVersion {
        /// The missing version.
        version: u32,
    },
}

/// YAML wire shape of a schema catalog file.
#[derive(Debug, Deserialize)]
struct RawCatalog {
    schemas: Vec<Schema>,
}

/// The per-version schema tables, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    schemas: BTreeMap<u32, Schema>,
}

impl SchemaCatalog {
    /// Load a catalog from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] on parse failure, an empty catalog, or
    /// duplicate version declarations.
    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        let raw: RawCatalog = serde_yml::from_str(text)?;
        if raw.schemas.is_empty() {
            return Err(SchemaError::EmptyCatalog);
        }
        let mut schemas = BTreeMap::new();
        for schema in raw.schemas {
            let version = schema.version;
            if schemas.insert(version, schema).is_some() {
                return Err(SchemaError::DuplicateVersion { version });
            }
        }
        Ok(Self { schemas })
    }

    /// The table for the engine's current document version.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownVersion`] if the catalog was loaded
    /// without a current-version table.
    pub fn current(&self) -> Result<&Schema, SchemaError> {
        self.for_version(CURRENT_SCHEMA_VERSION)
    }

    /// The table for a specific version.
    pub fn for_version(&self, version: u32) -> Result<&Schema, SchemaError> {
        self.schemas
            .get(&version)
            .ok_or(SchemaError::UnknownVersion { version })
    }

    /// The built-in catalog carrying the current-version table.
    pub fn builtin() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(CURRENT_SCHEMA_VERSION, builtin_current());
        Self { schemas }
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Insert the per-actor field constraints under a path prefix.
fn insert_actor_fields(fields: &mut BTreeMap<String, FieldSpec>, prefix: &str, roles: &[&str]) {
    use FieldKind::{Integer, List, Object, String as Str};

    let mut put = |suffix: &str, spec: FieldSpec| {
        fields.insert(format!("{prefix}.{suffix}"), spec);
    };

    put("display_name", FieldSpec::of(Str).required());
    put("role", FieldSpec::of(Str).one_of(roles));

    put("hp", FieldSpec::of(Object));
    put("hp.current", FieldSpec::of(Integer).at_least(0));
    put("hp.max", FieldSpec::of(Integer).at_least(1));
    put("hp.temp", FieldSpec::of(Integer).at_least(0));

    put("abilities", FieldSpec::of(Object));
    for ability in ["strength", "dexterity", "constitution", "intelligence", "wisdom", "charisma"]
    {
        put(&format!("abilities.{ability}"), FieldSpec::of(Integer).range(1, 30));
    }

    put("resources", FieldSpec::of(Object));
    put("resources.*", FieldSpec::of(Object));
    put("resources.*.used", FieldSpec::of(Integer).at_least(0));
    put("resources.*.total", FieldSpec::of(Integer).at_least(0));

    put("conditions", FieldSpec::of(List).items(Object));
    put("inventory", FieldSpec::of(List).items(Object));

    put("death_saves", FieldSpec::of(Object));
    put("death_saves.successes", FieldSpec::of(Integer).range(0, 3));
    put("death_saves.failures", FieldSpec::of(Integer).range(0, 3));
}

/// The current-version field table.
fn builtin_current() -> Schema {
    use FieldKind::{Any, Boolean, Integer, List, Object, String as Str};

    let mut fields = BTreeMap::new();

    fields.insert("player".to_owned(), FieldSpec::of(Object).required());
    insert_actor_fields(&mut fields, "player", &["player"]);

    fields.insert("npcs".to_owned(), FieldSpec::of(Object));
    fields.insert("npcs.*".to_owned(), FieldSpec::of(Object));
    insert_actor_fields(&mut fields, "npcs.*", &["ally", "neutral", "enemy"]);

    fields.insert("world".to_owned(), FieldSpec::of(Object));
    fields.insert("world.location".to_owned(), FieldSpec::of(Str));
    fields.insert("world.calendar".to_owned(), FieldSpec::of(Str));
    fields.insert(
        "world.discovered_locations".to_owned(),
        FieldSpec::of(List).items(Str),
    );
    fields.insert("world.faction_standings".to_owned(), FieldSpec::of(Object));
    fields.insert(
        "world.faction_standings.*".to_owned(),
        FieldSpec::of(Integer).range(-100, 100),
    );
    // Free-form extras: schema-checked by presence, not by shape.
    fields.insert("world.*".to_owned(), FieldSpec::of(Any));

    fields.insert("quests".to_owned(), FieldSpec::of(Object));
    fields.insert("quests.*".to_owned(), FieldSpec::of(Object));
    fields.insert("quests.*.name".to_owned(), FieldSpec::of(Str));
    fields.insert(
        "quests.*.status".to_owned(),
        FieldSpec::of(Str).one_of(&["active", "completed", "failed", "abandoned"]),
    );
    fields.insert("quests.*.objectives".to_owned(), FieldSpec::of(List).items(Object));
    fields.insert("quests.*.notes".to_owned(), FieldSpec::of(Str));

    fields.insert("combat".to_owned(), FieldSpec::of(Object));
    fields.insert("combat.active".to_owned(), FieldSpec::of(Boolean));
    fields.insert("combat.round".to_owned(), FieldSpec::of(Integer).at_least(1));
    fields.insert("combat.turn_order".to_owned(), FieldSpec::of(List).items(Str));
    fields.insert(
        "combat.current_turn_index".to_owned(),
        FieldSpec::of(Integer).at_least(0),
    );

    // schema_version, turn_number, and the entity manifest are
    // engine-owned and deliberately undeclared: any patch touching them
    // fails structural validation. Manifest lifecycles move only through
    // the transition table, and an id never changes kind.

    Schema { version: CURRENT_SCHEMA_VERSION, fields }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_beats_wildcard() {
        let schema = SchemaCatalog::builtin();
        let schema = schema.current().unwrap();
        // world.location is declared string even though world.* is any.
        let spec = schema.spec_for(&FieldPath::from("world.location")).unwrap();
        assert_eq!(spec.kind, FieldKind::String);
        // Undeclared world child falls back to the free-form wildcard.
        let spec = schema.spec_for(&FieldPath::from("world.weather")).unwrap();
        assert_eq!(spec.kind, FieldKind::Any);
    }

    #[test]
    fn wildcard_matches_map_keys() {
        let catalog = SchemaCatalog::builtin();
        let schema = catalog.current().unwrap();
        let spec = schema.spec_for(&FieldPath::from("npcs.npc_goblin_1.hp.current")).unwrap();
        assert_eq!(spec.kind, FieldKind::Integer);
        assert_eq!(spec.min, Some(0));
    }

    #[test]
    fn engine_owned_fields_are_undeclared() {
        let catalog = SchemaCatalog::builtin();
        let schema = catalog.current().unwrap();
        assert!(schema.spec_for(&FieldPath::from("schema_version")).is_none());
        assert!(schema.spec_for(&FieldPath::from("turn_number")).is_none());
        // The entity manifest moves only through the lifecycle table.
        assert!(schema.spec_for(&FieldPath::from("entities")).is_none());
        assert!(schema.spec_for(&FieldPath::from("entities.npc_lyra.lifecycle")).is_none());
        assert!(schema.spec_for(&FieldPath::from("entities.npc_lyra.kind")).is_none());
    }

    #[test]
    fn required_fields_are_marked() {
        let catalog = SchemaCatalog::builtin();
        let schema = catalog.current().unwrap();
        assert!(schema.spec_for(&FieldPath::from("player")).unwrap().required);
        assert!(schema.spec_for(&FieldPath::from("player.display_name")).unwrap().required);
        assert!(schema.spec_for(&FieldPath::from("npcs.npc_lyra.display_name")).unwrap().required);
        // Whole NPCs and the combat block stay deletable.
        assert!(!schema.spec_for(&FieldPath::from("npcs.npc_lyra")).unwrap().required);
        assert!(!schema.spec_for(&FieldPath::from("combat")).unwrap().required);
    }

    #[test]
    fn list_paths_are_recognized() {
        let catalog = SchemaCatalog::builtin();
        let schema = catalog.current().unwrap();
        assert!(schema.is_list_path(&FieldPath::from("player.inventory")));
        assert!(schema.is_list_path(&FieldPath::from("combat.turn_order")));
        assert!(!schema.is_list_path(&FieldPath::from("combat.active")));
    }

    #[test]
    fn yaml_catalog_round_trip() {
        let text = r"
schemas:
  - version: 3
    fields:
      player.hp.current: { type: integer, min: 0 }
      quests.*.status: { type: string, enum: [active, completed] }
      player.inventory: { type: list, item: object }
";
        let catalog = SchemaCatalog::from_yaml_str(text).unwrap();
        let schema = catalog.current().unwrap();
        assert_eq!(
            schema.spec_for(&FieldPath::from("player.hp.current")).map(|s| s.kind),
            Some(FieldKind::Integer)
        );
        let status = schema.spec_for(&FieldPath::from("quests.q1.status")).unwrap();
        assert!(status.allowed.as_ref().unwrap().contains("active"));
    }

    #[test]
    fn duplicate_versions_rejected() {
        let text = r"
schemas:
  - version: 3
    fields: {}
  - version: 3
    fields: {}
";
        assert!(matches!(
            SchemaCatalog::from_yaml_str(text),
            Err(SchemaError::DuplicateVersion { version: 3 })
        ));
    }

    #[test]
    fn empty_catalog_rejected() {
        assert!(matches!(
            SchemaCatalog::from_yaml_str("schemas: []"),
            Err(SchemaError::EmptyCatalog)
        ));
    }
}
