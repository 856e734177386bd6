//! Staged schema validation of a parsed patch.
//!
//! The pipeline runs three stages in order:
//! 1. Structural -- every touched path is declared, with the right type,
//!    numeric range, and enum membership.
//! 2. Relational -- cross-field invariants hold after a hypothetical
//!    apply (hp ceiling, resource pools, combat activation).
//! 3. Referential -- turn-order entries resolve to known combatants.
//!
//! Every violation is reported, not just the first, and the report pairs
//! the violations with a sanitized patch (offending sub-operations
//! dropped, the rest kept). Callers choose whether to apply the sanitized
//! patch or reject the whole update; nothing unchecked is ever applied.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use chronicler_types::{EntityId, FieldPath, GameDocument, HitPoints, Patch, PatchOp};

use crate::parse::json_type_name;
use crate::schema::{FieldKind, Schema};

/// Why one sub-operation was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum ViolationKind {
    /// The path is not declared in the active schema version.
    #[error("field is not declared in the schema")]
    UnknownField,

    /// The path is declared required and cannot be deleted.
    #[error("field is required and cannot be deleted")]
    RequiredField,

    /// The value's JSON type does not match the declared kind.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Declared kind name.
        expected: &'static str,
        /// JSON type name of the offered value.
        found: &'static str,
    },

    /// A numeric value fell outside the declared inclusive range.
    #[error("value {actual} outside permitted range [{min:?}, {max:?}]")]
    OutOfRange {
        /// Declared lower bound.
        min: Option<i64>,
        /// Declared upper bound.
        max: Option<i64>,
        /// The offered value.
        actual: i64,
    },

    /// A string value is not a member of the declared enum.
    #[error("value {actual:?} is not a permitted choice")]
    NotInEnum {
        /// The offered value.
        actual: String,
    },

    /// A list element has the wrong type.
    #[error("list element {index} expected {expected}, found {found}")]
    BadListElement {
        /// Zero-based element index.
        index: usize,
        /// Declared element kind name.
        expected: &'static str,
        /// JSON type name of the element.
        found: &'static str,
    },

    /// `hp.current` would exceed `hp.max + hp.temp` after the apply.
    #[error("hp.current {current} would exceed hp.max + hp.temp = {ceiling}")]
    HpExceedsCeiling {
        /// Hypothetical post-apply current.
        current: i64,
        /// Hypothetical post-apply ceiling.
        ceiling: i64,
    },

    /// A resource pool's `used` would exceed its `total` after the apply.
    #[error("resource pool used {used} would exceed total {total}")]
    PoolOverdrawn {
        /// Hypothetical post-apply used.
        used: i64,
        /// Hypothetical post-apply total.
        total: i64,
    },

    /// A turn-order entry names no known combatant.
    #[error("turn order entry {id:?} is neither an NPC nor the player")]
    UnknownCombatant {
        /// The unresolvable entry, verbatim.
        id: String,
    },

    /// Combat would be active with an empty turn order.
    #[error("combat cannot be active with an empty turn order")]
    ActiveWithoutTurnOrder,
}

/// One schema violation, tied to the patch path that caused it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// The offending path.
    pub path: FieldPath,
    /// Why it was rejected.
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// The outcome of validating one patch.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// Every violation found, in discovery order.
    pub violations: Vec<Violation>,
    /// The patch with offending sub-operations stripped.
    pub sanitized: Patch,
}

impl ValidationReport {
    /// Whether the patch passed with no violations.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Validate a patch against the schema and the current document.
///
/// # Errors
///
/// Returns the underlying `serde_json` error only if the document itself
/// cannot be serialized, which indicates a bug rather than bad input.
pub fn validate(
    schema: &Schema,
    doc: &GameDocument,
    patch: &Patch,
) -> Result<ValidationReport, serde_json::Error> {
    let doc_value = serde_json::to_value(doc)?;
    let mut violations = Vec::new();
    let mut offenders: BTreeSet<FieldPath> = BTreeSet::new();

    // Stage 1: structural.
    for (name, op) in patch.ops() {
        check_structural(
            schema,
            &FieldPath::root().child(name),
            op,
            &mut violations,
            &mut offenders,
        );
    }

    // Stage 2: relational.
    check_hp_invariants(patch, &doc_value, &mut violations, &mut offenders);
    check_pool_invariants(patch, &doc_value, &mut violations, &mut offenders);
    check_combat_activation(patch, &doc_value, &mut violations, &mut offenders);

    // Stage 3: referential.
    check_turn_order_references(doc, patch, &mut violations, &mut offenders);

    let sanitized = patch.without(&offenders);
    Ok(ValidationReport { violations, sanitized })
}

/// Structural stage: declaredness, type, range, enum.
fn check_structural(
    schema: &Schema,
    path: &FieldPath,
    op: &PatchOp,
    violations: &mut Vec<Violation>,
    offenders: &mut BTreeSet<FieldPath>,
) {
    let spec = schema.spec_for(path);
    match op {
        PatchOp::Delete => match spec {
            Some(spec) if spec.required => {
                reject(path, ViolationKind::RequiredField, violations, offenders);
            }
            Some(_) => {}
            None => {
                // Deleting a list element is addressed one level below the
                // declared list path.
                let parent_is_list = path
                    .segments()
                    .split_last()
                    .is_some_and(|(_, parents)| {
                        let parent = FieldPath::from(parents.join(".").as_str());
                        schema.is_list_path(&parent)
                    });
                if !parent_is_list {
                    reject(path, ViolationKind::UnknownField, violations, offenders);
                }
            }
        },

        PatchOp::SetScalar(value) => {
            let Some(spec) = spec else {
                reject(path, ViolationKind::UnknownField, violations, offenders);
                return;
            };
            match spec.kind {
                FieldKind::Any => {}
                FieldKind::Object | FieldKind::List => reject(
                    path,
                    ViolationKind::TypeMismatch {
                        expected: spec.kind.name(),
                        found: json_type_name(value),
                    },
                    violations,
                    offenders,
                ),
                kind if !kind.accepts(value) => reject(
                    path,
                    ViolationKind::TypeMismatch {
                        expected: kind.name(),
                        found: json_type_name(value),
                    },
                    violations,
                    offenders,
                ),
                _ => {
                    if let Some(actual) = value.as_i64()
                        && (spec.min.is_some_and(|min| actual < min)
                            || spec.max.is_some_and(|max| actual > max))
                    {
                        reject(
                            path,
                            ViolationKind::OutOfRange { min: spec.min, max: spec.max, actual },
                            violations,
                            offenders,
                        );
                    }
                    if let (Some(allowed), Some(s)) = (&spec.allowed, value.as_str())
                        && !allowed.contains(s)
                    {
                        reject(
                            path,
                            ViolationKind::NotInEnum { actual: s.to_owned() },
                            violations,
                            offenders,
                        );
                    }
                }
            }
        }

        PatchOp::AppendList(values) | PatchOp::ReplaceList(values) => {
            let Some(spec) = spec else {
                reject(path, ViolationKind::UnknownField, violations, offenders);
                return;
            };
            match spec.kind {
                FieldKind::Any => {}
                FieldKind::List => {
                    if let Some(item) = spec.item {
                        for (index, element) in values.iter().enumerate() {
                            if !item.accepts(element) {
                                reject(
                                    path,
                                    ViolationKind::BadListElement {
                                        index,
                                        expected: item.name(),
                                        found: json_type_name(element),
                                    },
                                    violations,
                                    offenders,
                                );
                            }
                        }
                    }
                }
                other => reject(
                    path,
                    ViolationKind::TypeMismatch { expected: other.name(), found: "array" },
                    violations,
                    offenders,
                ),
            }
        }

        PatchOp::MergeObject(children) => {
            match spec.map(|s| s.kind) {
                // Free-form region: accept the subtree wholesale.
                Some(FieldKind::Any) => {}
                // Per-id deletion map beneath a declared list; the parser
                // guarantees all children are deletions.
                Some(FieldKind::List) => {}
                Some(FieldKind::Object) => {
                    for (name, child) in children {
                        check_structural(schema, &path.child(name), child, violations, offenders);
                    }
                }
                Some(other) => reject(
                    path,
                    ViolationKind::TypeMismatch { expected: other.name(), found: "object" },
                    violations,
                    offenders,
                ),
                None => reject(path, ViolationKind::UnknownField, violations, offenders),
            }
        }
    }
}

fn reject(
    path: &FieldPath,
    kind: ViolationKind,
    violations: &mut Vec<Violation>,
    offenders: &mut BTreeSet<FieldPath>,
) {
    violations.push(Violation { path: path.clone(), kind });
    offenders.insert(path.clone());
}

/// Collect every leaf path of a patch (merge nodes are not leaves).
fn leaf_paths(patch: &Patch) -> Vec<(FieldPath, &PatchOp)> {
    fn walk<'p>(path: &FieldPath, op: &'p PatchOp, out: &mut Vec<(FieldPath, &'p PatchOp)>) {
        match op {
            PatchOp::MergeObject(children) => {
                for (name, child) in children {
                    walk(&path.child(name), child, out);
                }
            }
            leaf => out.push((path.clone(), leaf)),
        }
    }
    let mut out = Vec::new();
    for (name, op) in patch.ops() {
        walk(&FieldPath::root().child(name), op, &mut out);
    }
    out
}

/// Document value lookup by dotted path (objects only).
fn value_at<'v>(root: &'v Value, path: &FieldPath) -> Option<&'v Value> {
    let mut current = root;
    for segment in path.segments() {
        current = current.as_object()?.get(segment.as_str())?;
    }
    Some(current)
}

/// Hypothetical post-apply integer at a path: the patched value if the
/// patch sets it, otherwise the document's current value.
fn effective_i64(doc_value: &Value, patch: &Patch, path: &FieldPath) -> Option<i64> {
    if let Some(PatchOp::SetScalar(v)) = patch.op_at(path) {
        return v.as_i64();
    }
    value_at(doc_value, path).and_then(Value::as_i64)
}

/// Relational stage: `hp.current <= hp.max + hp.temp` for every actor the
/// patch touches, evaluated against hypothetical post-apply values.
fn check_hp_invariants(
    patch: &Patch,
    doc_value: &Value,
    violations: &mut Vec<Violation>,
    offenders: &mut BTreeSet<FieldPath>,
) {
    let mut touched: BTreeMap<FieldPath, Vec<FieldPath>> = BTreeMap::new();
    for (path, _) in leaf_paths(patch) {
        let segments = path.segments();
        let Some(hp_pos) = segments.iter().position(|s| s == "hp") else {
            continue;
        };
        if segments.len() != hp_pos.saturating_add(2) {
            continue;
        }
        if !matches!(path.leaf(), Some("current" | "max" | "temp")) {
            continue;
        }
        let actor_prefix =
            FieldPath::from(segments.get(..hp_pos).unwrap_or_default().join(".").as_str());
        touched.entry(actor_prefix).or_default().push(path);
    }

    let defaults = HitPoints::default();
    for (actor_prefix, patched_leaves) in touched {
        let hp = actor_prefix.child("hp");
        let current = effective_i64(doc_value, patch, &hp.child("current"))
            .unwrap_or_else(|| i64::from(defaults.current));
        let max = effective_i64(doc_value, patch, &hp.child("max"))
            .unwrap_or_else(|| i64::from(defaults.max));
        let temp = effective_i64(doc_value, patch, &hp.child("temp"))
            .unwrap_or_else(|| i64::from(defaults.temp));
        let ceiling = max.saturating_add(temp);
        if current > ceiling {
            violations.push(Violation {
                path: hp.child("current"),
                kind: ViolationKind::HpExceedsCeiling { current, ceiling },
            });
            for leaf in patched_leaves {
                offenders.insert(leaf);
            }
        }
    }
}

/// Relational stage: `used <= total` for every pool the patch touches.
fn check_pool_invariants(
    patch: &Patch,
    doc_value: &Value,
    violations: &mut Vec<Violation>,
    offenders: &mut BTreeSet<FieldPath>,
) {
    let mut touched: BTreeMap<FieldPath, Vec<FieldPath>> = BTreeMap::new();
    for (path, _) in leaf_paths(patch) {
        let segments = path.segments();
        let Some(pos) = segments.iter().position(|s| s == "resources") else {
            continue;
        };
        if segments.len() != pos.saturating_add(3) {
            continue;
        }
        if !matches!(path.leaf(), Some("used" | "total")) {
            continue;
        }
        let pool_prefix = FieldPath::from(
            segments
                .get(..pos.saturating_add(2))
                .unwrap_or_default()
                .join(".")
                .as_str(),
        );
        touched.entry(pool_prefix).or_default().push(path);
    }

    for (pool_prefix, patched_leaves) in touched {
        let used = effective_i64(doc_value, patch, &pool_prefix.child("used")).unwrap_or(0);
        let total = effective_i64(doc_value, patch, &pool_prefix.child("total")).unwrap_or(0);
        if used > total {
            violations.push(Violation {
                path: pool_prefix.child("used"),
                kind: ViolationKind::PoolOverdrawn { used, total },
            });
            for leaf in patched_leaves {
                offenders.insert(leaf);
            }
        }
    }
}

/// Relational stage: combat may not end up active with an empty order.
fn check_combat_activation(
    patch: &Patch,
    doc_value: &Value,
    violations: &mut Vec<Violation>,
    offenders: &mut BTreeSet<FieldPath>,
) {
    let active_path = FieldPath::from("combat.active");
    let order_path = FieldPath::from("combat.turn_order");
    let touches_active = patch.op_at(&active_path).is_some();
    let touches_order = patch.op_at(&order_path).is_some();
    if !touches_active && !touches_order {
        return;
    }

    let active = match patch.op_at(&active_path) {
        Some(PatchOp::SetScalar(v)) => v.as_bool().unwrap_or(false),
        _ => value_at(doc_value, &active_path).and_then(Value::as_bool).unwrap_or(false),
    };
    if !active {
        return;
    }

    let order_len = match patch.op_at(&order_path) {
        Some(PatchOp::ReplaceList(values)) => values.len(),
        Some(PatchOp::AppendList(values)) => {
            let existing = value_at(doc_value, &order_path)
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            existing.saturating_add(values.len())
        }
        _ => value_at(doc_value, &order_path).and_then(Value::as_array).map_or(0, Vec::len),
    };

    if order_len == 0 {
        let offender = if touches_active { &active_path } else { &order_path };
        violations.push(Violation {
            path: offender.clone(),
            kind: ViolationKind::ActiveWithoutTurnOrder,
        });
        offenders.insert(active_path.clone());
        if touches_order {
            offenders.insert(order_path.clone());
        }
    }
}

/// Referential stage: every turn-order entry the patch supplies must name
/// an NPC that will exist after the apply, or the player.
fn check_turn_order_references(
    doc: &GameDocument,
    patch: &Patch,
    violations: &mut Vec<Violation>,
    offenders: &mut BTreeSet<FieldPath>,
) {
    let order_path = FieldPath::from("combat.turn_order");
    let supplied: Vec<&Value> = match patch.op_at(&order_path) {
        Some(PatchOp::ReplaceList(values) | PatchOp::AppendList(values)) => {
            values.iter().collect()
        }
        _ => return,
    };

    // NPC ids present after a hypothetical apply: existing ids, minus
    // patch deletions, plus patch introductions.
    let mut npc_ids: BTreeSet<EntityId> = doc.npcs.keys().cloned().collect();
    if let Some(PatchOp::MergeObject(children)) = patch.op_at(&FieldPath::from("npcs")) {
        for (name, op) in children {
            match (EntityId::new(name), op) {
                (Ok(id), PatchOp::Delete) => {
                    npc_ids.remove(&id);
                }
                (Ok(id), _) => {
                    npc_ids.insert(id);
                }
                (Err(_), _) => {}
            }
        }
    }

    let mut bad = false;
    for entry in supplied {
        let resolvable = entry.as_str().is_some_and(|raw| {
            EntityId::new(raw)
                .map(|id| id == doc.player_id || npc_ids.contains(&id))
                .unwrap_or(false)
        });
        if !resolvable {
            violations.push(Violation {
                path: order_path.clone(),
                kind: ViolationKind::UnknownCombatant {
                    id: entry.as_str().unwrap_or("<non-string>").to_owned(),
                },
            });
            bad = true;
        }
    }
    if bad {
        offenders.insert(order_path);
    }
}
