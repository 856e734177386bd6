//! Non-destructive deep merge of an approved patch into a document.
//!
//! The merge operates on the document's serialized [`Value`] form and
//! re-types the result at the end, so a patch can address any declared
//! path generically while the typed model still gets the final word on
//! structure. The input document is never mutated: the merge builds a
//! complete replacement or fails, so no partial merge is ever observable.
//!
//! Per-operation semantics:
//!
//! - `SetScalar` replaces the value at the path outright.
//! - `MergeObject` recurses field-by-field and touches only named
//!   children; it never replaces a whole object wholesale. Applied to a
//!   list of objects, its `Delete` children remove the identity-matched
//!   element.
//! - `AppendList` appends, except that an appended object whose identity
//!   key matches an existing element merges into that element instead of
//!   duplicating it.
//! - `ReplaceList` replaces the whole list.
//! - `Delete` removes the key; deleting an absent target is a no-op.
//!
//! `turn_number` is incremented exactly once for the whole batch.

use serde_json::{Map, Value};

use chronicler_types::{FieldPath, GameDocument, Patch, PatchOp};

use crate::error::MergeError;

/// Apply a schema-approved patch, producing the successor document.
///
/// # Errors
///
/// Returns [`MergeError`] if an operation does not match the document
/// shape at its path or the merged result no longer deserializes. The
/// input document is untouched in every error case.
pub fn apply_patch(doc: &GameDocument, patch: &Patch) -> Result<GameDocument, MergeError> {
    let mut value = serde_json::to_value(doc)?;
    let Value::Object(root) = &mut value else {
        return Err(MergeError::PathTypeMismatch { path: FieldPath::root() });
    };

    for (name, op) in patch.ops() {
        apply_op(root, &FieldPath::root().child(name), name, op)?;
    }

    let mut merged: GameDocument = serde_json::from_value(value)?;
    merged.turn_number = doc
        .turn_number
        .checked_add(1)
        .ok_or(MergeError::TurnOverflow)?;
    Ok(merged)
}

/// Apply one operation to `parent[key]`.
fn apply_op(
    parent: &mut Map<String, Value>,
    path: &FieldPath,
    key: &str,
    op: &PatchOp,
) -> Result<(), MergeError> {
    match op {
        PatchOp::SetScalar(value) => {
            parent.insert(key.to_owned(), value.clone());
            Ok(())
        }

        PatchOp::Delete => {
            parent.remove(key);
            Ok(())
        }

        PatchOp::ReplaceList(values) => {
            parent.insert(key.to_owned(), Value::Array(values.clone()));
            Ok(())
        }

        PatchOp::AppendList(values) => {
            let target = parent
                .entry(key.to_owned())
                .or_insert_with(|| Value::Array(Vec::new()));
            let Value::Array(existing) = target else {
                return Err(MergeError::PathTypeMismatch { path: path.clone() });
            };
            for value in values {
                append_with_identity(existing, value);
            }
            Ok(())
        }

        PatchOp::MergeObject(children) => {
            let target = parent
                .entry(key.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            match target {
                Value::Object(obj) => {
                    for (name, child) in children {
                        apply_op(obj, &path.child(name), name, child)?;
                    }
                    Ok(())
                }
                Value::Array(elements) => {
                    // Per-id operations on a list of objects. The parser
                    // only produces deletions here.
                    for (name, child) in children {
                        match child {
                            PatchOp::Delete => {
                                elements.retain(|e| identity_key(e) != Some(name));
                            }
                            _ => {
                                return Err(MergeError::PathTypeMismatch {
                                    path: path.child(name),
                                });
                            }
                        }
                    }
                    Ok(())
                }
                _ => Err(MergeError::PathTypeMismatch { path: path.clone() }),
            }
        }
    }
}

/// The identity key of a list element: its `id` field, or `name` for
/// elements (conditions, objectives) identified by name.
fn identity_key(value: &Value) -> Option<&str> {
    value
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| value.get("name").and_then(Value::as_str))
}

/// Append one value, merging into an identity-matched existing element
/// instead of duplicating it.
fn append_with_identity(existing: &mut Vec<Value>, incoming: &Value) {
    if let Some(key) = identity_key(incoming)
        && let Some(matched) = existing
            .iter_mut()
            .find(|e| identity_key(e) == Some(key))
    {
        merge_values(matched, incoming);
        return;
    }
    existing.push(incoming.clone());
}

/// Recursive value merge used for identity-matched appends: objects merge
/// per key, everything else is replaced by the incoming value.
fn merge_values(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (name, value) in incoming_obj {
                match target_obj.get_mut(name) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_obj.insert(name.clone(), value.clone());
                    }
                }
            }
        }
        (target_slot, _) => {
            *target_slot = incoming.clone();
        }
    }
}
