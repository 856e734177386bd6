//! Raw proposed-delta parsing into typed patch trees.
//!
//! The model-generation collaborator hands over a nested key/value tree in
//! which the string `"__DELETE__"` marks deletion and a map of exactly
//! `{"append": <list-or-scalar>}` at a list-typed path marks an append.
//! This module converts that tree into a [`Patch`] once; no downstream
//! stage ever re-inspects string content to infer operation intent.
//!
//! The parser is pure: it consults the schema's declared field kinds to
//! police list-typed paths, and never looks at the existing document.
//! Ambiguous shapes are rejected with a [`PatchShapeError`] naming the
//! offending path, never silently coerced.

use std::collections::BTreeMap;

use serde_json::Value;

use chronicler_types::{FieldPath, Patch, PatchOp};

use crate::error::PatchShapeError;
use crate::schema::Schema;

/// The deletion sentinel recognized in raw deltas.
pub const DELETE_SENTINEL: &str = "__DELETE__";

/// The append-wrapper key recognized in raw deltas.
const APPEND_KEY: &str = "append";

/// Parse a raw delta tree into a typed [`Patch`].
///
/// # Errors
///
/// Returns [`PatchShapeError`] when the root is not an object, a field
/// name is unusable, or a list-typed path is given anything other than an
/// array, an append wrapper, or a per-id deletion map.
pub fn parse_patch(raw: &Value, schema: &Schema) -> Result<Patch, PatchShapeError> {
    let Value::Object(root) = raw else {
        return Err(PatchShapeError::NonObjectRoot { found: json_type_name(raw) });
    };

    let mut ops = BTreeMap::new();
    for (name, value) in root {
        let path = FieldPath::root().child(name);
        check_field_name(&FieldPath::root(), name)?;
        ops.insert(name.clone(), convert(&path, value, schema)?);
    }
    Ok(Patch::new(ops))
}

/// Convert one raw value into a patch operation.
fn convert(path: &FieldPath, value: &Value, schema: &Schema) -> Result<PatchOp, PatchShapeError> {
    match value {
        Value::String(s) if s == DELETE_SENTINEL => Ok(PatchOp::Delete),

        Value::Object(map) => convert_map(path, map, schema),

        Value::Array(values) => {
            // Arrays always mean whole-list replacement; appends must use
            // the wrapper form.
            Ok(PatchOp::ReplaceList(values.clone()))
        }

        scalar => {
            if schema.is_list_path(path) {
                return Err(PatchShapeError::ScalarAtListPath { path: path.clone() });
            }
            Ok(PatchOp::SetScalar(scalar.clone()))
        }
    }
}

/// Convert a raw map, resolving the append wrapper and list-path shapes.
fn convert_map(
    path: &FieldPath,
    map: &serde_json::Map<String, Value>,
    schema: &Schema,
) -> Result<PatchOp, PatchShapeError> {
    // A map of exactly {"append": ...} is the append wrapper.
    if map.len() == 1
        && let Some(appended) = map.get(APPEND_KEY)
    {
        if !schema.is_list_path(path) {
            return Err(PatchShapeError::AppendAtNonList { path: path.clone() });
        }
        let values = match appended {
            Value::Array(values) => values.clone(),
            scalar_or_object => vec![scalar_or_object.clone()],
        };
        return Ok(PatchOp::AppendList(values));
    }

    if schema.is_list_path(path) {
        // The only map accepted at a list path is a per-id deletion map.
        let all_deletions = map
            .values()
            .all(|v| matches!(v, Value::String(s) if s == DELETE_SENTINEL));
        if !all_deletions {
            return Err(PatchShapeError::InvalidListShape { path: path.clone() });
        }
        let mut children = BTreeMap::new();
        for name in map.keys() {
            check_field_name(path, name)?;
            children.insert(name.clone(), PatchOp::Delete);
        }
        return Ok(PatchOp::MergeObject(children));
    }

    let mut children = BTreeMap::new();
    for (name, child) in map {
        check_field_name(path, name)?;
        children.insert(name.clone(), convert(&path.child(name), child, schema)?);
    }
    Ok(PatchOp::MergeObject(children))
}

/// Reject empty field names and names containing the path separator.
fn check_field_name(parent: &FieldPath, name: &str) -> Result<(), PatchShapeError> {
    if name.is_empty() || name.contains('.') {
        return Err(PatchShapeError::InvalidFieldName {
            path: parent.clone(),
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// JSON type name for diagnostics.
pub(crate) const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
