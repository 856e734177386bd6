//! Operator recovery directive parsing.
//!
//! When a document is wedged in a state the normal pipeline cannot fix,
//! an operator can submit a small line-oriented directive instead of a
//! model-proposed delta:
//!
//! ```text
//! # put the party back on solid ground
//! world.location = "Harrow Deep"
//! combat = __DELETE__
//! player.hp.current = 12
//! ```
//!
//! One `path = value` assignment per line, `#` comments and blank lines
//! skipped. Values are JSON literals; a bare unquoted word is taken as a
//! string. The result is an ordinary [`Patch`] that still goes through
//! full validation downstream, so a directive cannot smuggle in state the
//! schema would reject.

use std::collections::BTreeMap;

use serde_json::Value;

use chronicler_types::{FieldPath, Patch, PatchOp};

use crate::error::PatchShapeError;
use crate::parse::DELETE_SENTINEL;

/// Parse a recovery directive into a typed [`Patch`].
///
/// # Errors
///
/// Returns [`PatchShapeError::MalformedDirective`] for a line that is not
/// a `path = value` assignment, and
/// [`PatchShapeError::DuplicateDirectivePath`] when two lines assign the
/// same path (or one assigns inside the other).
pub fn parse_directive(text: &str) -> Result<Patch, PatchShapeError> {
    let mut ops: BTreeMap<String, PatchOp> = BTreeMap::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let number = index.saturating_add(1);
        let malformed = || PatchShapeError::MalformedDirective {
            line: number,
            text: raw_line.to_owned(),
        };

        let (path_text, value_text) = line.split_once('=').ok_or_else(malformed)?;
        let path_text = path_text.trim();
        // FieldPath parsing drops empty segments, so police them here.
        if path_text.is_empty() || path_text.split('.').any(str::is_empty) {
            return Err(malformed());
        }
        let path = FieldPath::from(path_text);

        let op = parse_value(value_text.trim()).ok_or_else(malformed)?;
        insert(&mut ops, &path, path.segments(), op)?;
    }

    Ok(Patch::new(ops))
}

/// Parse the right-hand side of an assignment.
fn parse_value(text: &str) -> Option<PatchOp> {
    if text.is_empty() {
        return None;
    }
    if text == DELETE_SENTINEL {
        return Some(PatchOp::Delete);
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(values)) => Some(PatchOp::ReplaceList(values)),
        Ok(value) => Some(PatchOp::SetScalar(value)),
        // Bare unquoted word: taken as a string.
        Err(_) => Some(PatchOp::SetScalar(Value::String(text.to_owned()))),
    }
}

/// Insert one assignment into the patch tree, creating intermediate
/// merge nodes along the path.
fn insert(
    ops: &mut BTreeMap<String, PatchOp>,
    full: &FieldPath,
    segments: &[String],
    op: PatchOp,
) -> Result<(), PatchShapeError> {
    let duplicate = || PatchShapeError::DuplicateDirectivePath { path: full.clone() };

    let Some((head, rest)) = segments.split_first() else {
        return Err(duplicate());
    };

    if rest.is_empty() {
        if ops.contains_key(head) {
            return Err(duplicate());
        }
        ops.insert(head.clone(), op);
        return Ok(());
    }

    match ops
        .entry(head.clone())
        .or_insert_with(|| PatchOp::MergeObject(BTreeMap::new()))
    {
        PatchOp::MergeObject(children) => insert(children, full, rest, op),
        // An earlier line already assigned this prefix outright.
        _ => Err(duplicate()),
    }
}
