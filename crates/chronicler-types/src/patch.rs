//! The typed, ephemeral patch tree and the dotted field path type.
//!
//! A [`Patch`] is constructed once by the parser from a raw proposed delta
//! and is immutable afterwards. Downstream stages (validator, merge engine)
//! never re-inspect raw string sentinels; operation intent is carried
//! entirely by the [`PatchOp`] variant.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dotted path addressing one field inside a document
/// (`npcs.npc_goblin_1.hp.current`). The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// The root (empty) path.
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend this path with one more segment.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_owned());
        Self(segments)
    }

    /// The path segments in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The final segment, if any.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &Self) -> bool {
        self.0.len() >= other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl core::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0.join("."))
        }
    }
}

impl From<String> for FieldPath {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<&str> for FieldPath {
    fn from(raw: &str) -> Self {
        let segments = raw
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Self(segments)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0.join(".")
    }
}

/// One node of a patch tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatchOp {
    /// Replace the scalar at this path outright.
    SetScalar(Value),
    /// Recurse field-by-field; only named children are touched.
    MergeObject(BTreeMap<String, PatchOp>),
    /// Append values to the list at this path, merging into an existing
    /// element when an appended object shares its identity key.
    AppendList(Vec<Value>),
    /// Replace the whole list at this path.
    ReplaceList(Vec<Value>),
    /// Remove the key at this path, or the identity-matched element from
    /// a list of objects. Removing an absent target is a no-op.
    Delete,
}

impl PatchOp {
    /// Short verb used in operation summaries.
    const fn verb(&self) -> &'static str {
        match self {
            Self::SetScalar(_) => "set",
            Self::MergeObject(_) => "merge",
            Self::AppendList(_) => "append",
            Self::ReplaceList(_) => "replace",
            Self::Delete => "delete",
        }
    }
}

/// A typed, ephemeral description of one intended document change.
///
/// The root is always an object merge; a patch that touches nothing is
/// empty and applying it only advances the turn counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: BTreeMap<String, PatchOp>,
}

impl Patch {
    /// Build a patch from root-level operations.
    pub const fn new(ops: BTreeMap<String, PatchOp>) -> Self {
        Self { ops }
    }

    /// The root-level operations, keyed by field name.
    pub const fn ops(&self) -> &BTreeMap<String, PatchOp> {
        &self.ops
    }

    /// Whether the patch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Count of leaf operations in the tree.
    pub fn leaf_count(&self) -> usize {
        fn count(op: &PatchOp) -> usize {
            match op {
                PatchOp::MergeObject(children) => children.values().map(count).sum(),
                _ => 1,
            }
        }
        self.ops.values().map(count).sum()
    }

    /// Look up the operation at a leaf path, descending through merges.
    pub fn op_at(&self, path: &FieldPath) -> Option<&PatchOp> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        let mut current = self.ops.get(first.as_str())?;
        for segment in segments {
            match current {
                PatchOp::MergeObject(children) => {
                    current = children.get(segment.as_str())?;
                }
                _ => return None,
            }
        }
        Some(current)
    }

    /// Human-readable per-operation summary lines, in path order.
    ///
    /// Used for the `applied_patch_summary` field of update results.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (name, op) in &self.ops {
            summarize(&FieldPath::root().child(name), op, &mut lines);
        }
        lines
    }

    /// Clone this patch with every operation at or below the given paths
    /// removed. Merge nodes emptied by the pruning are dropped too.
    #[must_use]
    pub fn without(&self, paths: &BTreeSet<FieldPath>) -> Self {
        fn prune(
            path: &FieldPath,
            op: &PatchOp,
            paths: &BTreeSet<FieldPath>,
        ) -> Option<PatchOp> {
            if paths.contains(path) {
                return None;
            }
            match op {
                PatchOp::MergeObject(children) => {
                    let kept: BTreeMap<String, PatchOp> = children
                        .iter()
                        .filter_map(|(name, child)| {
                            prune(&path.child(name), child, paths)
                                .map(|c| (name.clone(), c))
                        })
                        .collect();
                    if kept.is_empty() { None } else { Some(PatchOp::MergeObject(kept)) }
                }
                other => Some(other.clone()),
            }
        }

        let ops = self
            .ops
            .iter()
            .filter_map(|(name, op)| {
                prune(&FieldPath::root().child(name), op, paths).map(|o| (name.clone(), o))
            })
            .collect();
        Self { ops }
    }
}

fn summarize(path: &FieldPath, op: &PatchOp, lines: &mut Vec<String>) {
    match op {
        PatchOp::MergeObject(children) => {
            for (name, child) in children {
                summarize(&path.child(name), child, lines);
            }
        }
        PatchOp::SetScalar(value) => lines.push(format!("set {path} = {value}")),
        PatchOp::AppendList(values) => {
            lines.push(format!("append {} value(s) to {path}", values.len()));
        }
        PatchOp::ReplaceList(values) => {
            lines.push(format!("replace {path} with {} value(s)", values.len()));
        }
        PatchOp::Delete => lines.push(format!("{} {path}", op.verb())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Patch {
        let mut hp = BTreeMap::new();
        hp.insert("current".to_owned(), PatchOp::SetScalar(json!(12)));
        let mut player = BTreeMap::new();
        player.insert("hp".to_owned(), PatchOp::MergeObject(hp));
        player.insert(
            "inventory".to_owned(),
            PatchOp::AppendList(vec![json!({"id": "torch", "quantity": 2})]),
        );
        let mut root = BTreeMap::new();
        root.insert("player".to_owned(), PatchOp::MergeObject(player));
        root.insert("combat".to_owned(), PatchOp::Delete);
        Patch::new(root)
    }

    #[test]
    fn display_joins_segments_with_dots() {
        let path = FieldPath::from("player.hp.current");
        assert_eq!(path.to_string(), "player.hp.current");
        assert_eq!(path.leaf(), Some("current"));
        assert_eq!(FieldPath::root().to_string(), "<root>");
    }

    #[test]
    fn starts_with_matches_prefixes() {
        let path = FieldPath::from("player.hp.current");
        assert!(path.starts_with(&FieldPath::from("player.hp")));
        assert!(path.starts_with(&FieldPath::root()));
        assert!(!path.starts_with(&FieldPath::from("npcs")));
    }

    #[test]
    fn op_at_descends_merge_nodes() {
        let patch = sample();
        assert_eq!(
            patch.op_at(&FieldPath::from("player.hp.current")),
            Some(&PatchOp::SetScalar(json!(12)))
        );
        assert_eq!(patch.op_at(&FieldPath::from("player.hp.max")), None);
        assert_eq!(patch.op_at(&FieldPath::from("combat")), Some(&PatchOp::Delete));
    }

    #[test]
    fn leaf_count_ignores_merge_nodes() {
        assert_eq!(sample().leaf_count(), 3);
    }

    #[test]
    fn summary_lists_each_leaf_operation() {
        let lines = sample().summary();
        assert_eq!(
            lines,
            vec![
                "delete combat".to_owned(),
                "set player.hp.current = 12".to_owned(),
                "append 1 value(s) to player.inventory".to_owned(),
            ]
        );
    }

    #[test]
    fn without_prunes_subtrees_and_empty_parents() {
        let patch = sample();
        let mut drop = BTreeSet::new();
        drop.insert(FieldPath::from("player.hp.current"));
        let pruned = patch.without(&drop);
        assert_eq!(pruned.op_at(&FieldPath::from("player.hp.current")), None);
        // The emptied hp merge node is gone, the sibling append survives.
        assert_eq!(pruned.op_at(&FieldPath::from("player.hp")), None);
        assert!(pruned.op_at(&FieldPath::from("player.inventory")).is_some());
        assert!(pruned.op_at(&FieldPath::from("combat")).is_some());
    }
}
