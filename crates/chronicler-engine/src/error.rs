//! Error types for the engine's pipeline stages.
//!
//! Parser and migration failures reject the whole operation and carry full
//! detail. Merge failures indicate a patch that escaped validation (or a
//! bug) and also reject the update without mutating anything. Combat
//! inconsistencies are recoverable: the reconciler corrects the document
//! and reports what it fixed.

use chronicler_types::{EntityId, FieldPath};

/// Malformed raw patch input. Always rejects the whole update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchShapeError {
    /// The raw delta's root was not an object.
    #[error("patch root must be an object, found {found}")]
    NonObjectRoot {
        /// JSON type name of what was found.
        found: &'static str,
    },

    /// A list-typed path was given a bare scalar.
    #[error("list-typed path {path} was given a scalar; use an array, an append wrapper, or a deletion map")]
    ScalarAtListPath {
        /// The offending path.
        path: FieldPath,
    },

    /// A list-typed path was given a map that is neither an append
    /// wrapper nor a pure deletion map.
    #[error("list-typed path {path} was given a map; only {{\"append\": ...}} or per-id deletions are accepted there")]
    InvalidListShape {
        /// The offending path.
        path: FieldPath,
    },

    /// An `{"append": ...}` wrapper appeared at a path not typed as a list.
    #[error("append wrapper at non-list path {path}")]
    AppendAtNonList {
        /// The offending path.
        path: FieldPath,
    },

    /// An object key was empty or contained a path separator.
    #[error("invalid field name {name:?} under {path}")]
    InvalidFieldName {
        /// Parent path of the bad key.
        path: FieldPath,
        /// The offending key.
        name: String,
    },

    /// A recovery directive line could not be parsed.
    #[error("malformed recovery directive on line {line}: {text:?}")]
    MalformedDirective {
        /// 1-based line number.
        line: usize,
        /// The raw line text.
        text: String,
    },

    /// Two recovery directive lines assigned the same path.
    #[error("recovery directive assigns {path} more than once")]
    DuplicateDirectivePath {
        /// The path assigned twice.
        path: FieldPath,
    },
}

/// A validated patch failed to apply. Indicates a schema/model mismatch;
/// the document is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Document or patch could not round-trip through JSON.
    #[error("merge serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation addressed a value of the wrong shape
    /// (e.g. a merge into a scalar).
    #[error("operation at {path} does not match the document shape there")]
    PathTypeMismatch {
        /// The offending path.
        path: FieldPath,
    },

    /// The turn counter would overflow.
    #[error("turn counter overflow")]
    TurnOverflow,
}

/// A document version the migration chain cannot upgrade. Fatal on load;
/// no partial document is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// No transform is registered for this version.
    #[error("no migration path from schema version {from} (current: {current})")]
    UnmigratableVersion {
        /// The stranded version.
        from: u32,
        /// The engine's current version.
        current: u32,
    },

    /// The document was written by a newer engine.
    #[error("document schema version {found} is newer than this engine's {current}")]
    FutureVersion {
        /// The document's version.
        found: u32,
        /// The engine's current version.
        current: u32,
    },

    /// The raw document lacked a usable `schema_version` field.
    #[error("document has no readable schema_version field")]
    MissingVersion,

    /// A transform produced a document that no longer deserializes.
    #[error("migrated document failed to deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// A transform step failed.
    #[error("migration step {from} -> {to} failed: {reason}")]
    StepFailed {
        /// Version the step started from.
        from: u32,
        /// Version the step targets.
        to: u32,
        /// What went wrong.
        reason: String,
    },
}

/// A combat bookkeeping inconsistency found and corrected by the
/// reconciler. Recoverable; logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CombatInconsistency {
    /// A turn-order entry resolved to no known actor and was dropped.
    #[error("turn order entry {id} resolves to no known actor; dropped")]
    UnknownCombatant {
        /// The unresolvable id.
        id: EntityId,
    },

    /// Combat was activated without any combatants; deactivated.
    #[error("combat activated with an empty turn order; deactivated")]
    ActivationWithoutOrder,

    /// The current turn index pointed past the end of the order; reset.
    #[error("current turn index {index} out of bounds for {len} combatant(s); reset to 0")]
    StaleTurnIndex {
        /// The out-of-bounds index.
        index: usize,
        /// The turn order length after cleanup.
        len: usize,
    },

    /// Inactive combat carried leftover bookkeeping; cleared.
    #[error("inactive combat carried leftover round/turn-order bookkeeping; cleared")]
    LeftoverBookkeeping,
}
