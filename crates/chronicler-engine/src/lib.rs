//! The Chronicler state synchronization engine.
//!
//! Takes an untrusted, loosely-structured delta proposed by a generative
//! model, turns it into a typed patch, validates it against a versioned
//! schema, merges it into the authoritative document without destroying
//! unrelated data, and reconciles the combat state machine afterwards.
//!
//! Everything in this crate is pure in-memory computation; persistence and
//! orchestration live in `chronicler-store` and `chronicler-sync`.
//!
//! # Modules
//!
//! - [`parse`] -- Raw delta tree -> typed [`Patch`] (sentinel handling)
//! - [`schema`] -- Versioned declarative field schema, YAML-loadable
//! - [`validate`] -- Staged structural/relational/referential validation
//! - [`merge`] -- Non-destructive deep merge of an approved patch
//! - [`combat`] -- Post-merge combat reconciliation state machine
//! - [`entity`] -- Narrative entity extraction and manifest reconciliation
//! - [`migrate`] -- Ordered schema-version migration chain
//! - [`recovery`] -- Operator recovery directive parsing
//! - [`error`] -- Per-stage error types
//!
//! [`Patch`]: chronicler_types::Patch

pub mod combat;
pub mod entity;
pub mod error;
pub mod merge;
pub mod migrate;
pub mod parse;
pub mod recovery;
pub mod schema;
pub mod validate;

// Re-export the primary entry points for convenience.
pub use combat::{reconcile, CombatReport};
pub use entity::{
    reconcile_entities, Extractor, HeuristicExtractor, Introduction, TrackerOutcome,
    UnresolvedEntityReference,
};
pub use error::{CombatInconsistency, MergeError, MigrationError, PatchShapeError};
pub use merge::apply_patch;
pub use migrate::{MigrationManager, MigrationOutcome};
pub use parse::parse_patch;
pub use recovery::parse_directive;
pub use schema::{FieldKind, FieldSpec, Schema, SchemaCatalog, SchemaError};
pub use validate::{validate, ValidationReport, Violation, ViolationKind};
