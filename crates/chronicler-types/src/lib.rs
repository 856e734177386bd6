//! Shared type definitions for the Chronicler state synchronization engine.
//!
//! This crate is the single source of truth for the types that flow between
//! the patch parser, schema validator, merge engine, combat reconciler,
//! migration manager, and synchronization service.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers (campaign UUIDs, entity slugs)
//! - [`document`] -- The authoritative [`GameDocument`] aggregate and its parts
//! - [`manifest`] -- The narrative entity manifest and lifecycle machine
//! - [`patch`] -- The typed, ephemeral [`Patch`] tree and [`FieldPath`]

pub mod document;
pub mod ids;
pub mod manifest;
pub mod patch;

// Re-export all public types at crate root for convenience.
pub use document::{
    AbilityScores, ActorRole, ActorState, CombatState, Condition, DeathSaves, GameDocument,
    HitPoints, ItemRef, Objective, QuestState, QuestStatus, ResourcePool, WorldState,
    CURRENT_SCHEMA_VERSION,
};
pub use ids::{CampaignId, EntityId, IdError, QuestId};
pub use manifest::{EntityKind, EntityManifest, EntityRecord, Lifecycle, LifecycleEvent};
pub use patch::{FieldPath, Patch, PatchOp};
