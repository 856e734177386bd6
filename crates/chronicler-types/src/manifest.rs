//! The narrative entity manifest and its visibility lifecycle machine.
//!
//! Every character, item, and location that has appeared in the narrative
//! gets one manifest entry. Entries are never deleted; an entity that
//! leaves the story permanently transitions to [`Lifecycle::Departed`] and
//! stays there. An entity id, once assigned, never changes kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// What kind of thing a manifest entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A person or creature.
    Character,
    /// An object.
    Item,
    /// A place.
    Location,
}

/// Visibility lifecycle of a narrative entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Newly added this turn; not yet seen in a scene since.
    Introduced,
    /// Present in the current scene.
    Active,
    /// Recently present but absent this turn.
    Mentioned,
    /// Absent for multiple turns.
    Inactive,
    /// Permanently gone. Terminal.
    Departed,
}

/// An event driving a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The entity was referenced in this turn's narrative.
    AppearsInScene,
    /// The entity was not referenced in this turn's narrative.
    AbsentThisTurn,
    /// The entity left the story for good (death, destruction, exit).
    DepartsPermanently,
}

impl Lifecycle {
    /// Apply one event to this state, returning the successor state.
    ///
    /// Transition table:
    ///
    /// | state      | event                | next      |
    /// |------------|----------------------|-----------|
    /// | introduced | `appears_in_scene`   | active    |
    /// | active     | `absent_this_turn`   | mentioned |
    /// | mentioned  | `absent_this_turn`   | inactive  |
    /// | mentioned  | `appears_in_scene`   | active    |
    /// | inactive   | `appears_in_scene`   | active    |
    /// | any        | `departs_permanently`| departed  |
    ///
    /// `Departed` is terminal and absorbs every event. Pairs not listed
    /// leave the state unchanged.
    #[must_use]
    pub const fn apply(self, event: LifecycleEvent) -> Self {
        match (self, event) {
            (Self::Departed, _) => Self::Departed,
            (_, LifecycleEvent::DepartsPermanently) => Self::Departed,
            (
                Self::Introduced | Self::Mentioned | Self::Inactive | Self::Active,
                LifecycleEvent::AppearsInScene,
            ) => Self::Active,
            (Self::Active, LifecycleEvent::AbsentThisTurn) => Self::Mentioned,
            (Self::Mentioned, LifecycleEvent::AbsentThisTurn) => Self::Inactive,
            (Self::Introduced | Self::Inactive, LifecycleEvent::AbsentThisTurn) => self,
        }
    }

    /// Whether this state is terminal.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Departed)
    }
}

/// One tracked narrative entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRecord {
    /// Name as it appears in narrative text.
    pub display_name: String,
    /// What kind of entity this is. Never changes once assigned.
    pub kind: EntityKind,
    /// Current visibility lifecycle state.
    pub lifecycle: Lifecycle,
    /// Turn number of the most recent scene appearance.
    pub last_turn_seen: u64,
}

/// The tracked set of narrative entities, keyed by stable id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityManifest(pub BTreeMap<EntityId, EntityRecord>);

impl EntityManifest {
    /// Look up an entry by id.
    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.0.get(id)
    }

    /// Insert a newly-introduced entity.
    ///
    /// Returns `false` without modifying anything if the id already
    /// exists (ids are never reassigned).
    pub fn introduce(
        &mut self,
        id: EntityId,
        display_name: &str,
        kind: EntityKind,
        turn: u64,
    ) -> bool {
        if self.0.contains_key(&id) {
            return false;
        }
        self.0.insert(
            id,
            EntityRecord {
                display_name: display_name.to_owned(),
                kind,
                lifecycle: Lifecycle::Introduced,
                last_turn_seen: turn,
            },
        );
        true
    }

    /// Apply a lifecycle event to one entry, updating `last_turn_seen`
    /// on scene appearances. Returns the new state, or `None` if the id
    /// has no entry.
    pub fn apply_event(
        &mut self,
        id: &EntityId,
        event: LifecycleEvent,
        turn: u64,
    ) -> Option<Lifecycle> {
        let record = self.0.get_mut(id)?;
        record.lifecycle = record.lifecycle.apply(event);
        if event == LifecycleEvent::AppearsInScene && !record.lifecycle.is_terminal() {
            record.last_turn_seen = turn;
        }
        Some(record.lifecycle)
    }

    /// Find the id of an entry whose display name matches, ignoring case.
    pub fn find_by_display_name(&self, name: &str) -> Option<&EntityId> {
        self.0
            .iter()
            .find(|(_, record)| record.display_name.eq_ignore_ascii_case(name))
            .map(|(id, _)| id)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityRecord)> {
        self.0.iter()
    }
}
