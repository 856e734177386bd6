//! Post-merge combat reconciliation.
//!
//! A small state machine run unconditionally after every merge. It keeps
//! the combat bookkeeping consistent with actor health: dead combatants
//! leave the turn order, the player transitions to death saves instead of
//! removal, and an encounter with no living hostiles ends, garbage-
//! collecting dead enemies from the document and marking their manifest
//! entries departed. Everything it finds wrong is corrected in place and
//! reported as a recoverable [`CombatInconsistency`], never a failure.

use tracing::{debug, warn};

use chronicler_types::{
    ActorRole, EntityId, EntityKind, GameDocument, LifecycleEvent,
};

use crate::error::CombatInconsistency;

/// What the reconciler did to one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombatReport {
    /// Inconsistencies found and corrected.
    pub inconsistencies: Vec<CombatInconsistency>,
    /// Whether this pass ended the encounter.
    pub ended: bool,
    /// Dead enemies garbage-collected from the `npcs` map at combat end.
    pub removed_npcs: Vec<EntityId>,
}

/// Reconcile combat state after a merge.
///
/// `previous_round` is the round counter before the merge; when the
/// merged round advanced past it, timed condition durations tick down on
/// all combatants.
pub fn reconcile(doc: &mut GameDocument, previous_round: Option<u32>) -> CombatReport {
    let mut report = CombatReport::default();

    if !doc.combat.active {
        // Invariant: inactive combat carries no bookkeeping.
        if !doc.combat.turn_order.is_empty()
            || doc.combat.round.is_some()
            || doc.combat.current_turn_index.is_some()
        {
            record(&mut report, CombatInconsistency::LeftoverBookkeeping);
            doc.combat.deactivate();
        }
        sync_player_death_saves(doc);
        return report;
    }

    if doc.combat.turn_order.is_empty() {
        record(&mut report, CombatInconsistency::ActivationWithoutOrder);
        doc.combat.deactivate();
        return report;
    }

    if doc.combat.round.is_none() {
        doc.combat.round = Some(1);
    }

    sync_player_death_saves(doc);

    // Drop entries that resolve to no known actor, then entries whose
    // actor died (the player stays regardless, via death saves).
    let order = core::mem::take(&mut doc.combat.turn_order);
    let mut kept = Vec::with_capacity(order.len());
    for id in order {
        if doc.actor(&id).is_none() {
            record(&mut report, CombatInconsistency::UnknownCombatant { id });
            continue;
        }
        let is_player = id == doc.player_id;
        let down = doc.actor(&id).is_some_and(chronicler_types::ActorState::is_down);
        if down && !is_player {
            debug!(combatant = %id, "removing dead combatant from turn order");
            continue;
        }
        kept.push(id);
    }

    // Round advance ticks timed condition durations on combatants.
    if let (Some(prev), Some(now)) = (previous_round, doc.combat.round)
        && now > prev
    {
        tick_conditions(doc, &kept);
    }

    let hostiles_remain = kept.iter().any(|id| {
        *id != doc.player_id
            && doc
                .npcs
                .get(id)
                .is_some_and(|npc| npc.role == ActorRole::Enemy && !npc.is_down())
    });

    if hostiles_remain {
        doc.combat.turn_order = kept;
        let len = doc.combat.turn_order.len();
        match doc.combat.current_turn_index {
            None => doc.combat.current_turn_index = Some(0),
            Some(index) if index >= len => {
                record(&mut report, CombatInconsistency::StaleTurnIndex { index, len });
                doc.combat.current_turn_index = Some(0);
            }
            Some(_) => {}
        }
    } else {
        end_combat(doc, &mut report);
    }

    report
}

/// End the encounter: clear bookkeeping, garbage-collect dead enemies,
/// and mark their manifest entries departed.
fn end_combat(doc: &mut GameDocument, report: &mut CombatReport) {
    doc.combat.deactivate();
    report.ended = true;

    let dead_enemies: Vec<EntityId> = doc
        .npcs
        .iter()
        .filter(|(_, npc)| npc.role == ActorRole::Enemy && npc.is_down())
        .map(|(id, _)| id.clone())
        .collect();

    for id in dead_enemies {
        if let Some(npc) = doc.npcs.remove(&id) {
            if doc.entities.get(&id).is_none() {
                doc.entities.introduce(
                    id.clone(),
                    &npc.display_name,
                    EntityKind::Character,
                    doc.turn_number,
                );
            }
            doc.entities
                .apply_event(&id, LifecycleEvent::DepartsPermanently, doc.turn_number);
            debug!(npc = %id, "garbage-collected dead enemy at combat end");
            report.removed_npcs.push(id);
        }
    }
}

/// Keep the player's death-save sub-state in step with their hit points.
fn sync_player_death_saves(doc: &mut GameDocument) {
    if doc.player.is_down() {
        if doc.player.death_saves.is_none() {
            doc.player.death_saves = Some(chronicler_types::DeathSaves::default());
        }
    } else {
        doc.player.death_saves = None;
    }
}

/// Decrement timed condition durations on the player and the surviving
/// combatant NPCs; conditions reaching 0 rounds are dropped.
fn tick_conditions(doc: &mut GameDocument, combatants: &[EntityId]) {
    tick_actor_conditions(&mut doc.player);
    for id in combatants {
        if *id == doc.player_id {
            continue;
        }
        if let Some(npc) = doc.npcs.get_mut(id) {
            tick_actor_conditions(npc);
        }
    }
}

fn tick_actor_conditions(actor: &mut chronicler_types::ActorState) {
    actor.conditions.retain_mut(|condition| {
        match condition.remaining_rounds {
            None => true,
            Some(rounds) => {
                let next = rounds.saturating_sub(1);
                if next == 0 {
                    false
                } else {
                    condition.remaining_rounds = Some(next);
                    true
                }
            }
        }
    });
}

fn record(report: &mut CombatReport, inconsistency: CombatInconsistency) {
    warn!(%inconsistency, "combat reconciler corrected an inconsistency");
    report.inconsistencies.push(inconsistency);
}
