//! Narrative entity extraction and manifest reconciliation.
//!
//! The tracker scans each turn's narrative text for entity mentions via a
//! pluggable [`Extractor`], then reconciles the candidates against the
//! document's entity manifest: seen entities transition toward `active`,
//! unseen ones decay toward `inactive`, and names that match nothing known
//! and nothing the patch introduces are surfaced as
//! [`UnresolvedEntityReference`] warnings for operator-level
//! reconciliation. The tracker never deletes manifest entries and never
//! reassigns an id to a different kind.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use chronicler_types::{EntityId, EntityKind, EntityManifest, Lifecycle, LifecycleEvent};

/// A pluggable candidate-name extraction strategy.
///
/// The tracker depends only on this interface; production deployments can
/// plug in a model-backed extractor, tests a scripted one.
pub trait Extractor {
    /// Extract candidate entity names from narrative text, in order of
    /// first appearance, without duplicates.
    fn extract(&self, text: &str) -> Vec<String>;
}

/// A capitalization-based extraction heuristic.
///
/// Collects runs of capitalized words (allowing `of`/`the` connectors
/// inside a run: "Lyra of the Vale"). A single capitalized word at a
/// sentence start is kept only when the same word also appears
/// capitalized mid-sentence somewhere in the text, which filters ordinary
/// sentence-initial words without losing real names.
#[derive(Debug, Clone, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    /// Create the default heuristic extractor.
    pub const fn new() -> Self {
        Self
    }
}

/// Words never treated as names on their own.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "after", "as", "before", "but", "he", "her", "his", "i", "it", "its",
    "my", "our", "she", "the", "their", "then", "they", "this", "that", "we", "when", "while",
    "you", "your",
];

/// Connector words allowed inside a multi-word name.
const CONNECTORS: &[&str] = &["of", "the", "and"];

impl Extractor for HeuristicExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        let tokens = tokenize(text);

        // Words seen capitalized mid-sentence; used to rescue
        // sentence-initial mentions of the same name.
        let mid_sentence: BTreeSet<&str> = tokens
            .iter()
            .filter(|t| !t.sentence_start && is_capitalized(&t.word))
            .map(|t| t.word.as_str())
            .collect();

        let mut candidates = Vec::new();
        let mut seen = BTreeSet::new();
        let mut i = 0;
        while i < tokens.len() {
            let Some(token) = tokens.get(i) else { break };
            if !is_capitalized(&token.word) {
                i = i.saturating_add(1);
                continue;
            }

            // Extend the run through capitalized words and connectors
            // followed by a capitalized word.
            let start = i;
            let mut end = i.saturating_add(1);
            loop {
                let Some(next) = tokens.get(end) else { break };
                if next.sentence_start {
                    break;
                }
                if is_capitalized(&next.word) {
                    end = end.saturating_add(1);
                    continue;
                }
                // A chain of connectors is part of the name only when a
                // capitalized word follows it ("Lyra of the Vale").
                let mut probe = end;
                while tokens.get(probe).is_some_and(|t| {
                    !t.sentence_start
                        && CONNECTORS.contains(&t.word.to_ascii_lowercase().as_str())
                }) {
                    probe = probe.saturating_add(1);
                }
                if probe > end
                    && tokens
                        .get(probe)
                        .is_some_and(|t| !t.sentence_start && is_capitalized(&t.word))
                {
                    end = probe.saturating_add(1);
                } else {
                    break;
                }
            }

            let run: Vec<&Token> = tokens.get(start..end).map(|s| s.iter().collect()).unwrap_or_default();
            i = end;

            let Some(phrase) = phrase_of(&run, &mid_sentence) else {
                continue;
            };
            if seen.insert(phrase.clone()) {
                candidates.push(phrase);
            }
        }
        candidates
    }
}

/// One cleaned word of narrative text.
#[derive(Debug)]
struct Token {
    word: String,
    sentence_start: bool,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut next_starts_sentence = true;
    for raw in text.split_whitespace() {
        let ends_sentence = raw.ends_with(['.', '!', '?', ':']);
        let word: String = raw
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
            .to_owned();
        if word.is_empty() {
            next_starts_sentence = next_starts_sentence || ends_sentence;
            continue;
        }
        tokens.push(Token { word, sentence_start: next_starts_sentence });
        next_starts_sentence = ends_sentence;
    }
    tokens
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

/// Turn a run of tokens into a candidate phrase, applying the stopword
/// and sentence-start filters. Returns `None` when the run is noise.
fn phrase_of(run: &[&Token], mid_sentence: &BTreeSet<&str>) -> Option<String> {
    // Strip leading stopwords so "The Old Mill" and a sentence-initial
    // "Then Lyra" both yield the name proper.
    let mut tokens = run;
    while let Some((first, rest)) = tokens.split_first() {
        if !rest.is_empty() && STOPWORDS.contains(&first.word.to_ascii_lowercase().as_str()) {
            tokens = rest;
        } else {
            break;
        }
    }

    let first = tokens.first()?;
    if tokens.len() == 1 {
        if STOPWORDS.contains(&first.word.to_ascii_lowercase().as_str()) {
            return None;
        }
        if first.sentence_start && !mid_sentence.contains(first.word.as_str()) {
            return None;
        }
    }
    Some(
        tokens
            .iter()
            .map(|t| t.word.as_str())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// A candidate name that matched no manifest entry and no patch
/// introduction. A warning, never a hard failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("unresolved entity reference {name:?} at turn {turn}")]
pub struct UnresolvedEntityReference {
    /// The candidate name, verbatim.
    pub name: String,
    /// The turn whose narrative mentioned it.
    pub turn: u64,
}

/// An entity the current patch introduces, passed to the tracker so that
/// narrative mentions of it do not read as unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Introduction {
    /// The new entity's id.
    pub id: EntityId,
    /// Display name for the manifest entry.
    pub display_name: String,
    /// Entity kind for the manifest entry.
    pub kind: EntityKind,
}

/// What one tracker pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerOutcome {
    /// Candidate names that resolved to nothing.
    pub unresolved: Vec<UnresolvedEntityReference>,
    /// Entities that appeared in this turn's scene.
    pub appeared: Vec<EntityId>,
    /// Entities newly added to the manifest this turn.
    pub introduced: Vec<EntityId>,
}

/// Reconcile extracted candidates and patch introductions against the
/// manifest, applying the lifecycle transition table.
pub fn reconcile_entities(
    manifest: &mut EntityManifest,
    candidates: &[String],
    introductions: &[Introduction],
    turn: u64,
) -> TrackerOutcome {
    let mut outcome = TrackerOutcome::default();

    // Patch introductions first, so mentions of them resolve below.
    for intro in introductions {
        if let Some(existing) = manifest.get(&intro.id) {
            if existing.kind != intro.kind {
                // Ids are never reassigned to a different kind.
                warn!(
                    id = %intro.id,
                    existing = ?existing.kind,
                    proposed = ?intro.kind,
                    "ignoring entity kind change; ids keep their kind"
                );
            }
        } else if manifest.introduce(intro.id.clone(), &intro.display_name, intro.kind, turn) {
            debug!(id = %intro.id, "introduced entity");
            outcome.introduced.push(intro.id.clone());
        }
    }

    // Resolve candidates to manifest ids.
    let mut seen: BTreeSet<EntityId> = BTreeSet::new();
    for candidate in candidates {
        let resolved = manifest
            .find_by_display_name(candidate)
            .cloned()
            .or_else(|| {
                EntityId::from_display_name(candidate)
                    .filter(|slug| manifest.get(slug).is_some())
            });
        match resolved {
            Some(id) => {
                seen.insert(id);
            }
            None => {
                warn!(name = %candidate, turn, "unresolved entity reference");
                outcome
                    .unresolved
                    .push(UnresolvedEntityReference { name: candidate.clone(), turn });
            }
        }
    }

    // Apply lifecycle events. Entities introduced this very turn keep
    // their `introduced` state until a later scene.
    let just_introduced: BTreeSet<&EntityId> = outcome.introduced.iter().collect();
    let all_ids: Vec<EntityId> = manifest.iter().map(|(id, _)| id.clone()).collect();
    for id in all_ids {
        if just_introduced.contains(&id) {
            continue;
        }
        let event = if seen.contains(&id) {
            LifecycleEvent::AppearsInScene
        } else {
            LifecycleEvent::AbsentThisTurn
        };
        let before = manifest.get(&id).map(|r| r.lifecycle);
        let after = manifest.apply_event(&id, event, turn);
        if before != after
            && let Some(state) = after
        {
            debug!(id = %id, ?state, "entity lifecycle transition");
        }
        if seen.contains(&id) && after != Some(Lifecycle::Departed) {
            outcome.appeared.push(id);
        }
    }

    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id(raw: &str) -> EntityId {
        EntityId::new(raw).unwrap()
    }

    #[test]
    fn extractor_finds_multiword_names() {
        let names = HeuristicExtractor::new()
            .extract("You meet Lyra of the Vale beside the Old Mill. She waves.");
        assert!(names.contains(&"Lyra of the Vale".to_owned()));
        assert!(names.contains(&"Old Mill".to_owned()));
    }

    #[test]
    fn extractor_skips_sentence_initial_common_words() {
        let names = HeuristicExtractor::new()
            .extract("Suddenly the door opens. Wind howls outside.");
        assert!(names.is_empty());
    }

    #[test]
    fn extractor_rescues_sentence_initial_names_seen_elsewhere() {
        let names =
            HeuristicExtractor::new().extract("Borin frowns. You nod at Borin and move on.");
        assert_eq!(names, vec!["Borin".to_owned()]);
    }

    #[test]
    fn extractor_strips_leading_stopword_from_a_run() {
        // A sentence-initial stopword before a name must not glue itself
        // onto the candidate.
        let names = HeuristicExtractor::new().extract("Then Borin speaks.");
        assert_eq!(names, vec!["Borin".to_owned()]);
    }

    #[test]
    fn extractor_deduplicates_in_first_appearance_order() {
        let names = HeuristicExtractor::new()
            .extract("You see Lyra near Borin. Then Lyra laughs at Borin.");
        assert_eq!(names, vec!["Lyra".to_owned(), "Borin".to_owned()]);
    }

    #[test]
    fn seen_entity_becomes_active() {
        let mut manifest = EntityManifest::default();
        manifest.introduce(id("npc_lyra"), "Lyra", EntityKind::Character, 1);

        let outcome =
            reconcile_entities(&mut manifest, &["Lyra".to_owned()], &[], 2);

        assert!(outcome.unresolved.is_empty());
        assert_eq!(outcome.appeared, vec![id("npc_lyra")]);
        let record = manifest.get(&id("npc_lyra")).unwrap();
        assert_eq!(record.lifecycle, Lifecycle::Active);
        assert_eq!(record.last_turn_seen, 2);
    }

    #[test]
    fn unseen_entity_decays_toward_inactive() {
        let mut manifest = EntityManifest::default();
        manifest.introduce(id("npc_lyra"), "Lyra", EntityKind::Character, 1);
        manifest.apply_event(&id("npc_lyra"), LifecycleEvent::AppearsInScene, 1);

        reconcile_entities(&mut manifest, &[], &[], 2);
        assert_eq!(manifest.get(&id("npc_lyra")).map(|r| r.lifecycle), Some(Lifecycle::Mentioned));

        reconcile_entities(&mut manifest, &[], &[], 3);
        assert_eq!(manifest.get(&id("npc_lyra")).map(|r| r.lifecycle), Some(Lifecycle::Inactive));
    }

    #[test]
    fn unknown_candidate_reported_not_fatal() {
        let mut manifest = EntityManifest::default();
        let outcome =
            reconcile_entities(&mut manifest, &["Strahd".to_owned()], &[], 5);
        assert_eq!(
            outcome.unresolved,
            vec![UnresolvedEntityReference { name: "Strahd".to_owned(), turn: 5 }]
        );
    }

    #[test]
    fn introduction_resolves_matching_candidate() {
        let mut manifest = EntityManifest::default();
        let intro = Introduction {
            id: id("npc_strahd"),
            display_name: "Strahd".to_owned(),
            kind: EntityKind::Character,
        };
        let outcome =
            reconcile_entities(&mut manifest, &["Strahd".to_owned()], &[intro], 5);
        assert!(outcome.unresolved.is_empty());
        assert_eq!(outcome.introduced, vec![id("npc_strahd")]);
        // Newly introduced entities wait for a later scene to go active.
        assert_eq!(
            manifest.get(&id("npc_strahd")).map(|r| r.lifecycle),
            Some(Lifecycle::Introduced)
        );
    }

    #[test]
    fn kind_is_never_reassigned() {
        let mut manifest = EntityManifest::default();
        manifest.introduce(id("vale"), "The Vale", EntityKind::Location, 1);
        let intro = Introduction {
            id: id("vale"),
            display_name: "Vale".to_owned(),
            kind: EntityKind::Item,
        };
        reconcile_entities(&mut manifest, &[], &[intro], 2);
        assert_eq!(manifest.get(&id("vale")).map(|r| r.kind), Some(EntityKind::Location));
    }

    #[test]
    fn departed_entities_never_resurface() {
        let mut manifest = EntityManifest::default();
        manifest.introduce(id("npc_goblin_1"), "Goblin", EntityKind::Character, 1);
        manifest.apply_event(&id("npc_goblin_1"), LifecycleEvent::DepartsPermanently, 1);

        let outcome =
            reconcile_entities(&mut manifest, &["Goblin".to_owned()], &[], 2);

        assert_eq!(
            manifest.get(&id("npc_goblin_1")).map(|r| r.lifecycle),
            Some(Lifecycle::Departed)
        );
        assert!(outcome.appeared.is_empty());
    }
}
