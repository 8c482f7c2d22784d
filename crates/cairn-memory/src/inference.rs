//! Relationship inference.
//!
//! Given a freshly upserted entity, proposes relationships to the rest of the
//! graph from three signals:
//!
//! - **Label matching**: the entity's label or one of its mentions closely
//!   matches another entity's label → `references` (new → existing).
//! - **Shared tags**: non-empty tag overlap → `tagged-with`, strength is the
//!   Jaccard overlap.
//! - **Explicit mentions**: a mention naming another entity → `derived-from`
//!   (new → mentioned). A mention names an entity when it equals the id, or
//!   failing that when its file stem matches the id's file stem ignoring
//!   case (`[[Tokio]]` names `notes/tokio.md`; ties go to the oldest entity,
//!   then the smallest id). Existing entities that mention the new entity get
//!   the reverse edge, so ingestion order does not matter.
//!
//! Inference only proposes. Proposals are applied by the graph through the
//! relationship store's upsert, so repeated inference reinforces.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use cairn_config::InferenceConfig;
use serde::Serialize;

use crate::entity_store::EntityStore;
use crate::similarity::{jaccard, label_similarity};
use crate::types::{Entity, EntityId, RelationshipKind};

/// Weight of label similarity in the connection suggestion score.
const SUGGESTION_LABEL_WEIGHT: f64 = 0.6;
/// Weight of tag overlap in the connection suggestion score.
const SUGGESTION_TAG_WEIGHT: f64 = 0.4;

/// A relationship the inference pass wants to create or reinforce.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationshipKind,
    /// Strength used when the relationship does not exist yet.
    pub initial_strength: f64,
    /// Raw signal score that produced the proposal.
    pub score: f64,
}

/// A ranked candidate for linking, without touching the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub id: EntityId,
    pub label: String,
    /// Combined score in [0, 1].
    pub score: f64,
    pub label_similarity: f64,
    pub tag_overlap: f64,
}

/// Propose relationships for `entity` against every other entity in `entities`.
pub fn infer(entity: &Entity, entities: &EntityStore, config: &InferenceConfig) -> Vec<Proposal> {
    let mut proposals = label_matches(entity, entities, config);
    proposals.extend(tag_matches(entity, entities, config));
    proposals.extend(mention_matches(entity, entities));
    proposals
}

/// Rank other entities as link candidates for `entity`.
pub fn suggest(
    entity: &Entity,
    entities: &EntityStore,
    config: &InferenceConfig,
    limit: usize,
) -> Vec<Suggestion> {
    let mut scored: Vec<(&Entity, Suggestion)> = others(entity, entities)
        .filter_map(|other| {
            let label = label_similarity(&entity.label, &other.label);
            let tags = jaccard(&entity.tags, &other.tags);
            let score = SUGGESTION_LABEL_WEIGHT * label + SUGGESTION_TAG_WEIGHT * tags;
            (score >= config.suggestion_threshold).then(|| {
                (
                    other,
                    Suggestion {
                        id: other.id.clone(),
                        label: other.label.clone(),
                        score,
                        label_similarity: label,
                        tag_overlap: tags,
                    },
                )
            })
        })
        .collect();

    scored.sort_by(|a, b| rank(a.1.score, a.0, b.1.score, b.0));
    scored.into_iter().take(limit).map(|(_, s)| s).collect()
}

fn label_matches(entity: &Entity, entities: &EntityStore, config: &InferenceConfig) -> Vec<Proposal> {
    let mut matches: Vec<(&Entity, f64)> = others(entity, entities)
        .filter_map(|other| {
            let best = std::iter::once(entity.label.as_str())
                .chain(entity.mentions.iter().map(String::as_str))
                .map(|probe| label_similarity(probe, &other.label))
                .fold(0.0_f64, f64::max);
            (best >= config.label_similarity_threshold).then_some((other, best))
        })
        .collect();

    matches.sort_by(|a, b| rank(a.1, a.0, b.1, b.0));
    matches.truncate(config.max_label_matches);

    matches
        .into_iter()
        .map(|(other, score)| Proposal {
            source: entity.id.clone(),
            target: other.id.clone(),
            kind: RelationshipKind::References,
            initial_strength: score,
            score,
        })
        .collect()
}

fn tag_matches(entity: &Entity, entities: &EntityStore, config: &InferenceConfig) -> Vec<Proposal> {
    if entity.tags.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<(&Entity, f64)> = others(entity, entities)
        .filter_map(|other| {
            let overlap = jaccard(&entity.tags, &other.tags);
            (overlap > 0.0 && overlap > config.min_tag_overlap).then_some((other, overlap))
        })
        .collect();
    matches.sort_by(|a, b| rank(a.1, a.0, b.1, b.0));

    matches
        .into_iter()
        .map(|(other, overlap)| Proposal {
            source: entity.id.clone(),
            target: other.id.clone(),
            kind: RelationshipKind::TaggedWith,
            initial_strength: overlap,
            score: overlap,
        })
        .collect()
}

fn mention_matches(entity: &Entity, entities: &EntityStore) -> Vec<Proposal> {
    let mut targets: HashSet<&EntityId> = HashSet::new();
    let mut explicit = Vec::new();
    for target in entity.mentions.iter().filter_map(|m| resolve_mention(m, entities)) {
        if target.id != entity.id && targets.insert(&target.id) {
            explicit.push(derived(&entity.id, &target.id));
        }
    }

    let own_stem = stem_key(entity.id.as_str());
    let mut backlinks: Vec<&Entity> = others(entity, entities)
        .filter(|other| {
            other.mentions.iter().any(|m| {
                (m.as_str() == entity.id.as_str() || stem_key(m) == own_stem)
                    && resolve_mention(m, entities).is_some_and(|hit| hit.id == entity.id)
            })
        })
        .collect();
    backlinks.sort_by(|a, b| by_age(a, b));

    explicit
        .into_iter()
        .chain(backlinks.into_iter().map(|other| derived(&other.id, &entity.id)))
        .collect()
}

/// The entity a mention names: exact id first, else the oldest entity whose
/// id has the same file stem ignoring case.
fn resolve_mention<'a>(mention: &str, entities: &'a EntityStore) -> Option<&'a Entity> {
    if let Some(exact) = entities.get(&EntityId::new(mention)) {
        return Some(exact);
    }
    let key = stem_key(mention);
    if key.is_empty() {
        return None;
    }
    entities
        .iter()
        .filter(|candidate| stem_key(candidate.id.as_str()) == key)
        .min_by(|a, b| by_age(a, b))
}

/// Lowercased file stem, `notes/Tokio.md` → `tokio`.
fn stem_key(name: &str) -> String {
    Path::new(name.trim())
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn derived(source: &EntityId, target: &EntityId) -> Proposal {
    Proposal {
        source: source.clone(),
        target: target.clone(),
        kind: RelationshipKind::DerivedFrom,
        initial_strength: 1.0,
        score: 1.0,
    }
}

fn others<'a>(entity: &'a Entity, entities: &'a EntityStore) -> impl Iterator<Item = &'a Entity> {
    entities.iter().filter(move |other| other.id != entity.id)
}

/// Higher score first, then earlier creation, then id.
fn rank(score_a: f64, a: &Entity, score_b: f64, b: &Entity) -> Ordering {
    score_b.total_cmp(&score_a).then_with(|| by_age(a, b))
}

fn by_age(a: &Entity, b: &Entity) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}
