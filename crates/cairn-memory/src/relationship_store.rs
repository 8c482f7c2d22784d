//! Typed, weighted relationships with an adjacency index.
//!
//! Relationships live in a map keyed by [`RelationshipId`]; each endpoint has
//! an adjacency entry listing the ids of its incident relationships. The two
//! structures are kept in lockstep by every mutation in this module.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::policy::DecayPolicy;
use crate::types::{
    EntityId, Reinforcement, Relationship, RelationshipId, RelationshipKind, Timestamp,
};

/// Outcome of one decay sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Relationships looked at.
    pub examined: usize,
    /// Relationships whose strength was reduced and which survived.
    pub decayed: usize,
    /// Relationships removed for falling below their kind's minimum.
    pub pruned: Vec<RelationshipId>,
    /// Relationships left untouched because `now` preceded their decay anchor.
    pub skipped: usize,
}

impl SweepReport {
    pub fn pruned_count(&self) -> usize {
        self.pruned.len()
    }
}

/// Result of removing every relationship incident to an entity.
#[derive(Debug, Default)]
pub struct Cascade {
    /// Ids of the deleted relationships, sorted.
    pub removed: Vec<RelationshipId>,
    /// Index inconsistencies found and repaired along the way.
    pub repaired: Vec<String>,
}

/// Edges of the graph.
#[derive(Debug, Default, Clone)]
pub struct RelationshipStore {
    relationships: HashMap<RelationshipId, Relationship>,
    adjacency: HashMap<EntityId, BTreeSet<RelationshipId>>,
}

impl RelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────

    /// Create a relationship or reinforce the existing one with the same key.
    ///
    /// Existing relationships gain the kind's reinforcement boost, capped at
    /// 1.0. New ones start at the kind's initial strength, or at the strength
    /// carried by [`Reinforcement::WithStrength`].
    pub fn upsert(
        &mut self,
        source: EntityId,
        target: EntityId,
        kind: RelationshipKind,
        reinforcement: Reinforcement,
        now: Timestamp,
        policy: &DecayPolicy,
    ) -> Result<Relationship> {
        if source == target {
            return Err(MemoryError::InvalidData(format!(
                "self-relationship on {} is not allowed",
                source
            )));
        }
        if let Reinforcement::WithStrength(s) = reinforcement
            && s.is_nan()
        {
            return Err(MemoryError::InvalidData(format!(
                "strength for {} -> {} is NaN",
                source, target
            )));
        }

        let kind_policy = policy.for_kind(kind);
        let id = RelationshipId::new(source, target, kind);

        if let Some(existing) = self.relationships.get_mut(&id) {
            existing.strength = clamp_strength(existing.strength + kind_policy.reinforcement_boost);
            existing.last_reinforced = now;
            existing.reinforcement_count = existing.reinforcement_count.saturating_add(1);
            debug!(
                relationship = %id,
                strength = existing.strength,
                count = existing.reinforcement_count,
                "Reinforced relationship"
            );
            return Ok(existing.clone());
        }

        let strength = match reinforcement {
            Reinforcement::Observed => kind_policy.initial_strength,
            Reinforcement::WithStrength(s) => s,
        };
        let relationship = Relationship {
            source: id.source.clone(),
            target: id.target.clone(),
            kind,
            strength: clamp_strength(strength),
            created_at: now,
            last_reinforced: now,
            last_decayed: now,
            reinforcement_count: 0,
        };
        debug!(relationship = %id, strength = relationship.strength, "Created relationship");
        self.insert(relationship.clone());
        Ok(relationship)
    }

    /// Insert a relationship as-is, replacing any with the same key.
    pub fn insert(&mut self, relationship: Relationship) {
        let id = relationship.id();
        self.adjacency
            .entry(id.source.clone())
            .or_default()
            .insert(id.clone());
        self.adjacency
            .entry(id.target.clone())
            .or_default()
            .insert(id.clone());
        self.relationships.insert(id, relationship);
    }

    /// Remove one relationship and its index entries.
    pub fn remove(&mut self, id: &RelationshipId) -> Option<Relationship> {
        let removed = self.relationships.remove(id)?;
        self.unindex(&id.source, id);
        self.unindex(&id.target, id);
        Some(removed)
    }

    /// Remove every relationship incident to `entity`.
    ///
    /// Index entries pointing at missing relationships, and relationships
    /// missing from the opposite endpoint's index, are repaired and reported.
    pub fn remove_incident(&mut self, entity: &EntityId) -> Cascade {
        let mut cascade = Cascade::default();
        let Some(incident) = self.adjacency.remove(entity) else {
            return cascade;
        };

        for id in incident {
            if self.relationships.remove(&id).is_none() {
                cascade
                    .repaired
                    .push(format!("index of {} listed missing relationship {}", entity, id));
                continue;
            }
            if let Some(other) = id.other(entity)
                && !self.unindex(other, &id)
            {
                cascade
                    .repaired
                    .push(format!("relationship {} missing from index of {}", id, other));
            }
            cascade.removed.push(id);
        }

        cascade
    }

    /// Apply time-based decay to every relationship and prune the weak ones.
    ///
    /// `strength × 0.5^(elapsed / half_life)` with `elapsed` measured from the
    /// later of last reinforcement and last decay. A `now` at or before that
    /// anchor leaves the relationship untouched.
    pub fn decay_sweep(&mut self, now: Timestamp, policy: &DecayPolicy) -> SweepReport {
        let mut report = SweepReport::default();
        let mut doomed = Vec::new();

        for (id, relationship) in self.relationships.iter_mut() {
            report.examined += 1;

            let anchor = relationship.decay_anchor();
            if now <= anchor {
                if now < anchor {
                    report.skipped += 1;
                    debug!(relationship = %id, %now, %anchor, "Skipping decay, time moved backwards");
                }
                continue;
            }

            let kind_policy = policy.for_kind(relationship.kind);
            relationship.strength =
                clamp_strength(relationship.strength * kind_policy.decay_factor(now - anchor));
            relationship.last_decayed = now;

            if relationship.strength < kind_policy.min_strength {
                doomed.push(id.clone());
            } else {
                report.decayed += 1;
            }
        }

        doomed.sort();
        for id in &doomed {
            self.remove(id);
            debug!(relationship = %id, "Pruned relationship below minimum strength");
        }
        report.pruned = doomed;
        report
    }

    pub fn clear(&mut self) {
        self.relationships.clear();
        self.adjacency.clear();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────

    pub fn get(&self, id: &RelationshipId) -> Option<&Relationship> {
        self.relationships.get(id)
    }

    /// Incident relationships of `id` in both directions, strongest first,
    /// ties broken by relationship id.
    pub fn get_neighbors(
        &self,
        id: &EntityId,
        kind_filter: Option<RelationshipKind>,
    ) -> Vec<Relationship> {
        let mut found: Vec<Relationship> = self
            .incident(id)
            .filter(|r| kind_filter.is_none_or(|k| r.kind == k))
            .cloned()
            .collect();
        sort_by_strength(&mut found);
        found
    }

    /// Incident relationships in index order.
    pub fn incident<'a>(&'a self, id: &EntityId) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.adjacency
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.relationships.get(rid))
    }

    /// Every relationship between `a` and `b`, in either direction.
    pub fn between(&self, a: &EntityId, b: &EntityId) -> Vec<&Relationship> {
        self.incident(a)
            .filter(|r| r.other(a) == Some(b))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    /// Relationships sorted by id.
    pub fn sorted(&self) -> Vec<&Relationship> {
        let mut all: Vec<(&RelationshipId, &Relationship)> = self.relationships.iter().collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all.into_iter().map(|(_, r)| r).collect()
    }

    /// Number of relationships per kind.
    pub fn count_by_kind(&self) -> HashMap<RelationshipKind, usize> {
        let mut counts = HashMap::new();
        for relationship in self.relationships.values() {
            *counts.entry(relationship.kind).or_insert(0) += 1;
        }
        counts
    }

    fn unindex(&mut self, entity: &EntityId, id: &RelationshipId) -> bool {
        let Some(ids) = self.adjacency.get_mut(entity) else {
            return false;
        };
        let removed = ids.remove(id);
        if ids.is_empty() {
            self.adjacency.remove(entity);
        }
        removed
    }
}

fn clamp_strength(strength: f64) -> f64 {
    strength.clamp(0.0, 1.0)
}

/// Sort relationships by descending strength, then id.
pub(crate) fn sort_by_strength(relationships: &mut [Relationship]) {
    relationships.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| a.id().cmp(&b.id()))
    });
}
