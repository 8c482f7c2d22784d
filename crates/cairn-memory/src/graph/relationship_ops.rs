//! Relationship writes, reinforcement and decay.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::KnowledgeGraph;
use crate::error::{MemoryError, Result};
use crate::relationship_store::SweepReport;
use crate::types::{
    EntityId, Reinforcement, Relationship, RelationshipId, RelationshipKind, Timestamp,
};

impl KnowledgeGraph {
    /// Create or reinforce a relationship between two existing entities.
    pub fn upsert_relationship(
        &self,
        source: &EntityId,
        target: &EntityId,
        kind: RelationshipKind,
        reinforcement: Reinforcement,
    ) -> Result<Relationship> {
        self.upsert_relationship_at(source, target, kind, reinforcement, Utc::now())
    }

    /// [`upsert_relationship`](Self::upsert_relationship) at an explicit time.
    pub fn upsert_relationship_at(
        &self,
        source: &EntityId,
        target: &EntityId,
        kind: RelationshipKind,
        reinforcement: Reinforcement,
        now: Timestamp,
    ) -> Result<Relationship> {
        let mut state = self.write();
        for endpoint in [source, target] {
            if !state.entities.contains(endpoint) {
                return Err(MemoryError::NotFound(format!("entity {}", endpoint)));
            }
        }
        state.relationships.upsert(
            source.clone(),
            target.clone(),
            kind,
            reinforcement,
            now,
            self.policy(),
        )
    }

    /// Remove a single relationship.
    pub fn remove_relationship(&self, id: &RelationshipId) -> Result<Relationship> {
        let id = RelationshipId::new(id.source.clone(), id.target.clone(), id.kind);
        self.write()
            .relationships
            .remove(&id)
            .ok_or_else(|| MemoryError::NotFound(format!("relationship {}", id)))
    }

    /// Reinforce every relationship incident to an entity, as when the entity
    /// is accessed or recalled.
    pub fn reinforce_entity(&self, id: &EntityId) -> Result<Vec<Relationship>> {
        self.reinforce_entity_at(id, Utc::now())
    }

    /// [`reinforce_entity`](Self::reinforce_entity) at an explicit time.
    pub fn reinforce_entity_at(&self, id: &EntityId, now: Timestamp) -> Result<Vec<Relationship>> {
        let mut state = self.write();
        if !state.entities.contains(id) {
            return Err(MemoryError::NotFound(format!("entity {}", id)));
        }

        let incident: Vec<RelationshipId> = state.relationships.incident(id).map(|r| r.id()).collect();
        let mut reinforced = Vec::with_capacity(incident.len());
        for rid in incident {
            reinforced.push(state.relationships.upsert(
                rid.source,
                rid.target,
                rid.kind,
                Reinforcement::Observed,
                now,
                self.policy(),
            )?);
        }

        debug!(entity_id = %id, reinforced = reinforced.len(), "Reinforced entity");
        Ok(reinforced)
    }

    /// Record that a set of entities was observed together.
    ///
    /// Every pair gets a `co-occurs` relationship created or reinforced.
    /// Unknown ids and duplicates are ignored.
    pub fn observe_co_occurrence(&self, ids: &[EntityId]) -> Result<Vec<Relationship>> {
        self.observe_co_occurrence_at(ids, Utc::now())
    }

    /// [`observe_co_occurrence`](Self::observe_co_occurrence) at an explicit time.
    pub fn observe_co_occurrence_at(
        &self,
        ids: &[EntityId],
        now: Timestamp,
    ) -> Result<Vec<Relationship>> {
        let mut state = self.write();
        let mut present: Vec<&EntityId> = ids.iter().filter(|id| state.entities.contains(id)).collect();
        present.sort();
        present.dedup();

        let mut observed = Vec::new();
        for (i, a) in present.iter().enumerate() {
            for b in &present[i + 1..] {
                observed.push(state.relationships.upsert(
                    (*a).clone(),
                    (*b).clone(),
                    RelationshipKind::CoOccurs,
                    Reinforcement::Observed,
                    now,
                    self.policy(),
                )?);
            }
        }
        Ok(observed)
    }

    /// Decay every relationship to the current time.
    pub fn decay_sweep(&self) -> SweepReport {
        self.decay_sweep_at(Utc::now())
    }

    /// Decay every relationship to `now`.
    ///
    /// A `now` earlier than the previous sweep leaves the graph untouched.
    pub fn decay_sweep_at(&self, now: Timestamp) -> SweepReport {
        let mut state = self.write();
        if let Some(last) = state.last_sweep_at
            && now < last
        {
            warn!(%now, last_sweep_at = %last, "Ignoring decay sweep earlier than the previous one");
            return SweepReport {
                examined: state.relationships.len(),
                skipped: state.relationships.len(),
                ..Default::default()
            };
        }

        let report = state.relationships.decay_sweep(now, self.policy());
        state.last_sweep_at = Some(now);

        info!(
            examined = report.examined,
            decayed = report.decayed,
            pruned = report.pruned_count(),
            skipped = report.skipped,
            "Decay sweep complete"
        );
        report
    }

    /// Time of the most recent decay sweep.
    pub fn last_sweep_at(&self) -> Option<Timestamp> {
        self.read().last_sweep_at
    }

    /// Run a sweep first when lazy decay is enabled and the last sweep is stale.
    pub(crate) fn lazy_decay(&self, now: Timestamp) {
        let Some(interval) = self.inner.lazy_interval else {
            return;
        };
        let stale = match self.read().last_sweep_at {
            Some(last) => now - last >= interval,
            None => true,
        };
        if stale {
            debug!(%now, "Running lazy decay sweep");
            self.decay_sweep_at(now);
        }
    }
}
