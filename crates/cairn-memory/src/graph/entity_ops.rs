//! Entity operations.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::KnowledgeGraph;
use crate::error::{MemoryError, Result};
use crate::inference;
use crate::types::{Entity, EntityDraft, EntityId, Reinforcement, RelationshipId, Timestamp};

impl KnowledgeGraph {
    /// Insert or update an entity, then infer and apply its relationships.
    pub fn upsert_entity(&self, draft: EntityDraft) -> Result<Entity> {
        self.upsert_entity_at(draft, Utc::now())
    }

    /// [`upsert_entity`](Self::upsert_entity) at an explicit time.
    ///
    /// Inference runs inside the same write section as the entity update, so
    /// readers never see the entity without its inferred relationships.
    pub fn upsert_entity_at(&self, draft: EntityDraft, now: Timestamp) -> Result<Entity> {
        if draft.id.as_str().is_empty() {
            return Err(MemoryError::InvalidData(
                "entity id must not be empty".to_string(),
            ));
        }

        let mut state = self.write();
        let entity = state
            .entities
            .upsert(draft.id, draft.label, draft.tags, draft.mentions, now);

        let proposals = inference::infer(&entity, &state.entities, self.inference_config());
        let mut applied = 0;
        for proposal in proposals {
            state.relationships.upsert(
                proposal.source,
                proposal.target,
                proposal.kind,
                Reinforcement::WithStrength(proposal.initial_strength),
                now,
                self.policy(),
            )?;
            applied += 1;
        }

        debug!(
            entity_id = %entity.id,
            label = %entity.label,
            inferred = applied,
            "Upserted entity"
        );
        Ok(entity)
    }

    /// Fetch an entity by id.
    pub fn get_entity(&self, id: &EntityId) -> Result<Entity> {
        self.read()
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(format!("entity {}", id)))
    }

    /// Whether an entity exists.
    pub fn contains_entity(&self, id: &EntityId) -> bool {
        self.read().entities.contains(id)
    }

    /// All entities sorted by id.
    pub fn entities(&self) -> Vec<Entity> {
        self.read().entities.sorted().into_iter().cloned().collect()
    }

    /// Remove an entity and every relationship incident to it.
    ///
    /// Returns the ids of the removed relationships so callers can invalidate
    /// anything derived from them.
    pub fn remove_entity(&self, id: &EntityId) -> Result<Vec<RelationshipId>> {
        let mut state = self.write();
        if !state.entities.contains(id) {
            return Err(MemoryError::NotFound(format!("entity {}", id)));
        }

        state.entities.remove(id);
        let cascade = state.relationships.remove_incident(id);
        for problem in &cascade.repaired {
            let err = MemoryError::InconsistentState(problem.clone());
            warn!(entity_id = %id, error = %err, "Repaired index during removal");
        }

        info!(
            entity_id = %id,
            relationships = cascade.removed.len(),
            "Removed entity"
        );
        Ok(cascade.removed)
    }
}
