//! Entity storage keyed by stable identifier.

use std::collections::{BTreeSet, HashMap};

use crate::types::{Entity, EntityId, Timestamp};

/// Nodes of the graph.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    entities: HashMap<EntityId, Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update an entity.
    ///
    /// An existing entity keeps its id and `created_at`; label, tags and
    /// mentions are replaced and `modified_at` becomes `now`.
    pub fn upsert(
        &mut self,
        id: EntityId,
        label: String,
        tags: BTreeSet<String>,
        mentions: BTreeSet<String>,
        now: Timestamp,
    ) -> Entity {
        match self.entities.get_mut(&id) {
            Some(existing) => {
                existing.label = label;
                existing.tags = tags;
                existing.mentions = mentions;
                existing.modified_at = now;
                existing.clone()
            }
            None => {
                let entity = Entity {
                    id: id.clone(),
                    label,
                    tags,
                    mentions,
                    created_at: now,
                    modified_at: now,
                };
                self.entities.insert(id, entity.clone());
                entity
            }
        }
    }

    /// Insert a fully formed entity, replacing any entity with the same id.
    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate entities in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities sorted by id.
    pub fn sorted(&self) -> Vec<&Entity> {
        let mut entities: Vec<&Entity> = self.entities.values().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
