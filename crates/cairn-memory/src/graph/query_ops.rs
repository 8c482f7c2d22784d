//! Read-only queries.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use super::KnowledgeGraph;
use crate::error::{MemoryError, Result};
use crate::inference::{self, Suggestion};
use crate::traversal::{self, Cluster, GraphPath, TraversalBudget};
use crate::types::{Entity, EntityId, Relationship, RelationshipId, RelationshipKind, Timestamp};

/// Summary counts for the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub entities: usize,
    pub relationships: usize,
    /// Relationship counts keyed by kind name.
    pub by_kind: BTreeMap<String, usize>,
    /// Mean strength over all relationships, 0.0 when there are none.
    pub mean_strength: f64,
    pub last_sweep_at: Option<Timestamp>,
}

impl KnowledgeGraph {
    /// Distinct neighbors of `id` over edges at least `min_strength` strong.
    pub fn neighbors(
        &self,
        id: &EntityId,
        min_strength: f64,
        kind_filter: Option<RelationshipKind>,
    ) -> Result<Vec<Entity>> {
        self.lazy_decay(Utc::now());
        let state = self.read();
        traversal::neighbors(
            &state.entities,
            &state.relationships,
            id,
            min_strength,
            kind_filter,
        )
    }

    /// Incident relationships of `id`, strongest first.
    pub fn relationships_of(
        &self,
        id: &EntityId,
        kind_filter: Option<RelationshipKind>,
    ) -> Result<Vec<Relationship>> {
        self.lazy_decay(Utc::now());
        let state = self.read();
        if !state.entities.contains(id) {
            return Err(MemoryError::NotFound(format!("entity {}", id)));
        }
        Ok(state.relationships.get_neighbors(id, kind_filter))
    }

    /// Look up one relationship; symmetric ids may be given in either order.
    pub fn get_relationship(&self, id: &RelationshipId) -> Option<Relationship> {
        let id = RelationshipId::new(id.source.clone(), id.target.clone(), id.kind);
        self.read().relationships.get(&id).cloned()
    }

    /// Bounded breadth-first cluster around `root`.
    pub fn connected_cluster(
        &self,
        root: &EntityId,
        max_depth: usize,
        min_strength: f64,
        budget: &TraversalBudget,
    ) -> Result<Cluster> {
        self.lazy_decay(Utc::now());
        let state = self.read();
        traversal::connected_cluster(
            &state.entities,
            &state.relationships,
            root,
            max_depth,
            min_strength,
            budget,
        )
    }

    /// Simple paths from `from` to `to` of at most `max_depth` hops, strongest first.
    pub fn find_paths(
        &self,
        from: &EntityId,
        to: &EntityId,
        max_depth: usize,
        min_strength: f64,
        budget: &TraversalBudget,
    ) -> Result<Vec<GraphPath>> {
        self.lazy_decay(Utc::now());
        let state = self.read();
        traversal::find_paths(
            &state.entities,
            &state.relationships,
            from,
            to,
            max_depth,
            min_strength,
            budget,
        )
    }

    /// Rank other entities as link candidates for `id` without modifying the graph.
    pub fn suggest_connections(&self, id: &EntityId, limit: usize) -> Result<Vec<Suggestion>> {
        let state = self.read();
        let entity = state
            .entities
            .get(id)
            .ok_or_else(|| MemoryError::NotFound(format!("entity {}", id)))?;
        Ok(inference::suggest(
            entity,
            &state.entities,
            self.inference_config(),
            limit,
        ))
    }

    /// Summary counts.
    pub fn stats(&self) -> GraphStats {
        let state = self.read();
        let relationships = state.relationships.len();
        let total: f64 = state.relationships.iter().map(|r| r.strength).sum();

        GraphStats {
            entities: state.entities.len(),
            relationships,
            by_kind: state
                .relationships
                .count_by_kind()
                .into_iter()
                .map(|(kind, count)| (kind.as_str().to_string(), count))
                .collect(),
            mean_strength: if relationships == 0 {
                0.0
            } else {
                total / relationships as f64
            },
            last_sweep_at: state.last_sweep_at,
        }
    }
}
