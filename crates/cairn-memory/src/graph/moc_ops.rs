//! Map-of-content generation.

use chrono::Utc;
use tracing::info;

use super::KnowledgeGraph;
use crate::error::{MemoryError, Result};
use crate::moc::{self, MocDocument};
use crate::traversal::{self, TraversalBudget};
use crate::types::{EntityId, Timestamp};

impl KnowledgeGraph {
    /// Generate a map of content rooted at `root`, stamped with the current time.
    pub fn generate_moc(
        &self,
        root: &EntityId,
        max_depth: usize,
        min_strength: f64,
        budget: &TraversalBudget,
    ) -> Result<MocDocument> {
        let now = Utc::now();
        self.lazy_decay(now);
        self.generate_moc_at(root, max_depth, min_strength, budget, now)
    }

    /// Generate a map of content using the configured depth and strength.
    pub fn generate_default_moc(&self, root: &EntityId, budget: &TraversalBudget) -> Result<MocDocument> {
        let config = self.moc_config();
        self.generate_moc(root, config.max_depth, config.min_strength, budget)
    }

    /// Generate a map of content stamped with `now`.
    ///
    /// Traversal and grouping run under one read lock, so the document
    /// reflects a single consistent state of the graph.
    pub fn generate_moc_at(
        &self,
        root: &EntityId,
        max_depth: usize,
        min_strength: f64,
        budget: &TraversalBudget,
        now: Timestamp,
    ) -> Result<MocDocument> {
        let state = self.read();
        let root_entity = state
            .entities
            .get(root)
            .ok_or_else(|| MemoryError::NotFound(format!("entity {}", root)))?;

        let cluster = traversal::connected_cluster(
            &state.entities,
            &state.relationships,
            root,
            max_depth,
            min_strength,
            budget,
        )?;

        let document = moc::synthesize(
            root_entity,
            &cluster,
            &state.entities,
            &state.relationships,
            self.moc_config().max_entries,
            now,
        );

        info!(
            root = %root,
            groups = document.groups.len(),
            entries = document.entry_count(),
            truncated = document.truncated,
            "Generated map of content"
        );
        Ok(document)
    }
}
