//! The knowledge graph facade.
//!
//! [`KnowledgeGraph`] owns the entity store, the relationship store and the
//! decay policy. Both stores sit behind a single `parking_lot::RwLock`, so
//! every mutation is serialized and every query sees a consistent view of
//! entities and relationships together.
//!
//! The API is split across submodules by concern:
//! - `entity_ops`: entity upsert/removal with inference and cascade
//! - `relationship_ops`: explicit relationship writes, reinforcement, decay
//! - `query_ops`: neighbors, traversal, path search, suggestions, stats
//! - `moc_ops`: map-of-content generation
//! - `persist_ops`: snapshot and restore
//! - `ingest_ops`: note records and note lifecycle events

mod entity_ops;
mod ingest_ops;
mod moc_ops;
mod persist_ops;
mod query_ops;
mod relationship_ops;

use std::sync::Arc;

use cairn_config::{InferenceConfig, MemoryConfig, MocConfig};
use chrono::Duration;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::entity_store::EntityStore;
use crate::error::Result;
use crate::policy::DecayPolicy;
use crate::relationship_store::RelationshipStore;
use crate::types::Timestamp;

pub use ingest_ops::EventOutcome;
pub use persist_ops::RestoreReport;
pub use query_ops::GraphStats;

/// Everything guarded by the graph lock.
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    pub(crate) entities: EntityStore,
    pub(crate) relationships: RelationshipStore,
    /// `now` of the most recent effective decay sweep.
    pub(crate) last_sweep_at: Option<Timestamp>,
}

struct GraphInner {
    state: RwLock<GraphState>,
    policy: Arc<DecayPolicy>,
    inference: InferenceConfig,
    moc: MocConfig,
    lazy_interval: Option<Duration>,
}

/// Thread-safe, cheaply cloneable handle to a knowledge graph.
#[derive(Clone)]
pub struct KnowledgeGraph {
    inner: Arc<GraphInner>,
}

impl KnowledgeGraph {
    /// Create an empty graph with default settings.
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(DecayPolicy::default()),
            InferenceConfig::default(),
            MocConfig::default(),
            None,
        )
    }

    /// Create an empty graph from configuration.
    ///
    /// Fails with `InvalidKind` when the decay table names a kind outside
    /// the vocabulary, and with `Config` when values are out of range.
    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        config.inference.validate()?;
        config.moc.validate()?;
        let policy = DecayPolicy::from_config(&config.decay)?;

        let lazy_interval = config
            .decay
            .lazy_interval_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds);

        info!(
            lazy_decay = lazy_interval.is_some(),
            label_threshold = config.inference.label_similarity_threshold,
            "Creating knowledge graph"
        );

        Ok(Self::with_parts(
            Arc::new(policy),
            config.inference.clone(),
            config.moc.clone(),
            lazy_interval,
        ))
    }

    /// Create an empty graph with an explicit policy and settings.
    pub fn with_parts(
        policy: Arc<DecayPolicy>,
        inference: InferenceConfig,
        moc: MocConfig,
        lazy_interval: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                state: RwLock::new(GraphState::default()),
                policy,
                inference,
                moc,
                lazy_interval,
            }),
        }
    }

    /// The decay policy in effect.
    pub fn policy(&self) -> &Arc<DecayPolicy> {
        &self.inner.policy
    }

    pub fn inference_config(&self) -> &InferenceConfig {
        &self.inner.inference
    }

    pub fn moc_config(&self) -> &MocConfig {
        &self.inner.moc
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.inner.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.inner.state.write()
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("KnowledgeGraph")
            .field("entities", &state.entities.len())
            .field("relationships", &state.relationships.len())
            .field("last_sweep_at", &state.last_sweep_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_config::KindDecayConfig;

    use crate::error::MemoryError;

    #[test]
    fn test_graph_is_send_sync_clone() {
        fn assert_bounds<T: Send + Sync + Clone>() {}
        assert_bounds::<KnowledgeGraph>();
    }

    #[test]
    fn test_from_config_rejects_unknown_kind() {
        let mut config = MemoryConfig::default();
        config
            .decay
            .kinds
            .insert("follows".to_string(), KindDecayConfig::default());

        let err = KnowledgeGraph::from_config(&config).unwrap_err();
        assert!(matches!(err, MemoryError::InvalidKind(ref k) if k == "follows"));
    }

    #[test]
    fn test_from_config_rejects_bad_threshold() {
        let mut config = MemoryConfig::default();
        config.inference.label_similarity_threshold = 2.0;
        assert!(matches!(
            KnowledgeGraph::from_config(&config),
            Err(MemoryError::Config(_))
        ));
    }

    #[test]
    fn test_clones_share_state() {
        let graph = KnowledgeGraph::new();
        let other = graph.clone();
        graph
            .upsert_entity(crate::types::EntityDraft::new("a", "Alpha"))
            .unwrap();
        assert!(other.get_entity(&"a".into()).is_ok());
    }
}
