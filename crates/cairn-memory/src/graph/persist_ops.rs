//! Snapshot and restore.

use cairn_config::MemoryConfig;
use chrono::Utc;
use tracing::{info, warn};

use super::{GraphState, KnowledgeGraph};
use crate::error::{MemoryError, Result};
use crate::snapshot::{GraphSnapshot, SNAPSHOT_VERSION, SnapshotStore};
use crate::types::{Relationship, RelationshipId, Timestamp};

/// What a restore kept and what it had to drop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub entities: usize,
    pub relationships: usize,
    /// Relationships dropped for pointing at missing entities or at themselves.
    pub dropped: Vec<RelationshipId>,
}

impl KnowledgeGraph {
    /// Copy the whole graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Copy the whole graph, stamped with `taken_at`.
    pub fn snapshot_at(&self, taken_at: Timestamp) -> GraphSnapshot {
        let state = self.read();
        GraphSnapshot {
            version: SNAPSHOT_VERSION,
            taken_at,
            last_sweep_at: state.last_sweep_at,
            entities: state.entities.sorted().into_iter().cloned().collect(),
            relationships: state.relationships.sorted().into_iter().cloned().collect(),
        }
    }

    /// Replace the graph contents with a snapshot.
    ///
    /// Relationships whose endpoints are missing are dropped and logged.
    /// Strengths are clamped and symmetric endpoints normalized on the way in.
    pub fn restore(&self, snapshot: GraphSnapshot) -> Result<RestoreReport> {
        snapshot.check_version()?;

        let mut rebuilt = GraphState {
            last_sweep_at: snapshot.last_sweep_at,
            ..Default::default()
        };
        for entity in snapshot.entities {
            rebuilt.entities.insert(entity);
        }

        let mut report = RestoreReport::default();
        for relationship in snapshot.relationships {
            match normalize(relationship, &rebuilt) {
                Ok(relationship) => rebuilt.relationships.insert(relationship),
                Err((id, err)) => {
                    warn!(relationship = %id, error = %err, "Dropping relationship from snapshot");
                    report.dropped.push(id);
                }
            }
        }
        report.entities = rebuilt.entities.len();
        report.relationships = rebuilt.relationships.len();

        *self.write() = rebuilt;

        info!(
            entities = report.entities,
            relationships = report.relationships,
            dropped = report.dropped.len(),
            "Restored graph from snapshot"
        );
        Ok(report)
    }

    /// Build a graph from configuration and restore it from the configured
    /// snapshot file.
    ///
    /// When `config.snapshot` is unset the graph starts empty and no store is
    /// returned. A missing snapshot file is created empty.
    pub fn open(config: &MemoryConfig) -> Result<(Self, Option<SnapshotStore>)> {
        let graph = Self::from_config(config)?;
        let Some(path) = config.snapshot.as_deref() else {
            info!("No snapshot configured, graph is in-memory only");
            return Ok((graph, None));
        };

        let store = SnapshotStore::open(path)?;
        match graph.load_from(&store)? {
            Some(report) => info!(
                path = %path.display(),
                entities = report.entities,
                relationships = report.relationships,
                "Loaded graph snapshot"
            ),
            None => info!(path = %path.display(), "Snapshot store is empty, starting fresh"),
        }
        Ok((graph, Some(store)))
    }

    /// Write a snapshot of the graph to `store`, replacing what was there.
    pub fn save_to(&self, store: &SnapshotStore) -> Result<()> {
        store.save(&self.snapshot())
    }

    /// Restore the graph from `store`. Returns `None` when the store is empty.
    pub fn load_from(&self, store: &SnapshotStore) -> Result<Option<RestoreReport>> {
        match store.load()? {
            Some(snapshot) => self.restore(snapshot).map(Some),
            None => Ok(None),
        }
    }
}

fn normalize(
    mut relationship: Relationship,
    state: &GraphState,
) -> std::result::Result<Relationship, (RelationshipId, MemoryError)> {
    let id = RelationshipId::new(
        relationship.source.clone(),
        relationship.target.clone(),
        relationship.kind,
    );

    if id.source == id.target {
        let err = MemoryError::InvalidData(format!("self-relationship {}", id));
        return Err((id, err));
    }
    let missing = [&id.source, &id.target]
        .into_iter()
        .find(|endpoint| !state.entities.contains(endpoint))
        .cloned();
    if let Some(endpoint) = missing {
        let err = MemoryError::InconsistentState(format!(
            "relationship {} references missing entity {}",
            id, endpoint
        ));
        return Err((id, err));
    }
    if relationship.strength.is_nan() {
        let err = MemoryError::InvalidData(format!("relationship {} has NaN strength", id));
        return Err((id, err));
    }

    relationship.source = id.source;
    relationship.target = id.target;
    relationship.strength = relationship.strength.clamp(0.0, 1.0);
    Ok(relationship)
}
