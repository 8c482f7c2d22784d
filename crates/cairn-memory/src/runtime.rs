//! Starting a graph from discovered configuration.
//!
//! [`MemoryRuntime`] ties the pieces together: config discovery, tracing,
//! the snapshot store and the background decay engine. Shutting it down
//! stops the engine and persists the graph.

use std::path::Path;

use cairn_config::LoadedConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decay::{DecayEngine, DecayHandle};
use crate::error::Result;
use crate::graph::KnowledgeGraph;
use crate::snapshot::SnapshotStore;
use crate::telemetry::{env_filter, init_tracing};

/// A running graph with its persistence and decay engine.
pub struct MemoryRuntime {
    graph: KnowledgeGraph,
    store: Option<SnapshotStore>,
    decay: DecayHandle,
}

impl MemoryRuntime {
    /// Discover configuration for `project_dir`, install tracing and start.
    ///
    /// A tracing subscriber installed earlier by the host is left in place.
    /// Must be called from within a tokio runtime.
    pub fn bootstrap(project_dir: Option<&Path>, token: CancellationToken) -> Result<Self> {
        let loaded = cairn_config::load_config(project_dir)?;

        let logging = loaded.config.logging_or_default();
        env_filter(&logging)?;
        if let Err(e) = init_tracing(&logging) {
            debug!(error = %e, "Keeping existing tracing subscriber");
        }

        Self::start(&loaded, token)
    }

    /// Start from configuration that was already loaded.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(loaded: &LoadedConfig, token: CancellationToken) -> Result<Self> {
        for warning in &loaded.warnings {
            warn!(warning = %warning, "Config warning");
        }
        for path in loaded.loaded_from() {
            info!(path = %path.display(), "Loaded config");
        }

        let memory = loaded.config.memory_or_default();
        let (graph, store) = KnowledgeGraph::open(&memory)?;
        let decay = DecayEngine::spawn_from_config(graph.clone(), &memory.decay, token);

        Ok(Self {
            graph,
            store,
            decay,
        })
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn store(&self) -> Option<&SnapshotStore> {
        self.store.as_ref()
    }

    pub fn decay(&self) -> &DecayHandle {
        &self.decay
    }

    /// Persist the graph now. Returns `false` when no snapshot is configured.
    pub fn save(&self) -> Result<bool> {
        match &self.store {
            Some(store) => {
                self.graph.save_to(store)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop the decay engine, then persist the graph.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            graph,
            store,
            decay,
        } = self;
        decay.shutdown().await;
        if let Some(store) = store {
            graph.save_to(&store)?;
            info!(entities = graph.stats().entities, "Saved graph on shutdown");
        }
        Ok(())
    }
}
