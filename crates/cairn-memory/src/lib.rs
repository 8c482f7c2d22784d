//! Knowledge-graph memory for Cairn.
//!
//! This crate ingests notes into a graph of entities and typed, weighted
//! relationships, lets relationship strength decay over time, and
//! synthesizes Maps of Content (MOC) that summarize the cluster around an
//! entity.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  KnowledgeGraph (Clone, Send + Sync)                                    │
//! │  - RwLock<GraphState>: EntityStore + RelationshipStore + last sweep     │
//! │  - Arc<DecayPolicy>: per-kind half-life, minimum, boost, initial        │
//! │  - upsert → inference → relationship upsert (one write section)         │
//! │  - neighbors / connected_cluster / generate_moc (one read section)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//!          ▲                      ▲                        │
//!   NoteEvent / NoteRecord   DecayEngine (tokio)     GraphSnapshot → SnapshotStore (SQLite)
//! ```
//!
//! [`MemoryRuntime`] starts all of this from a discovered `cairn.toml`:
//! tracing, the graph restored from its snapshot, and the decay engine.
//!
//! # Usage
//!
//! ```no_run
//! use cairn_memory::{EntityDraft, KnowledgeGraph, NoteEvent, NoteRecord, TraversalBudget};
//!
//! let graph = KnowledgeGraph::new();
//!
//! let note = NoteRecord::parse("notes/tokio.md", "---\ntags: [rust]\n---\n# Tokio\n")?;
//! graph.apply_event(NoteEvent::Created(note))?;
//! graph.upsert_entity(EntityDraft::new("notes/async.md", "Async Rust").with_tag("rust"))?;
//!
//! let moc = graph.generate_moc(&"notes/async.md".into(), 2, 0.1, &TraversalBudget::unlimited())?;
//! println!("{}", moc.to_markdown()?);
//! # Ok::<(), cairn_memory::MemoryError>(())
//! ```
//!
//! # Relationship Kinds
//!
//! - `references`: a label or mention closely matches another entity's label
//! - `tagged-with`: entities share tags (undirected)
//! - `co-occurs`: entities were observed together (undirected)
//! - `derived-from`: an entity explicitly mentions another's id

pub mod decay;
pub mod entity_store;
pub mod error;
pub mod graph;
pub mod inference;
pub mod ingest;
pub mod moc;
pub mod policy;
pub mod relationship_store;
pub mod runtime;
pub mod similarity;
pub mod snapshot;
pub mod telemetry;
pub mod traversal;
pub mod types;

// Re-export error types
pub use error::{MemoryError, Result};

// Re-export the graph facade
pub use graph::{EventOutcome, GraphStats, KnowledgeGraph, RestoreReport};

// Re-export types
pub use types::{
    Entity, EntityDraft, EntityId, Reinforcement, Relationship, RelationshipId, RelationshipKind,
    Timestamp,
};

// Re-export components
pub use decay::{DecayEngine, DecayHandle, MAX_SWEEP_INTERVAL};
pub use inference::{Proposal, Suggestion};
pub use ingest::{FrontMatter, NoteEvent, NoteRecord};
pub use moc::{MocDocument, MocEntry, MocGroup};
pub use policy::{DecayPolicy, KindPolicy};
pub use relationship_store::SweepReport;
pub use runtime::MemoryRuntime;
pub use snapshot::{GraphSnapshot, SNAPSHOT_VERSION, SnapshotStore};
pub use telemetry::init_tracing;
pub use traversal::{Cluster, ClusterMember, GraphPath, PATH_LENGTH_PENALTY, TraversalBudget};

// Re-export the cancellation token used by budgets and the decay engine
pub use tokio_util::sync::CancellationToken;
