//! Note ingestion into the graph.

use chrono::Utc;
use tracing::debug;

use super::KnowledgeGraph;
use crate::error::Result;
use crate::ingest::{NoteEvent, NoteRecord};
use crate::types::{Entity, EntityId, RelationshipId, Timestamp};

/// Effect of applying a [`NoteEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The note's entity was created or updated.
    Upserted(Entity),
    /// The note's entity was removed along with these relationships.
    Removed {
        id: EntityId,
        relationships: Vec<RelationshipId>,
    },
}

impl KnowledgeGraph {
    /// Upsert the entity for a note.
    pub fn ingest(&self, record: &NoteRecord) -> Result<Entity> {
        self.ingest_at(record, Utc::now())
    }

    /// [`ingest`](Self::ingest) at an explicit time.
    pub fn ingest_at(&self, record: &NoteRecord, now: Timestamp) -> Result<Entity> {
        self.upsert_entity_at(record.to_draft(), now)
    }

    /// Apply a note lifecycle event.
    pub fn apply_event(&self, event: NoteEvent) -> Result<EventOutcome> {
        self.apply_event_at(event, Utc::now())
    }

    /// [`apply_event`](Self::apply_event) at an explicit time.
    pub fn apply_event_at(&self, event: NoteEvent, now: Timestamp) -> Result<EventOutcome> {
        debug!(note_id = %event.id(), "Applying note event");
        match event {
            NoteEvent::Created(record) | NoteEvent::Updated(record) => {
                self.ingest_at(&record, now).map(EventOutcome::Upserted)
            }
            NoteEvent::Deleted(id) => {
                let relationships = self.remove_entity(&id)?;
                Ok(EventOutcome::Removed { id, relationships })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EventOutcome;
    use crate::graph::KnowledgeGraph;
    use crate::ingest::{NoteEvent, NoteRecord};
    use crate::types::RelationshipKind;

    #[test]
    fn test_events_drive_graph() {
        let graph = KnowledgeGraph::new();
        let tokio = NoteRecord::parse("tokio.md", "---\ntitle: Tokio\ntags: [rust]\n---\nRuntime.").unwrap();
        let async_note = NoteRecord::parse(
            "async.md",
            "---\ntitle: Async Rust\ntags: [rust]\n---\nUses [[Tokio]].",
        )
        .unwrap();

        graph.apply_event(NoteEvent::Created(tokio)).unwrap();
        graph.apply_event(NoteEvent::Created(async_note)).unwrap();

        let kinds: Vec<RelationshipKind> = graph
            .relationships_of(&"async.md".into(), None)
            .unwrap()
            .iter()
            .map(|r| r.kind)
            .collect();
        assert!(kinds.contains(&RelationshipKind::TaggedWith));
        assert!(kinds.contains(&RelationshipKind::References));
        assert!(kinds.contains(&RelationshipKind::DerivedFrom));

        let outcome = graph.apply_event(NoteEvent::Deleted("tokio.md".into())).unwrap();
        match outcome {
            EventOutcome::Removed { relationships, .. } => assert_eq!(relationships.len(), 3),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(graph.relationships_of(&"async.md".into(), None).unwrap().is_empty());
    }

    #[test]
    fn test_update_keeps_identity() {
        let graph = KnowledgeGraph::new();
        let v1 = NoteRecord::parse("n.md", "# First").unwrap();
        let v2 = NoteRecord::parse("n.md", "# Renamed").unwrap();

        let first = match graph.apply_event(NoteEvent::Created(v1)).unwrap() {
            EventOutcome::Upserted(e) => e,
            other => panic!("unexpected outcome: {:?}", other),
        };
        let second = match graph.apply_event(NoteEvent::Updated(v2)).unwrap() {
            EventOutcome::Upserted(e) => e,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.label, "Renamed");
    }

    #[test]
    fn test_delete_unknown_is_not_found() {
        let graph = KnowledgeGraph::new();
        assert!(graph.apply_event(NoteEvent::Deleted("nope".into())).is_err());
    }
}
