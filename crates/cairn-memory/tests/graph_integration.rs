//! Integration tests for the knowledge graph.
//!
//! These drive the public API end to end: ingestion, inference, decay,
//! traversal, MOC generation and snapshot persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration as StdDuration;

use anyhow::Result;
use cairn_config::{DecayConfig, KindDecayConfig, MemoryConfig};
use cairn_memory::{
    CancellationToken, EntityDraft, EntityId, GraphSnapshot, KnowledgeGraph, MemoryError,
    NoteEvent, NoteRecord, Reinforcement, RelationshipKind, SnapshotStore, Timestamp,
    TraversalBudget,
};
use chrono::{DateTime, Duration, Utc};

fn t0() -> Timestamp {
    DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
        .map(|t| t.with_timezone(&Utc))
        .expect("valid timestamp")
}

fn id(s: &str) -> EntityId {
    EntityId::new(s)
}

/// Five entities with dissimilar labels and no tags, linked only by hand.
fn create_chain_graph(now: Timestamp) -> Result<KnowledgeGraph> {
    let graph = KnowledgeGraph::new();
    for (key, label) in [
        ("a", "Apples"),
        ("b", "Bridges"),
        ("c", "Clouds"),
        ("d", "Dynamos"),
        ("e", "Eclipses"),
    ] {
        graph.upsert_entity_at(EntityDraft::new(key, label), now)?;
    }
    for (source, target, kind, strength) in [
        ("a", "b", RelationshipKind::References, 0.9),
        ("b", "c", RelationshipKind::CoOccurs, 0.7),
        ("c", "a", RelationshipKind::DerivedFrom, 0.6),
        ("c", "d", RelationshipKind::TaggedWith, 0.5),
        ("d", "e", RelationshipKind::References, 0.4),
    ] {
        graph.upsert_relationship_at(
            &id(source),
            &id(target),
            kind,
            Reinforcement::WithStrength(strength),
            now,
        )?;
    }
    Ok(graph)
}

#[test]
fn test_shared_tag_infers_tagged_with() -> Result<()> {
    let graph = KnowledgeGraph::new();
    let now = t0();
    graph.upsert_entity_at(EntityDraft::new("a", "Apples").with_tag("x"), now)?;
    graph.upsert_entity_at(EntityDraft::new("b", "Bridges").with_tag("x"), now)?;
    graph.upsert_entity_at(EntityDraft::new("c", "Clouds").with_tag("y"), now)?;

    let a_rels = graph.relationships_of(&id("a"), None)?;
    assert_eq!(a_rels.len(), 1);
    assert_eq!(a_rels[0].kind, RelationshipKind::TaggedWith);
    assert_eq!(a_rels[0].other(&id("a")), Some(&id("b")));
    assert!(graph.relationships_of(&id("c"), None)?.is_empty());

    let cluster = graph.connected_cluster(&id("a"), 1, 0.1, &TraversalBudget::unlimited())?;
    let members: BTreeSet<&str> = cluster.ids().into_iter().map(EntityId::as_str).collect();
    assert_eq!(members, BTreeSet::from(["a", "b"]));
    Ok(())
}

#[test]
fn test_half_life_decay_and_prune() -> Result<()> {
    // Default co-occurs half-life is 7 days with a 0.05 floor.
    let graph = KnowledgeGraph::new();
    let start = t0();
    graph.upsert_entity_at(EntityDraft::new("a", "Apples"), start)?;
    graph.upsert_entity_at(EntityDraft::new("b", "Bridges"), start)?;
    let rel = graph.upsert_relationship_at(
        &id("a"),
        &id("b"),
        RelationshipKind::CoOccurs,
        Reinforcement::WithStrength(1.0),
        start,
    )?;
    let rel_id = rel.id();

    graph.decay_sweep_at(start + Duration::days(7));
    let strength = graph.get_relationship(&rel_id).map(|r| r.strength);
    assert!((strength.unwrap_or_default() - 0.5).abs() < 1e-9);

    graph.decay_sweep_at(start + Duration::days(14));
    let strength = graph.get_relationship(&rel_id).map(|r| r.strength);
    assert!((strength.unwrap_or_default() - 0.25).abs() < 1e-9);

    // 1.0 * 0.5^5 = 0.03125, under the floor.
    let report = graph.decay_sweep_at(start + Duration::days(35));
    assert_eq!(report.pruned, vec![rel_id.clone()]);
    assert!(graph.get_relationship(&rel_id).is_none());
    assert!(graph.contains_entity(&id("a")));
    assert!(graph.contains_entity(&id("b")));
    Ok(())
}

#[test]
fn test_removing_middle_of_chain_disconnects_ends() -> Result<()> {
    let graph = KnowledgeGraph::new();
    let now = t0();
    for (key, label) in [("a", "Apples"), ("b", "Bridges"), ("c", "Clouds")] {
        graph.upsert_entity_at(EntityDraft::new(key, label), now)?;
    }
    for (source, target) in [("a", "b"), ("b", "c")] {
        graph.upsert_relationship_at(
            &id(source),
            &id(target),
            RelationshipKind::References,
            Reinforcement::Observed,
            now,
        )?;
    }

    let removed = graph.remove_entity(&id("b"))?;
    assert_eq!(removed.len(), 2);

    let cluster = graph.connected_cluster(&id("a"), 1, 0.0, &TraversalBudget::unlimited())?;
    assert!(!cluster.contains(&id("c")));
    assert!(graph.neighbors(&id("a"), 0.0, None)?.is_empty());
    assert!(graph.neighbors(&id("c"), 0.0, None)?.is_empty());
    Ok(())
}

#[test]
fn test_cascade_leaves_no_dangling_relationships() -> Result<()> {
    let now = t0();
    let graph = create_chain_graph(now)?;
    let victim = id("c");

    graph.remove_entity(&victim)?;

    let snapshot = graph.snapshot_at(now);
    assert!(snapshot.entities.iter().all(|e| e.id != victim));
    assert!(
        snapshot
            .relationships
            .iter()
            .all(|r| r.source != victim && r.target != victim)
    );
    for rel in &snapshot.relationships {
        assert!(graph.contains_entity(&rel.source));
        assert!(graph.contains_entity(&rel.target));
    }
    Ok(())
}

#[test]
fn test_sweeps_never_increase_strength_and_repeat_is_noop() -> Result<()> {
    let start = t0();
    let graph = create_chain_graph(start)?;

    let before = graph.snapshot_at(start);
    graph.decay_sweep_at(start + Duration::days(3));
    let after = graph.snapshot_at(start);

    for rel in &after.relationships {
        let prior = before
            .relationships
            .iter()
            .find(|r| r.id() == rel.id())
            .map(|r| r.strength);
        assert!(prior.is_some_and(|p| rel.strength <= p));
    }

    let report = graph.decay_sweep_at(start + Duration::days(3));
    assert_eq!(report.decayed, 0);
    assert_eq!(report.pruned_count(), 0);
    assert_eq!(graph.snapshot_at(start).relationships, after.relationships);
    Ok(())
}

#[test]
fn test_repeated_observation_caps_at_one() -> Result<()> {
    let graph = KnowledgeGraph::new();
    let now = t0();
    graph.upsert_entity_at(EntityDraft::new("a", "Apples"), now)?;
    graph.upsert_entity_at(EntityDraft::new("b", "Bridges"), now)?;

    let mut last = 0.0;
    for step in 0..20 {
        let rel = graph.upsert_relationship_at(
            &id("a"),
            &id("b"),
            RelationshipKind::References,
            Reinforcement::Observed,
            now + Duration::minutes(step),
        )?;
        assert!(rel.strength >= last);
        assert!(rel.strength <= 1.0);
        last = rel.strength;
    }
    assert_eq!(last, 1.0);
    Ok(())
}

#[test]
fn test_cyclic_graph_traversal_terminates() -> Result<()> {
    let graph = create_chain_graph(t0())?;

    let cluster = graph.connected_cluster(&id("a"), 50, 0.0, &TraversalBudget::unlimited())?;
    assert_eq!(cluster.len(), 5);

    let unique: BTreeSet<&EntityId> = cluster.ids().into_iter().collect();
    assert_eq!(unique.len(), cluster.len());
    Ok(())
}

#[test]
fn test_cancelled_traversal() -> Result<()> {
    let graph = create_chain_graph(t0())?;
    let token = CancellationToken::new();
    token.cancel();
    let budget = TraversalBudget::unlimited().with_token(token);

    let err = graph
        .connected_cluster(&id("a"), 3, 0.0, &budget)
        .unwrap_err();
    assert!(matches!(err, MemoryError::Cancelled(_)));

    let err = graph
        .generate_moc(&id("a"), 3, 0.0, &TraversalBudget::unlimited().with_timeout(StdDuration::ZERO))
        .unwrap_err();
    assert!(matches!(err, MemoryError::Cancelled(_)));
    Ok(())
}

#[test]
fn test_moc_is_deterministic() -> Result<()> {
    let now = t0();
    let graph = create_chain_graph(now)?;
    let budget = TraversalBudget::unlimited();

    let first = graph.generate_moc_at(&id("a"), 2, 0.1, &budget, now)?;
    let second = graph.generate_moc_at(&id("a"), 2, 0.1, &budget, now)?;

    assert_eq!(first.to_markdown()?, second.to_markdown()?);
    assert_eq!(first.to_json()?, second.to_json()?);

    let markdown = first.to_markdown()?;
    assert!(markdown.starts_with("---\n"));
    assert!(markdown.contains("# Map of Content: Apples"));
    assert!(markdown.contains("[[b|Bridges]]"));
    assert!(markdown.contains("[[d|Dynamos]]"));
    // Depth 3 from the root.
    assert!(!markdown.contains("[[e|Eclipses]]"));
    Ok(())
}

#[test]
fn test_moc_for_isolated_entity_is_empty() -> Result<()> {
    let graph = KnowledgeGraph::new();
    let now = t0();
    graph.upsert_entity_at(EntityDraft::new("solo", "Solitude"), now)?;

    let moc = graph.generate_moc_at(&id("solo"), 2, 0.1, &TraversalBudget::unlimited(), now)?;
    assert!(moc.is_empty());
    assert!(moc.to_markdown()?.contains("_No related entries._"));
    Ok(())
}

#[test]
fn test_sqlite_snapshot_round_trip() -> Result<()> {
    let now = t0();
    let graph = create_chain_graph(now)?;
    graph.decay_sweep_at(now + Duration::days(1));

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("memory").join("graph.db");
    {
        let store = SnapshotStore::open(&path)?;
        graph.save_to(&store)?;
    }

    let store = SnapshotStore::open(&path)?;
    let restored = KnowledgeGraph::new();
    let report = restored.load_from(&store)?.expect("store has a snapshot");

    assert_eq!(report.entities, 5);
    assert_eq!(report.relationships, 5);
    assert!(report.dropped.is_empty());
    assert_eq!(restored.entities(), graph.entities());
    assert_eq!(
        restored.snapshot_at(now).relationships,
        graph.snapshot_at(now).relationships
    );
    assert_eq!(restored.last_sweep_at(), graph.last_sweep_at());
    Ok(())
}

#[test]
fn test_json_snapshot_round_trip() -> Result<()> {
    let now = t0();
    let graph = create_chain_graph(now)?;

    let json = graph.snapshot_at(now).to_json()?;
    let snapshot = GraphSnapshot::from_json(&json)?;

    let restored = KnowledgeGraph::new();
    restored.restore(snapshot)?;
    assert_eq!(restored.snapshot_at(now), graph.snapshot_at(now));
    Ok(())
}

#[test]
fn test_json_round_trip_keeps_decayed_strengths_exact() -> Result<()> {
    let start = t0();
    let graph = KnowledgeGraph::new();
    for i in 0..60 {
        graph.upsert_entity_at(EntityDraft::new(format!("n{i:02}"), format!("Node {i}")), start)?;
    }
    // Staggered creation times leave every edge with an unrelated decay factor.
    for i in 0..59 {
        graph.upsert_relationship_at(
            &EntityId::new(format!("n{i:02}")),
            &EntityId::new(format!("n{:02}", i + 1)),
            RelationshipKind::ALL[i % 4],
            Reinforcement::WithStrength(0.999 - i as f64 * 0.0037),
            start + Duration::seconds(i as i64 * 7919),
        )?;
    }
    graph.decay_sweep_at(start + Duration::days(9) + Duration::milliseconds(313));

    let original = graph.snapshot_at(start);
    let restored = GraphSnapshot::from_json(&original.to_json()?)?;
    for (before, after) in original.relationships.iter().zip(&restored.relationships) {
        assert_eq!(before.strength.to_bits(), after.strength.to_bits());
    }
    assert_eq!(restored, original);
    Ok(())
}

#[test]
fn test_empty_store_loads_nothing() -> Result<()> {
    let store = SnapshotStore::open_in_memory()?;
    assert!(KnowledgeGraph::new().load_from(&store)?.is_none());
    Ok(())
}

#[test]
fn test_unknown_kind_in_config_is_rejected() {
    let config = MemoryConfig {
        decay: DecayConfig {
            kinds: BTreeMap::from([("follows".to_string(), KindDecayConfig::default())]),
            ..Default::default()
        },
        ..Default::default()
    };

    let err = KnowledgeGraph::from_config(&config).unwrap_err();
    assert!(matches!(err, MemoryError::InvalidKind(ref kind) if kind == "follows"));
    assert!(matches!(
        "follows".parse::<RelationshipKind>(),
        Err(MemoryError::InvalidKind(_))
    ));
}

#[test]
fn test_configured_half_life_is_applied() -> Result<()> {
    let config = MemoryConfig {
        decay: DecayConfig {
            kinds: BTreeMap::from([(
                "references".to_string(),
                KindDecayConfig {
                    half_life_days: Some(1.0),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        },
        ..Default::default()
    };
    let graph = KnowledgeGraph::from_config(&config)?;
    let start = t0();
    graph.upsert_entity_at(EntityDraft::new("a", "Apples"), start)?;
    graph.upsert_entity_at(EntityDraft::new("b", "Bridges"), start)?;
    let rel = graph.upsert_relationship_at(
        &id("a"),
        &id("b"),
        RelationshipKind::References,
        Reinforcement::WithStrength(0.8),
        start,
    )?;

    graph.decay_sweep_at(start + Duration::days(1));
    let strength = graph.get_relationship(&rel.id()).map(|r| r.strength);
    assert!((strength.unwrap_or_default() - 0.4).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_note_events_build_graph() -> Result<()> {
    let graph = KnowledgeGraph::new();
    let now = t0();

    let runtime = NoteRecord::parse(
        "notes/tokio.md",
        "---\ntitle: Tokio Runtime\ntags: [rust, async]\n---\nExecutor internals.\n",
    )?;
    let guide = NoteRecord::parse(
        "notes/guide.md",
        "---\ntags: [\"#Rust\"]\n---\n# Async Guide\n\nBuilt on [[notes/tokio.md|the runtime]].\n",
    )?;
    assert_eq!(guide.label(), "Async Guide");

    graph.apply_event_at(NoteEvent::Created(runtime), now)?;
    graph.apply_event_at(NoteEvent::Created(guide), now)?;

    let rels = graph.relationships_of(&id("notes/guide.md"), None)?;
    let kinds: BTreeSet<RelationshipKind> = rels.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        BTreeSet::from([RelationshipKind::TaggedWith, RelationshipKind::DerivedFrom])
    );

    let derived = rels
        .iter()
        .find(|r| r.kind == RelationshipKind::DerivedFrom)
        .expect("derived-from relationship");
    assert_eq!(derived.source, id("notes/guide.md"));
    assert_eq!(derived.target, id("notes/tokio.md"));

    graph.apply_event_at(NoteEvent::Deleted(id("notes/tokio.md")), now)?;
    assert!(graph.relationships_of(&id("notes/guide.md"), None)?.is_empty());
    Ok(())
}

#[test]
fn test_concurrent_readers_and_writers() -> Result<()> {
    let graph = create_chain_graph(t0())?;

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let graph = graph.clone();
            scope.spawn(move || {
                for step in 0..25 {
                    let key = format!("w{}-{}", worker, step);
                    graph
                        .upsert_entity(EntityDraft::new(key.as_str(), key.as_str()))
                        .expect("upsert");
                    graph
                        .connected_cluster(&EntityId::new("a"), 3, 0.0, &TraversalBudget::unlimited())
                        .expect("cluster");
                }
            });
        }
    });

    assert_eq!(graph.stats().entities, 5 + 4 * 25);
    Ok(())
}
