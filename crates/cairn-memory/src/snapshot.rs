//! Durable graph snapshots.
//!
//! A [`GraphSnapshot`] is a plain serde value holding every entity and
//! relationship. It can be written as JSON or persisted to SQLite through
//! [`SnapshotStore`], which keeps exactly one snapshot and replaces it
//! wholesale on each save.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MemoryError, Result};
use crate::types::{Entity, Relationship, RelationshipKind, Timestamp};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Current SQLite schema version.
const SCHEMA_VERSION: i32 = 1;

/// Point-in-time copy of the whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub taken_at: Timestamp,
    pub last_sweep_at: Option<Timestamp>,
    /// Entities sorted by id.
    pub entities: Vec<Entity>,
    /// Relationships sorted by id.
    pub relationships: Vec<Relationship>,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub(crate) fn check_version(&self) -> Result<()> {
        if self.version > SNAPSHOT_VERSION {
            return Err(MemoryError::InvalidData(format!(
                "snapshot version {} is newer than supported version {}",
                self.version, SNAPSHOT_VERSION
            )));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite store
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed holder of a single graph snapshot.
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    /// Open or create a snapshot database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|_| {
                MemoryError::Database(rusqlite::Error::InvalidPath(path.to_path_buf()))
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        info!(path = %path.display(), "Snapshot store opened");
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if current_version >= SCHEMA_VERSION {
            debug!(version = current_version, "Snapshot schema up to date");
            return Ok(());
        }

        info!(from = current_version, to = SCHEMA_VERSION, "Creating snapshot schema");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                mentions TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS relationships (
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                kind TEXT NOT NULL,
                strength REAL NOT NULL,
                created_at TEXT NOT NULL,
                last_reinforced TEXT NOT NULL,
                last_decayed TEXT NOT NULL,
                reinforcement_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (source, target, kind)
            );
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Replace the stored snapshot.
    pub fn save(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute_batch("DELETE FROM relationships; DELETE FROM entities; DELETE FROM meta;")?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO entities (id, label, tags, mentions, created_at, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entity in &snapshot.entities {
                stmt.execute(params![
                    entity.id.as_str(),
                    entity.label,
                    serde_json::to_string(&entity.tags)?,
                    serde_json::to_string(&entity.mentions)?,
                    format_ts(&entity.created_at),
                    format_ts(&entity.modified_at),
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO relationships
                 (source, target, kind, strength, created_at, last_reinforced, last_decayed, reinforcement_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for rel in &snapshot.relationships {
                stmt.execute(params![
                    rel.source.as_str(),
                    rel.target.as_str(),
                    rel.kind.as_str(),
                    rel.strength,
                    format_ts(&rel.created_at),
                    format_ts(&rel.last_reinforced),
                    format_ts(&rel.last_decayed),
                    rel.reinforcement_count,
                ])?;
            }

            let mut stmt = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
            stmt.execute(params!["version", snapshot.version.to_string()])?;
            stmt.execute(params!["taken_at", format_ts(&snapshot.taken_at)])?;
            if let Some(ref last) = snapshot.last_sweep_at {
                stmt.execute(params!["last_sweep_at", format_ts(last)])?;
            }
        }

        tx.commit()?;
        info!(
            entities = snapshot.entities.len(),
            relationships = snapshot.relationships.len(),
            "Saved graph snapshot"
        );
        Ok(())
    }

    /// Load the stored snapshot, if one has been saved.
    pub fn load(&self) -> Result<Option<GraphSnapshot>> {
        let conn = self.conn.lock();

        let Some(taken_at) = get_meta(&conn, "taken_at")? else {
            return Ok(None);
        };
        let version = match get_meta(&conn, "version")? {
            Some(v) => v
                .parse::<u32>()
                .map_err(|e| MemoryError::InvalidData(format!("snapshot version {}: {}", v, e)))?,
            None => SNAPSHOT_VERSION,
        };
        let last_sweep_at = get_meta(&conn, "last_sweep_at")?
            .map(|s| parse_ts(&s))
            .transpose()?;

        let mut stmt = conn.prepare(
            "SELECT id, label, tags, mentions, created_at, modified_at FROM entities ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut entities = Vec::new();
        for row in rows {
            let (id, label, tags, mentions, created_at, modified_at) = row?;
            entities.push(Entity {
                id: id.into(),
                label,
                tags: serde_json::from_str(&tags)?,
                mentions: serde_json::from_str(&mentions)?,
                created_at: parse_ts(&created_at)?,
                modified_at: parse_ts(&modified_at)?,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT source, target, kind, strength, created_at, last_reinforced, last_decayed, reinforcement_count
             FROM relationships ORDER BY source, target, kind",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, u32>(7)?,
            ))
        })?;
        let mut relationships = Vec::new();
        for row in rows {
            let (source, target, kind, strength, created_at, last_reinforced, last_decayed, count) =
                row?;
            relationships.push(Relationship {
                source: source.into(),
                target: target.into(),
                kind: kind.parse::<RelationshipKind>()?,
                strength,
                created_at: parse_ts(&created_at)?,
                last_reinforced: parse_ts(&last_reinforced)?,
                last_decayed: parse_ts(&last_decayed)?,
                reinforcement_count: count,
            });
        }
        relationships.sort_by_key(|r| r.id());

        let snapshot = GraphSnapshot {
            version,
            taken_at: parse_ts(&taken_at)?,
            last_sweep_at,
            entities,
            relationships,
        };
        snapshot.check_version()?;
        debug!(entities = snapshot.entities.len(), "Loaded graph snapshot");
        Ok(Some(snapshot))
    }

    /// Delete the stored snapshot.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch("DELETE FROM relationships; DELETE FROM entities; DELETE FROM meta;")?;
        Ok(())
    }
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?)
}

fn format_ts(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(s: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::InvalidData(format!("timestamp {:?}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityId;
    use chrono::Duration;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn create_test_snapshot() -> GraphSnapshot {
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(1500);
        let tags: BTreeSet<String> = ["rust", "graph"].iter().map(|s| s.to_string()).collect();
        GraphSnapshot {
            version: SNAPSHOT_VERSION,
            taken_at: t1,
            last_sweep_at: Some(t1),
            entities: vec![
                Entity {
                    id: EntityId::new("a"),
                    label: "Alpha".to_string(),
                    tags: tags.clone(),
                    mentions: ["b".to_string()].into_iter().collect(),
                    created_at: t0,
                    modified_at: t1,
                },
                Entity {
                    id: EntityId::new("b"),
                    label: "Beta's \"quoted\" label".to_string(),
                    tags,
                    mentions: BTreeSet::new(),
                    created_at: t0,
                    modified_at: t0,
                },
            ],
            // Sorted by id: kind order follows declaration order.
            relationships: vec![
                Relationship {
                    source: "a".into(),
                    target: "b".into(),
                    kind: RelationshipKind::TaggedWith,
                    strength: 0.375,
                    created_at: t0,
                    last_reinforced: t0,
                    last_decayed: t1,
                    reinforcement_count: 0,
                },
                Relationship {
                    source: "a".into(),
                    target: "b".into(),
                    kind: RelationshipKind::DerivedFrom,
                    strength: 1.0,
                    created_at: t0,
                    last_reinforced: t1,
                    last_decayed: t0,
                    reinforcement_count: 2,
                },
            ],
        }
    }

    #[test]
    fn test_empty_store_loads_none() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_sqlite_roundtrip() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let snapshot = create_test_snapshot();
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_save_replaces_previous() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let mut snapshot = create_test_snapshot();
        store.save(&snapshot).unwrap();

        snapshot.entities.truncate(1);
        snapshot.relationships.clear();
        snapshot.last_sweep_at = None;
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.entities.len(), 1);
        assert!(loaded.relationships.is_empty());
        assert!(loaded.last_sweep_at.is_none());
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        let snapshot = create_test_snapshot();

        SnapshotStore::open(&path).unwrap().save(&snapshot).unwrap();
        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap().unwrap(), snapshot);

        reopened.clear().unwrap();
        assert!(reopened.load().unwrap().is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let snapshot = create_test_snapshot();
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"tagged-with\""));
        assert_eq!(GraphSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_json_rejects_future_version() {
        let mut snapshot = create_test_snapshot();
        snapshot.version = SNAPSHOT_VERSION + 1;
        let json = snapshot.to_json().unwrap();
        assert!(matches!(
            GraphSnapshot::from_json(&json),
            Err(MemoryError::InvalidData(_))
        ));
    }
}
