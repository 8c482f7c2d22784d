//! Core graph types: entities, relationship kinds, and relationships.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Timestamp type used throughout the graph.
pub type Timestamp = DateTime<Utc>;

// ─────────────────────────────────────────────────────────────────────────────
// Entity
// ─────────────────────────────────────────────────────────────────────────────

/// Stable identifier of an entity, unchanged when the underlying note is renamed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&EntityId> for EntityId {
    fn from(id: &EntityId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A node derived from one ingested note or external content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Immutable identifier.
    pub id: EntityId,
    /// Display label (usually the note title).
    pub label: String,
    /// Tags from front-matter.
    pub tags: BTreeSet<String>,
    /// References to other entities extracted from content (ids or labels).
    pub mentions: BTreeSet<String>,
    /// When the entity was first ingested.
    pub created_at: Timestamp,
    /// When the entity was last updated.
    pub modified_at: Timestamp,
}

/// Input for creating or updating an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDraft {
    pub id: EntityId,
    pub label: String,
    pub tags: BTreeSet<String>,
    pub mentions: BTreeSet<String>,
}

impl EntityDraft {
    pub fn new(id: impl Into<EntityId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            tags: BTreeSet::new(),
            mentions: BTreeSet::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_mention(mut self, mention: impl Into<String>) -> Self {
        self.mentions.insert(mention.into());
        self
    }

    pub fn with_mentions<I, S>(mut self, mentions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mentions.extend(mentions.into_iter().map(Into::into));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relationship Kind
// ─────────────────────────────────────────────────────────────────────────────

/// Closed vocabulary of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    /// Label or mention of one entity closely matches another's label.
    References,
    /// Entities share one or more tags.
    TaggedWith,
    /// Entities were observed together.
    CoOccurs,
    /// Source explicitly mentions the target's identifier.
    DerivedFrom,
}

impl RelationshipKind {
    /// Every kind, in declaration order.
    pub const ALL: [RelationshipKind; 4] = [
        Self::References,
        Self::TaggedWith,
        Self::CoOccurs,
        Self::DerivedFrom,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::References => "references",
            Self::TaggedWith => "tagged-with",
            Self::CoOccurs => "co-occurs",
            Self::DerivedFrom => "derived-from",
        }
    }

    /// Whether (a, b) and (b, a) denote the same relationship.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::TaggedWith | Self::CoOccurs)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MemoryError::InvalidKind(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relationship
// ─────────────────────────────────────────────────────────────────────────────

/// Unique key of a relationship.
///
/// For symmetric kinds the endpoints are stored in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationshipKind,
}

impl RelationshipId {
    /// Build a key, normalizing endpoint order for symmetric kinds.
    pub fn new(source: EntityId, target: EntityId, kind: RelationshipKind) -> Self {
        if kind.is_symmetric() && target < source {
            Self {
                source: target,
                target: source,
                kind,
            }
        } else {
            Self {
                source,
                target,
                kind,
            }
        }
    }

    /// Whether the entity is one of the endpoints.
    pub fn touches(&self, id: &EntityId) -> bool {
        &self.source == id || &self.target == id
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other(&self, id: &EntityId) -> Option<&EntityId> {
        if &self.source == id {
            Some(&self.target)
        } else if &self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_symmetric() {
            write!(f, "{} -[{}]- {}", self.source, self.kind, self.target)
        } else {
            write!(f, "{} -[{}]-> {}", self.source, self.kind, self.target)
        }
    }
}

/// A typed, weighted edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationshipKind,
    /// Strength in [0, 1].
    pub strength: f64,
    /// When the relationship was first observed.
    pub created_at: Timestamp,
    /// Last time the relationship was observed again.
    pub last_reinforced: Timestamp,
    /// Time up to which decay has been applied.
    pub last_decayed: Timestamp,
    /// Number of observations after the first.
    pub reinforcement_count: u32,
}

impl Relationship {
    /// The unique key of this relationship.
    pub fn id(&self) -> RelationshipId {
        RelationshipId {
            source: self.source.clone(),
            target: self.target.clone(),
            kind: self.kind,
        }
    }

    /// Timestamp from which the next decay step is measured.
    pub fn decay_anchor(&self) -> Timestamp {
        self.last_reinforced.max(self.last_decayed)
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other(&self, id: &EntityId) -> Option<&EntityId> {
        if &self.source == id {
            Some(&self.target)
        } else if &self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// How an observation of a relationship contributes strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reinforcement {
    /// A single observation; new relationships start at the kind's initial strength.
    Observed,
    /// An observation that carries its own initial strength for new relationships.
    WithStrength(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_names() {
        for kind in RelationshipKind::ALL {
            assert_eq!(kind.as_str().parse::<RelationshipKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_unknown_kind_is_invalid_kind() {
        let err = "supports".parse::<RelationshipKind>().unwrap_err();
        assert!(matches!(err, MemoryError::InvalidKind(ref k) if k == "supports"));
    }

    #[test]
    fn test_symmetric_ids_are_normalized() {
        let ab = RelationshipId::new("a".into(), "b".into(), RelationshipKind::TaggedWith);
        let ba = RelationshipId::new("b".into(), "a".into(), RelationshipKind::TaggedWith);
        assert_eq!(ab, ba);

        let directed = RelationshipId::new("b".into(), "a".into(), RelationshipKind::DerivedFrom);
        assert_eq!(directed.source.as_str(), "b");
        assert_eq!(directed.target.as_str(), "a");
    }

    #[test]
    fn test_other_endpoint() {
        let id = RelationshipId::new("a".into(), "b".into(), RelationshipKind::References);
        assert_eq!(id.other(&"a".into()).map(EntityId::as_str), Some("b"));
        assert_eq!(id.other(&"b".into()).map(EntityId::as_str), Some("a"));
        assert!(id.other(&"c".into()).is_none());
    }

    #[test]
    fn test_display() {
        let id = RelationshipId::new("b".into(), "a".into(), RelationshipKind::CoOccurs);
        assert_eq!(id.to_string(), "a -[co-occurs]- b");
        let id = RelationshipId::new("a".into(), "b".into(), RelationshipKind::References);
        assert_eq!(id.to_string(), "a -[references]-> b");
    }
}
