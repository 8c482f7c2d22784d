//! Map-of-content synthesis.
//!
//! A MOC is an index document built from the cluster around a root entity.
//! Members are grouped by their dominant relationship kind to the root:
//! the strongest direct relationship between member and root that clears
//! the cluster's `min_strength` (ties by kind name), or failing that the
//! kind of the edge the member was reached through. Groups are ordered by size, largest first, then by kind name;
//! entries inside a group keep traversal order.
//!
//! Documents are regenerated wholesale and carry no reference back into the
//! graph. Given the same graph and `generated_at`, rendering is byte-stable.

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::entity_store::EntityStore;
use crate::error::Result;
use crate::relationship_store::RelationshipStore;
use crate::traversal::{Cluster, ClusterMember};
use crate::types::{Entity, EntityId, RelationshipKind, Timestamp};

/// One listed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MocEntry {
    pub id: EntityId,
    pub label: String,
    /// Hops from the root.
    pub depth: usize,
    /// Strength of the relationship that decided the entry's group.
    pub strength: f64,
}

/// Entries sharing a dominant relationship kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MocGroup {
    pub kind: RelationshipKind,
    pub entries: Vec<MocEntry>,
}

/// A generated map of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MocDocument {
    pub root: EntityId,
    pub root_label: String,
    pub generated_at: Timestamp,
    pub max_depth: usize,
    pub min_strength: f64,
    pub groups: Vec<MocGroup>,
    /// Set when the cluster had more members than could be listed.
    pub truncated: bool,
    /// Cluster members other than the root, listed or not.
    pub total_members: usize,
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    #[serde(rename = "type")]
    doc_type: &'static str,
    title: String,
    root: &'a str,
    generated_at: String,
    max_depth: usize,
    min_strength: f64,
    entries: usize,
    truncated: bool,
}

impl MocDocument {
    /// Number of listed entries across all groups.
    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn title(&self) -> String {
        format!("Map of Content: {}", self.root_label)
    }

    /// Render as Markdown with YAML front-matter.
    pub fn to_markdown(&self) -> Result<String> {
        let front_matter = FrontMatter {
            doc_type: "moc",
            title: self.title(),
            root: self.root.as_str(),
            generated_at: self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            max_depth: self.max_depth,
            min_strength: self.min_strength,
            entries: self.entry_count(),
            truncated: self.truncated,
        };

        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&front_matter)?);
        out.push_str("---\n\n");
        out.push_str(&format!("# {}\n", single_line(&self.title())));

        if self.groups.is_empty() {
            out.push_str("\n_No related entries._\n");
        }
        for group in &self.groups {
            out.push_str(&format!("\n## {} ({})\n\n", group.kind, group.entries.len()));
            for entry in &group.entries {
                out.push_str(&format!(
                    "- [[{}|{}]] (strength {:.2}, depth {})\n",
                    entry.id,
                    link_label(&entry.label),
                    entry.strength,
                    entry.depth
                ));
            }
        }
        if self.truncated {
            out.push_str(&format!(
                "\n_Showing {} of {} related entries._\n",
                self.entry_count(),
                self.total_members
            ));
        }

        Ok(out)
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Collapse line breaks so a label cannot start a new Markdown block.
fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|part| !part.trim().is_empty())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A label safe to place after the `|` of a wikilink.
fn link_label(label: &str) -> String {
    single_line(label)
        .chars()
        .map(|c| match c {
            '|' => '/',
            '[' => '(',
            ']' => ')',
            other => other,
        })
        .collect()
}

/// Group a traversed cluster into a document.
pub fn synthesize(
    root: &Entity,
    cluster: &Cluster,
    entities: &EntityStore,
    relationships: &RelationshipStore,
    max_entries: usize,
    generated_at: Timestamp,
) -> MocDocument {
    let candidates: Vec<&ClusterMember> = cluster
        .members
        .iter()
        .filter(|m| m.id != root.id)
        .collect();
    let total_members = candidates.len();

    let mut grouped: BTreeMap<RelationshipKind, Vec<MocEntry>> = BTreeMap::new();
    for member in candidates.iter().take(max_entries) {
        let Some(entity) = entities.get(&member.id) else {
            continue;
        };
        let Some((kind, strength)) =
            dominant_kind(&root.id, member, relationships, cluster.min_strength)
        else {
            continue;
        };
        grouped.entry(kind).or_default().push(MocEntry {
            id: member.id.clone(),
            label: entity.label.clone(),
            depth: member.depth,
            strength,
        });
    }

    let mut groups: Vec<MocGroup> = grouped
        .into_iter()
        .map(|(kind, entries)| MocGroup { kind, entries })
        .collect();
    groups.sort_by(|a, b| {
        b.entries
            .len()
            .cmp(&a.entries.len())
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
    });

    MocDocument {
        root: root.id.clone(),
        root_label: root.label.clone(),
        generated_at,
        max_depth: cluster.max_depth,
        min_strength: cluster.min_strength,
        groups,
        truncated: total_members > max_entries,
        total_members,
    }
}

/// Strongest direct relationship to the root at least `min_strength`
/// strong, else the traversal edge.
fn dominant_kind(
    root: &EntityId,
    member: &ClusterMember,
    relationships: &RelationshipStore,
    min_strength: f64,
) -> Option<(RelationshipKind, f64)> {
    let direct = relationships
        .between(root, &member.id)
        .into_iter()
        .filter(|rel| rel.strength >= min_strength)
        .min_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
        });

    match direct {
        Some(rel) => Some((rel.kind, rel.strength)),
        None => Some((member.via_kind()?, member.via_strength.unwrap_or(0.0))),
    }
}
