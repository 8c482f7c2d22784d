//! Note ingestion.
//!
//! Turns Markdown notes into entity drafts. A note may start with YAML
//! front-matter between `---` delimiters:
//!
//! ```markdown
//! ---
//! title: Async Rust
//! tags: [rust, "#async"]
//! links: ["[[Tokio]]"]
//! ---
//! Body text referencing [[Pinning|pins]] and [[Futures#Polling]].
//! ```
//!
//! The label is the front-matter title, else the first `# ` heading, else the
//! file stem of the note id. Tags are lowercased with any leading `#`
//! removed. Mentions come from front-matter link keys and from wiki-links in
//! the body.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value;

use crate::error::{MemoryError, Result};
use crate::types::{EntityDraft, EntityId};

static WIKI_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\[\]]+?)\]\]").expect("wiki-link pattern is valid")
});

const TITLE_KEYS: [&str; 2] = ["title", "Title"];
const TAG_KEYS: [&str; 2] = ["tags", "Tags"];
const LINK_KEYS: [&str; 4] = ["links", "mentions", "relationships", "Relationships"];

/// Parsed note front-matter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    /// Normalized tags.
    pub tags: BTreeSet<String>,
    /// Link targets with wiki-link syntax removed.
    pub links: BTreeSet<String>,
    /// Keys not interpreted above.
    pub extra: BTreeMap<String, Value>,
}

impl FrontMatter {
    /// Parse a YAML front-matter block (without delimiters).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let mapping: BTreeMap<String, Value> = serde_yaml::from_str(yaml)?;
        let mut front_matter = Self::default();

        for (key, value) in mapping {
            if TITLE_KEYS.contains(&key.as_str()) {
                front_matter.title = scalar(&value).filter(|t| !t.trim().is_empty());
            } else if TAG_KEYS.contains(&key.as_str()) {
                front_matter
                    .tags
                    .extend(strings(&value).iter().flat_map(|s| split_tags(s)));
            } else if LINK_KEYS.contains(&key.as_str()) {
                front_matter.links.extend(
                    strings(&value)
                        .iter()
                        .filter_map(|s| unwrap_link(s)),
                );
            } else {
                front_matter.extra.insert(key, value);
            }
        }

        Ok(front_matter)
    }
}

/// A note handed over by the note-storage or web-ingestion collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteRecord {
    pub id: EntityId,
    /// Body with the front-matter removed.
    pub content: String,
    pub front_matter: FrontMatter,
}

impl NoteRecord {
    /// Parse a Markdown note. Notes without front-matter are accepted.
    pub fn parse(id: impl Into<EntityId>, markdown: &str) -> Result<Self> {
        let id = id.into();
        let (front_matter, content) = match split_front_matter(markdown)? {
            Some((yaml, body)) => (FrontMatter::from_yaml(yaml)?, body.to_string()),
            None => (FrontMatter::default(), markdown.to_string()),
        };

        Ok(Self {
            id,
            content,
            front_matter,
        })
    }

    /// Display label for the note.
    pub fn label(&self) -> String {
        if let Some(ref title) = self.front_matter.title {
            return title.trim().to_string();
        }
        if let Some(heading) = self
            .content
            .lines()
            .find_map(|line| line.trim_start().strip_prefix("# "))
            .map(str::trim)
            .filter(|h| !h.is_empty())
        {
            return heading.to_string();
        }
        Path::new(self.id.as_str())
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(self.id.as_str())
            .to_string()
    }

    /// Front-matter links and body wiki-links, excluding the note itself.
    pub fn mentions(&self) -> BTreeSet<String> {
        self.front_matter
            .links
            .iter()
            .cloned()
            .chain(extract_wiki_links(&self.content))
            .filter(|m| m != self.id.as_str())
            .collect()
    }

    /// Entity input for this note.
    pub fn to_draft(&self) -> EntityDraft {
        EntityDraft::new(self.id.clone(), self.label())
            .with_tags(self.front_matter.tags.iter().cloned())
            .with_mentions(self.mentions())
    }
}

/// Note lifecycle change.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteEvent {
    Created(NoteRecord),
    Updated(NoteRecord),
    Deleted(EntityId),
}

impl NoteEvent {
    pub fn id(&self) -> &EntityId {
        match self {
            Self::Created(record) | Self::Updated(record) => &record.id,
            Self::Deleted(id) => id,
        }
    }
}

/// Targets of `[[Target]]`, `[[Target|alias]]` and `[[Target#heading]]` links.
pub fn extract_wiki_links(text: &str) -> Vec<String> {
    WIKI_LINK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| link_target(m.as_str()))
        .collect()
}

/// Split `---` delimited front-matter from the body.
///
/// Returns `None` when the note does not open with a delimiter.
fn split_front_matter(markdown: &str) -> Result<Option<(&str, &str)>> {
    let trimmed = markdown.trim_start_matches('\u{feff}');
    let Some(after_first) = trimmed
        .strip_prefix("---\n")
        .or_else(|| trimmed.strip_prefix("---\r\n"))
    else {
        return Ok(None);
    };

    // Empty front-matter: closing delimiter on the very next line.
    if let Some(body) = after_first.strip_prefix("---") {
        return Ok(Some(("", body.trim_start_matches(['\r', '\n']))));
    }

    let close_pos = after_first.find("\n---").ok_or_else(|| {
        MemoryError::InvalidData("front-matter has no closing --- delimiter".to_string())
    })?;

    let yaml = &after_first[..close_pos];
    let rest = &after_first[close_pos + 4..];
    let body = rest
        .split_once('\n')
        .map(|(_, body)| body)
        .unwrap_or("");
    Ok(Some((yaml, body)))
}

/// `[[Target|alias]]` or bare `Target` to `Target`.
fn unwrap_link(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("[[")
        .and_then(|s| s.strip_suffix("]]"))
        .unwrap_or(trimmed);
    link_target(inner)
}

/// Strip alias and heading parts from a wiki-link body.
fn link_target(inner: &str) -> Option<String> {
    let target = inner.split(['|', '#']).next().unwrap_or("").trim();
    (!target.is_empty()).then(|| target.to_string())
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|t| t.trim().trim_start_matches('#').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A scalar or a sequence of scalars as strings.
fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}
