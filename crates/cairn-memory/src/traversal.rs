//! Neighbor lookup, bounded breadth-first cluster discovery and path search.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::entity_store::EntityStore;
use crate::error::{MemoryError, Result};
use crate::relationship_store::RelationshipStore;
use crate::types::{Entity, EntityId, Relationship, RelationshipId, RelationshipKind};

/// Limits on how long a traversal may run.
///
/// Checked before every node expansion. An exhausted budget aborts the
/// traversal with [`MemoryError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct TraversalBudget {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl TraversalBudget {
    /// A budget that never runs out.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Fail if the token was cancelled or the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if let Some(ref token) = self.token
            && token.is_cancelled()
        {
            return Err(MemoryError::Cancelled("traversal cancelled".to_string()));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(MemoryError::Cancelled("traversal deadline exceeded".to_string()));
        }
        Ok(())
    }
}

/// An entity reached by a traversal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMember {
    pub id: EntityId,
    /// Hops from the root; the root has depth 0.
    pub depth: usize,
    /// Relationship the member was first reached through.
    pub via: Option<RelationshipId>,
    /// Strength of `via` at traversal time.
    pub via_strength: Option<f64>,
}

impl ClusterMember {
    pub fn via_kind(&self) -> Option<RelationshipKind> {
        self.via.as_ref().map(|v| v.kind)
    }
}

/// Result of a bounded breadth-first traversal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub root: EntityId,
    pub max_depth: usize,
    pub min_strength: f64,
    /// Members in traversal order, root first.
    pub members: Vec<ClusterMember>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.members.iter().any(|m| &m.id == id)
    }

    pub fn ids(&self) -> Vec<&EntityId> {
        self.members.iter().map(|m| &m.id).collect()
    }
}

/// Distinct neighbor entities of `id` over edges at least `min_strength`
/// strong, strongest first, then by id.
pub fn neighbors(
    entities: &EntityStore,
    relationships: &RelationshipStore,
    id: &EntityId,
    min_strength: f64,
    kind_filter: Option<RelationshipKind>,
) -> Result<Vec<Entity>> {
    if !entities.contains(id) {
        return Err(MemoryError::NotFound(format!("entity {}", id)));
    }

    let mut best: HashMap<&EntityId, f64> = HashMap::new();
    for rel in relationships.incident(id) {
        if rel.strength < min_strength || kind_filter.is_some_and(|k| rel.kind != k) {
            continue;
        }
        if let Some(other) = rel.other(id) {
            let entry = best.entry(other).or_insert(rel.strength);
            *entry = entry.max(rel.strength);
        }
    }

    let mut ranked: Vec<(&EntityId, f64)> = best.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    Ok(ranked
        .into_iter()
        .filter_map(|(other, _)| entities.get(other).cloned())
        .collect())
}

/// Breadth-first traversal from `root`.
///
/// Each entity is visited at most once, so cycles terminate. Edges weaker
/// than `min_strength` are not followed, and nodes at `max_depth` are not
/// expanded. Neighbors are expanded strongest edge first, ties broken by
/// neighbor id and then kind, whichever way the edge points.
pub fn connected_cluster(
    entities: &EntityStore,
    relationships: &RelationshipStore,
    root: &EntityId,
    max_depth: usize,
    min_strength: f64,
    budget: &TraversalBudget,
) -> Result<Cluster> {
    if !entities.contains(root) {
        return Err(MemoryError::NotFound(format!("entity {}", root)));
    }

    let mut visited: HashSet<EntityId> = HashSet::from([root.clone()]);
    let mut queue: VecDeque<(EntityId, usize)> = VecDeque::from([(root.clone(), 0)]);
    let mut members = vec![ClusterMember {
        id: root.clone(),
        depth: 0,
        via: None,
        via_strength: None,
    }];

    while let Some((current, depth)) = queue.pop_front() {
        budget.check()?;
        if depth >= max_depth {
            continue;
        }

        for (next, rel) in expansion_order(relationships, &current, min_strength) {
            if visited.contains(next) {
                continue;
            }
            if !entities.contains(next) {
                debug!(relationship = %rel.id(), "Skipping edge to missing entity");
                continue;
            }

            visited.insert(next.clone());
            members.push(ClusterMember {
                id: next.clone(),
                depth: depth + 1,
                via: Some(rel.id()),
                via_strength: Some(rel.strength),
            });
            queue.push_back((next.clone(), depth + 1));
        }
    }

    debug!(root = %root, members = members.len(), max_depth, "Traversed cluster");

    Ok(Cluster {
        root: root.clone(),
        max_depth,
        min_strength,
        members,
    })
}

/// Per-hop penalty applied to paths longer than a single edge.
pub const PATH_LENGTH_PENALTY: f64 = 0.9;

/// A simple path between two entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPath {
    /// Entities from start to end, both included.
    pub entities: Vec<EntityId>,
    /// Relationship followed at each hop.
    pub relationships: Vec<RelationshipId>,
    /// Product of edge strengths, penalized by [`PATH_LENGTH_PENALTY`] for
    /// every hop past the first.
    pub strength: f64,
}

impl GraphPath {
    pub fn hops(&self) -> usize {
        self.relationships.len()
    }
}

/// All simple paths from `from` to `to` of at most `max_depth` hops.
///
/// Edges weaker than `min_strength` are not followed. Between two adjacent
/// entities only the strongest qualifying edge is used. No entity repeats
/// within a path. Paths come back strongest first, then shortest, then by
/// their entity ids.
pub fn find_paths(
    entities: &EntityStore,
    relationships: &RelationshipStore,
    from: &EntityId,
    to: &EntityId,
    max_depth: usize,
    min_strength: f64,
    budget: &TraversalBudget,
) -> Result<Vec<GraphPath>> {
    for endpoint in [from, to] {
        if !entities.contains(endpoint) {
            return Err(MemoryError::NotFound(format!("entity {}", endpoint)));
        }
    }

    let mut search = PathSearch {
        entities,
        relationships,
        target: to,
        max_depth,
        min_strength,
        budget,
        on_path: vec![from.clone()],
        via: Vec::new(),
        found: Vec::new(),
    };
    if from != to {
        search.extend(from)?;
    }

    let mut paths = search.found;
    paths.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| a.hops().cmp(&b.hops()))
            .then_with(|| a.entities.cmp(&b.entities))
    });

    debug!(from = %from, to = %to, paths = paths.len(), max_depth, "Found paths");
    Ok(paths)
}

struct PathSearch<'a> {
    entities: &'a EntityStore,
    relationships: &'a RelationshipStore,
    target: &'a EntityId,
    max_depth: usize,
    min_strength: f64,
    budget: &'a TraversalBudget,
    on_path: Vec<EntityId>,
    via: Vec<&'a Relationship>,
    found: Vec<GraphPath>,
}

impl<'a> PathSearch<'a> {
    fn extend(&mut self, current: &EntityId) -> Result<()> {
        self.budget.check()?;
        if self.via.len() >= self.max_depth {
            return Ok(());
        }

        let mut seen: HashSet<&EntityId> = HashSet::new();
        for (next, rel) in expansion_order(self.relationships, current, self.min_strength) {
            // Strongest edge to each neighbor comes first.
            if !seen.insert(next) || self.on_path.contains(next) || !self.entities.contains(next) {
                continue;
            }

            self.via.push(rel);
            self.on_path.push(next.clone());
            if next == self.target {
                self.record();
            } else {
                self.extend(next)?;
            }
            self.on_path.pop();
            self.via.pop();
        }
        Ok(())
    }

    fn record(&mut self) {
        let product: f64 = self.via.iter().map(|rel| rel.strength).product();
        let extra_hops = self.via.len().saturating_sub(1) as i32;
        self.found.push(GraphPath {
            entities: self.on_path.clone(),
            relationships: self.via.iter().map(|rel| rel.id()).collect(),
            strength: product * PATH_LENGTH_PENALTY.powi(extra_hops),
        });
    }
}

/// Edges of `current` worth following, paired with the entity on the other
/// end: strongest first, then by that entity's id, then by kind.
fn expansion_order<'a>(
    relationships: &'a RelationshipStore,
    current: &EntityId,
    min_strength: f64,
) -> Vec<(&'a EntityId, &'a Relationship)> {
    let mut edges: Vec<(&EntityId, &Relationship)> = relationships
        .incident(current)
        .filter(|rel| rel.strength >= min_strength)
        .filter_map(|rel| rel.other(current).map(|other| (other, rel)))
        .collect();
    edges.sort_by(|a, b| {
        b.1.strength
            .total_cmp(&a.1.strength)
            .then_with(|| a.0.cmp(b.0))
            .then_with(|| a.1.kind.cmp(&b.1.kind))
    });
    edges
}
