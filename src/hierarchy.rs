//! Hierarchy materialization: flat registry in, display tree out.
//!
//! # Algorithm
//! 1. Pick roots: units and aggregated relations with no parent, plus
//!    anything carrying the force-root tag. A parent is witnessed by a
//!    container child list or by a hierarchical relation; either one is
//!    enough. Plain relations never root the tree.
//! 2. Descend through container child lists, then through hierarchical
//!    relations the child list does not mention. Each descent path carries its
//!    own visited set, copied on the way down, so a unit shared by two
//!    parents appears under both while a unit can never be its own
//!    descendant.
//! 3. Label each parent/child edge with the relation running from parent
//!    to child, or with the structural default verb.
//!
//! Output size follows the data's fan-in, so it can exceed the registry.

use crate::config::EngineConfig;
use crate::entity::{is_link, is_reified, Entity, LinkMarker};
use crate::error::{GraphError, Ineligible, Result};
use crate::validation::build_hierarchy_map;
use crate::Registry;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Which roots to materialize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootPolicy {
    /// Every parentless unit, every force-root unit
    #[default]
    Auto,
    /// A single subtree
    Only(Ulid),
}

/// Label on the edge from a display node to its parent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeLabel {
    pub verb: String,
    /// Relation backing the edge, if one exists
    pub relation_id: Option<Ulid>,
    pub reified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayNode {
    /// `None` only for the synthetic top node
    pub unit_id: Option<Ulid>,
    pub title: String,
    pub shape: &'static str,
    pub depth: usize,
    pub weight: f64,
    pub subtree_mass: f64,
    pub collapsed: bool,
    pub is_reified: bool,
    pub edge: Option<EdgeLabel>,
    pub children: Vec<DisplayNode>,
}

impl DisplayNode {
    /// Nodes in this subtree, self included
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DisplayNode::node_count).sum::<usize>()
    }

    /// How many times `id` appears in this subtree
    pub fn occurrences(&self, id: Ulid) -> usize {
        let own = usize::from(self.unit_id == Some(id));
        own + self.children.iter().map(|c| c.occurrences(id)).sum::<usize>()
    }

    pub fn child_ids(&self) -> Vec<Ulid> {
        self.children.iter().filter_map(|c| c.unit_id).collect()
    }
}

/// Materialized view handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayTree {
    pub root: DisplayNode,
}

impl DisplayTree {
    /// Top-level nodes under the synthetic root
    pub fn roots(&self) -> &[DisplayNode] {
        &self.root.children
    }

    pub fn root_ids(&self) -> Vec<Ulid> {
        self.root.child_ids()
    }

    /// Real nodes, the synthetic root excluded
    pub fn node_count(&self) -> usize {
        self.root.node_count() - 1
    }

    pub fn occurrences(&self, id: Ulid) -> usize {
        self.root.occurrences(id)
    }
}

/// Build the display tree for a registry snapshot
pub fn materialize_tree(
    registry: &Registry,
    policy: RootPolicy,
    config: &EngineConfig,
) -> Result<DisplayTree> {
    let mut builder = TreeBuilder::new(registry, config);

    let roots: Vec<&Entity> = match policy {
        RootPolicy::Only(id) => {
            let entity = registry.require(id)?;
            if is_link(entity) && !is_reified(entity) {
                return Err(GraphError::precondition("materialize_tree", Ineligible::AlreadyLink));
            }
            vec![entity]
        }
        RootPolicy::Auto => builder.auto_roots(),
    };

    let fresh_path = HashSet::new();
    let mut top = Vec::with_capacity(roots.len());
    for root in roots {
        top.extend(builder.descend(root, None, 1, &fresh_path));
    }

    if policy == RootPolicy::Auto && config.rescue_unreachable {
        for entity in builder.candidates() {
            if builder.reached.contains(&entity.id()) {
                continue;
            }
            debug!(unit = %entity.id(), "promoting unit trapped in a parentless cycle");
            top.extend(builder.descend(entity, None, 1, &fresh_path));
        }
    }

    let tree = DisplayTree {
        root: DisplayNode {
            unit_id: None,
            title: config.root_title.clone(),
            shape: "root",
            depth: 0,
            weight: 0.0,
            subtree_mass: 0.0,
            collapsed: false,
            is_reified: false,
            edge: None,
            children: top,
        },
    };

    info!(
        roots = tree.roots().len(),
        nodes = tree.node_count(),
        registry = registry.len(),
        "tree materialized"
    );
    Ok(tree)
}

struct TreeBuilder<'a> {
    registry: &'a Registry,
    config: &'a EngineConfig,
    /// Best relation for each (source, target) pair
    edges: HashMap<(Ulid, Ulid), &'a Entity>,
    /// Children witnessed only through hierarchical relations, oldest first
    related_children: HashMap<Ulid, Vec<Ulid>>,
    reached: HashSet<Ulid>,
}

impl<'a> TreeBuilder<'a> {
    fn new(registry: &'a Registry, config: &'a EngineConfig) -> Self {
        let mut edges: HashMap<(Ulid, Ulid), &'a Entity> = HashMap::new();
        let mut related: HashMap<Ulid, Vec<&'a Entity>> = HashMap::new();
        for (entity, link) in registry.links() {
            if link.kind.is_hierarchical() {
                related.entry(link.source_id).or_default().push(entity);
            }
            let key = (link.source_id, link.target_id);
            let better = match edges.get(&key) {
                None => true,
                Some(current) => rank(entity) < rank(current),
            };
            if better {
                edges.insert(key, entity);
            }
        }

        let related_children = related
            .into_iter()
            .map(|(parent, mut relations)| {
                relations.sort_by_key(|r| (r.meta().created_at, r.id()));
                let mut targets: Vec<Ulid> = Vec::new();
                for target in relations.iter().filter_map(|r| r.link().map(|l| l.target_id)) {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
                (parent, targets)
            })
            .collect();

        Self {
            registry,
            config,
            edges,
            related_children,
            reached: HashSet::new(),
        }
    }

    /// Units and aggregated relations, in creation order
    fn candidates(&self) -> Vec<&'a Entity> {
        self.registry
            .sorted_entities()
            .into_iter()
            .filter(|e| !is_link(e) || is_reified(e))
            .filter(|e| self.config.transition_roots || !is_transition(e))
            .collect()
    }

    fn auto_roots(&self) -> Vec<&'a Entity> {
        let parents = build_hierarchy_map(self.registry);

        self.candidates()
            .into_iter()
            .filter(|e| !parents.contains_key(&e.id()) || self.is_forced_root(e))
            .collect()
    }

    /// Child-list entries in order, then relation-only children
    fn children_of(&self, entity: &Entity) -> Vec<Ulid> {
        let mut children: Vec<Ulid> = entity.children().unwrap_or_default().to_vec();
        if let Some(related) = self.related_children.get(&entity.id()) {
            for child in related {
                let placeable = self
                    .registry
                    .get(*child)
                    .map(|c| !is_link(c) || is_reified(c))
                    .unwrap_or(true);
                if placeable && !children.contains(child) {
                    children.push(*child);
                }
            }
        }
        children
    }

    fn is_forced_root(&self, entity: &Entity) -> bool {
        entity
            .content()
            .map(|c| c.has_tag(&self.config.force_root_tag))
            .unwrap_or(false)
    }

    fn edge_label(&self, parent: Ulid, child: Ulid) -> EdgeLabel {
        match self.edges.get(&(parent, child)) {
            Some(relation) => EdgeLabel {
                verb: relation
                    .link()
                    .map(|l| l.verb.clone())
                    .unwrap_or_else(|| self.config.labels.contains.clone()),
                relation_id: Some(relation.id()),
                reified: is_reified(relation),
            },
            None => EdgeLabel {
                verb: self.config.labels.contains.clone(),
                relation_id: None,
                reified: false,
            },
        }
    }

    /// Expand `entity` unless it already sits on the current path
    fn descend(
        &mut self,
        entity: &'a Entity,
        edge: Option<EdgeLabel>,
        depth: usize,
        path: &HashSet<Ulid>,
    ) -> Option<DisplayNode> {
        let id = entity.id();
        if path.contains(&id) {
            debug!(unit = %id, depth, "cycle on descent path, branch cut");
            return None;
        }
        self.reached.insert(id);

        let mut own_path = path.clone();
        own_path.insert(id);

        let mut children = Vec::new();
        for child_id in self.children_of(entity) {
            let Some(child) = self.registry.get(child_id) else {
                warn!(parent = %id, child = %child_id, "skipping missing child");
                continue;
            };
            let label = self.edge_label(id, child_id);
            children.extend(self.descend(child, Some(label), depth + 1, &own_path));
        }

        let meta = entity.meta();
        Some(DisplayNode {
            unit_id: Some(id),
            title: entity
                .title()
                .map(str::to_string)
                .or_else(|| entity.link().map(|l| l.verb.clone()))
                .unwrap_or_default(),
            shape: entity.shape_name(),
            depth,
            weight: meta.internal_weight,
            subtree_mass: meta.subtree_mass,
            collapsed: entity.container().map(|c| c.collapsed).unwrap_or(false),
            is_reified: is_reified(entity),
            edge,
            children,
        })
    }
}

fn is_transition(entity: &Entity) -> bool {
    entity
        .link()
        .map(|l| l.marker == Some(LinkMarker::SequenceTransition))
        .unwrap_or(false)
}

/// Lower is preferred: hierarchical first, then oldest
fn rank(entity: &Entity) -> (bool, chrono::DateTime<chrono::Utc>, Ulid) {
    let hierarchical = entity.link().map(|l| l.kind.is_hierarchical()).unwrap_or(false);
    (!hierarchical, entity.meta().created_at, entity.id())
}
