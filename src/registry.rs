use crate::entity::{
    is_container, is_link, ContainerUnit, ContainmentKind, Entity, EntityMeta, LinkFields,
    Relation, SequenceUnit, Unit, UnitContent,
};
use crate::error::{GraphError, Ineligible, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use ulid::Ulid;

/// Flat id → entity snapshot of the whole graph.
///
/// Core operations take a `&Registry` and hand back a new one; the
/// `&mut self` helpers here are for building a snapshot before it is
/// shared, and for the operations' own private copies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    entities: HashMap<Ulid, Entity>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    /// Build a registry from entities, keyed by their own ids
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut registry = Self::new();
        for entity in entities {
            registry.insert(entity);
        }
        registry
    }

    // ========== Lookup ==========

    pub fn get(&self, id: Ulid) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub(crate) fn require(&self, id: Ulid) -> Result<&Entity> {
        self.entities.get(&id).ok_or(GraphError::NotFound(id))
    }

    pub(crate) fn require_mut(&mut self, id: Ulid) -> Result<&mut Entity> {
        self.entities.get_mut(&id).ok_or(GraphError::NotFound(id))
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ulid, &Entity)> {
        self.entities.iter()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Every link-shaped entity, reified or not
    pub fn links(&self) -> impl Iterator<Item = (&Entity, &LinkFields)> {
        self.entities.values().filter_map(|e| e.link().map(|l| (e, l)))
    }

    /// Entities in creation order, ties broken by id
    pub fn sorted_entities(&self) -> Vec<&Entity> {
        let mut entities: Vec<&Entity> = self.entities.values().collect();
        entities.sort_by(|a, b| {
            a.meta()
                .created_at
                .cmp(&b.meta().created_at)
                .then_with(|| a.id().cmp(&b.id()))
        });
        entities
    }

    /// Count non-link entities
    pub fn unit_count(&self) -> usize {
        self.entities.values().filter(|e| !is_link(e)).count()
    }

    /// Count link-shaped entities
    pub fn relation_count(&self) -> usize {
        self.entities.values().filter(|e| is_link(e)).count()
    }

    // ========== Graph queries ==========

    /// All links touching `id` at either end
    pub fn relations_of(&self, id: Ulid) -> Vec<&Entity> {
        self.links()
            .filter(|(_, link)| link.involves(id))
            .map(|(entity, _)| entity)
            .collect()
    }

    pub fn outgoing(&self, id: Ulid) -> Vec<&Entity> {
        self.links()
            .filter(|(_, link)| link.source_id == id)
            .map(|(entity, _)| entity)
            .collect()
    }

    pub fn incoming(&self, id: Ulid) -> Vec<&Entity> {
        self.links()
            .filter(|(_, link)| link.target_id == id)
            .map(|(entity, _)| entity)
            .collect()
    }

    /// Opposite endpoints of every link touching `id`, deduplicated
    pub fn neighbors(&self, id: Ulid) -> Vec<Ulid> {
        let mut seen = HashSet::new();
        let mut neighbors: Vec<Ulid> = self
            .links()
            .filter_map(|(_, link)| link.other_end(id))
            .filter(|other| *other != id && seen.insert(*other))
            .collect();
        neighbors.sort();
        neighbors
    }

    /// Relation from `source` to `target`, preferring hierarchical ones
    pub fn relation_between(&self, source: Ulid, target: Ulid) -> Option<&Entity> {
        let mut candidates: Vec<&Entity> = self
            .links()
            .filter(|(_, link)| link.source_id == source && link.target_id == target)
            .map(|(entity, _)| entity)
            .collect();
        candidates.sort_by_key(|e| {
            let hierarchical = e.link().map(|l| l.kind.is_hierarchical()).unwrap_or(false);
            (!hierarchical, e.meta().created_at, e.id())
        });
        candidates.into_iter().next()
    }

    // ========== Construction ==========

    /// Insert or replace an entity. Incidence sets on the endpoints of a
    /// link are updated.
    pub fn insert(&mut self, entity: impl Into<Entity>) -> Ulid {
        let entity = entity.into();
        let id = entity.id();
        let endpoints = entity.endpoints();
        self.entities.insert(id, entity);
        if let Some((source, target)) = endpoints {
            self.attach_incidence(id, source, target);
        }
        id
    }

    pub fn create_unit(&mut self, content: UnitContent) -> Ulid {
        self.insert(Unit {
            meta: EntityMeta::new(),
            content,
        })
    }

    pub fn create_container(&mut self, content: UnitContent, containment: ContainmentKind) -> Ulid {
        let mut container = ContainerUnit::new(String::new(), containment);
        container.content = content;
        self.insert(container)
    }

    pub fn create_sequence_unit(&mut self, content: UnitContent) -> Ulid {
        let mut unit = SequenceUnit::new(String::new());
        unit.content = content;
        self.insert(unit)
    }

    /// Create a relation between two existing entries
    pub fn create_relation(&mut self, link: LinkFields) -> Result<Ulid> {
        self.check_endpoints("create_relation", &link)?;
        let relation = Relation::new(link);
        let id = self.insert(relation);
        debug!(relation = %id, "relation created");
        Ok(id)
    }

    pub(crate) fn check_endpoints(&self, operation: &'static str, link: &LinkFields) -> Result<()> {
        for endpoint in [link.source_id, link.target_id] {
            if !self.contains(endpoint) {
                return Err(GraphError::precondition(
                    operation,
                    Ineligible::EndpointMissing(endpoint),
                ));
            }
        }
        if link.source_id == link.target_id {
            return Err(GraphError::precondition(operation, Ineligible::SelfEndpoint));
        }
        Ok(())
    }

    /// Append `child` to a container's child list
    pub fn add_child(&mut self, parent: Ulid, child: Ulid) -> Result<bool> {
        self.require(child)?;
        let container = self
            .require_mut(parent)?
            .container_mut()
            .ok_or_else(|| GraphError::precondition("add_child", Ineligible::NotAContainer(parent)))?;
        let added = container.add_child(child);
        if added {
            self.touch(parent);
        }
        Ok(added)
    }

    pub fn remove_child(&mut self, parent: Ulid, child: Ulid) -> Result<bool> {
        let container = self
            .require_mut(parent)?
            .container_mut()
            .ok_or_else(|| {
                GraphError::precondition("remove_child", Ineligible::NotAContainer(parent))
            })?;
        let removed = container.remove_child(child);
        if removed {
            self.touch(parent);
        }
        Ok(removed)
    }

    /// Replace the text payload of a node-like entity
    pub fn update_content(&mut self, id: Ulid, content: UnitContent) -> Result<()> {
        let entity = self.require_mut(id)?;
        let slot = entity
            .content_mut()
            .ok_or_else(|| GraphError::precondition("update_content", Ineligible::AlreadyLink))?;
        *slot = content;
        entity.meta_mut().touch();
        Ok(())
    }

    pub(crate) fn touch(&mut self, id: Ulid) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.meta_mut().touch();
        }
    }

    // ========== Incidence bookkeeping ==========

    fn attach_incidence(&mut self, relation_id: Ulid, source: Ulid, target: Ulid) {
        for endpoint in [source, target] {
            if let Some(entity) = self.entities.get_mut(&endpoint) {
                entity.meta_mut().relation_ids.insert(relation_id);
            }
        }
    }

    /// Remove an entity without any cascade
    pub(crate) fn take(&mut self, id: Ulid) -> Option<Entity> {
        let removed = self.entities.remove(&id)?;
        if let Some((source, target)) = removed.endpoints() {
            for endpoint in [source, target] {
                if let Some(entity) = self.entities.get_mut(&endpoint) {
                    entity.meta_mut().relation_ids.remove(&id);
                }
            }
        }
        Some(removed)
    }

    /// Rewrite every reference to `old` (link endpoints, child lists,
    /// incidence sets) so that it names `new` instead.
    pub(crate) fn repoint_references(&mut self, old: Ulid, new: Ulid) -> usize {
        let mut repointed = 0;
        let mut moved_incidence = Vec::new();

        for entity in self.entities.values_mut() {
            let mut changed = false;
            let entity_id = entity.meta().id;

            if let Some(link) = entity.link_mut() {
                if link.repoint(old, new) {
                    moved_incidence.push(entity_id);
                    changed = true;
                }
            }

            if let Some(container) = entity.container_mut() {
                if let Some(pos) = container.children_ids.iter().position(|c| *c == old) {
                    if container.has_child(new) {
                        container.children_ids.remove(pos);
                    } else {
                        container.children_ids[pos] = new;
                    }
                    changed = true;
                }
            }

            let relation_ids = &mut entity.meta_mut().relation_ids;
            if relation_ids.remove(&old) {
                relation_ids.insert(new);
            }

            if changed {
                entity.meta_mut().touch();
                repointed += 1;
            }
        }

        // Links that now end at `new` must show up in its incidence set
        if let Some(entity) = self.entities.get_mut(&new) {
            entity.meta_mut().relation_ids.extend(moved_incidence);
        }

        repointed
    }

    /// Cascading delete in place: the entity, every link ending at any
    /// removed entity (transitively, since links may target links), and
    /// every child-list reference. Returns the removed ids.
    pub fn delete_in_place(&mut self, id: Ulid) -> Result<Vec<Ulid>> {
        self.require(id)?;

        let mut removed = Vec::new();
        let mut doomed: HashSet<Ulid> = HashSet::new();
        let mut queue = vec![id];

        while let Some(current) = queue.pop() {
            if !doomed.insert(current) {
                continue;
            }
            for (entity, link) in self.links() {
                if link.involves(current) && !doomed.contains(&entity.id()) {
                    queue.push(entity.id());
                }
            }
        }

        for doomed_id in &doomed {
            if self.take(*doomed_id).is_some() {
                removed.push(*doomed_id);
            }
        }

        for entity in self.entities.values_mut() {
            let mut changed = false;
            if let Some(container) = entity.container_mut() {
                let before = container.children_ids.len();
                container.children_ids.retain(|c| !doomed.contains(c));
                changed = before != container.children_ids.len();
            }
            let relation_ids = &mut entity.meta_mut().relation_ids;
            relation_ids.retain(|r| !doomed.contains(r));
            if changed {
                entity.meta_mut().touch();
            }
        }

        removed.sort();
        debug!(root = %id, removed = removed.len(), "cascading delete");
        Ok(removed)
    }
}

/// Snapshot-in, snapshot-out cascading delete
pub fn delete_entity(registry: &Registry, id: Ulid) -> Result<Registry> {
    let mut next = registry.clone();
    next.delete_in_place(id)?;
    Ok(next)
}

/// Ids of every container whose child list contains `child`
pub fn container_parents(registry: &Registry, child: Ulid) -> Vec<Ulid> {
    let mut parents: Vec<Ulid> = registry
        .entities()
        .filter(|e| is_container(e) && e.children().map(|c| c.contains(&child)).unwrap_or(false))
        .map(|e| e.id())
        .collect();
    parents.sort();
    parents
}
