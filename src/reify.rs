//! Reification: turning relations into places and places into relations.
//!
//! Every entry point takes a registry snapshot and returns a new one along
//! with the id of the entity it produced. Ids are never reused: the entity
//! that changes shape gets a fresh id and every reference to the old id is
//! repointed or dropped.

use crate::config::EngineConfig;
use crate::entity::{
    is_link, is_reified, AggregatedRelation, ContainerFields, Entity, LinkFields, Relation,
    RelationKind, UnitContent,
};
use crate::error::{GraphError, Ineligible, Result};
use crate::registry::container_parents;
use crate::validation::build_hierarchy_map;
use crate::Registry;
use tracing::debug;
use ulid::Ulid;

/// Result of a successful reification
#[derive(Debug, Clone)]
pub struct Reified {
    pub registry: Registry,
    pub new_entity_id: Ulid,
}

/// Promote a plain relation into an aggregated relation that can hold
/// children. Links that targeted the old relation follow it to the new id.
pub fn reify_relation(registry: &Registry, relation_id: Ulid) -> Result<Reified> {
    const OP: &str = "reify_relation";

    let entity = registry.require(relation_id)?;
    if is_reified(entity) {
        return Err(GraphError::precondition(OP, Ineligible::AlreadyReified));
    }
    let link = entity
        .link()
        .ok_or_else(|| GraphError::precondition(OP, Ineligible::NotALink))?
        .clone();

    let aggregated = AggregatedRelation {
        meta: entity.meta().reissue(),
        content: UnitContent::titled(link.verb.clone()),
        link,
        container: ContainerFields::default(),
        is_reified: true,
    };
    let new_id = aggregated.meta.id;

    let mut next = registry.clone();
    next.take(relation_id);
    next.insert(aggregated);
    let repointed = next.repoint_references(relation_id, new_id);

    debug!(old = %relation_id, new = %new_id, repointed, "relation reified");
    Ok(Reified {
        registry: next,
        new_entity_id: new_id,
    })
}

/// Turn an aggregated relation back into a plain relation. Only allowed
/// once it holds no children.
pub fn dissolve_aggregate(registry: &Registry, aggregate_id: Ulid) -> Result<Reified> {
    const OP: &str = "dissolve_aggregate";

    let entity = registry.require(aggregate_id)?;
    if !is_reified(entity) {
        return Err(GraphError::precondition(OP, Ineligible::NotReified));
    }
    let children = entity.children().map(<[Ulid]>::len).unwrap_or(0);
    if children > 0 {
        return Err(GraphError::precondition(
            OP,
            Ineligible::StillHasChildren { count: children },
        ));
    }
    let link = entity
        .link()
        .ok_or_else(|| GraphError::precondition(OP, Ineligible::NotALink))?
        .clone();

    let relation = Relation {
        meta: entity.meta().reissue(),
        link,
    };
    let new_id = relation.meta.id;

    let mut next = registry.clone();
    next.take(aggregate_id);
    next.insert(relation);
    // nothing may keep listing the old id as a child
    for parent in container_parents(&next, aggregate_id) {
        next.remove_child(parent, aggregate_id)?;
    }
    next.repoint_references(aggregate_id, new_id);

    debug!(old = %aggregate_id, new = %new_id, "aggregate dissolved");
    Ok(Reified {
        registry: next,
        new_entity_id: new_id,
    })
}

/// Flatten a unit that already sits inside some container into a relation
/// between two caller-chosen endpoints.
pub fn reify_node(
    registry: &Registry,
    unit_id: Ulid,
    source_id: Ulid,
    target_id: Ulid,
    kind: RelationKind,
    config: &EngineConfig,
) -> Result<Reified> {
    const OP: &str = "reify_node";

    if !matches!(kind, RelationKind::Semantic | RelationKind::Hierarchical(_)) {
        return Err(GraphError::precondition(OP, Ineligible::UnsupportedKind));
    }

    let unit = registry.require(unit_id)?;
    check_flattenable(OP, unit)?;
    require_container_parent(OP, registry, unit_id)?;

    flatten(OP, registry, unit, source_id, target_id, kind, config)
}

/// Causal promotion: a unit already placed in some container, with at
/// least two graph neighbors, becomes a semantic relation between two of
/// them.
pub fn reify_causal(
    registry: &Registry,
    unit_id: Ulid,
    source_id: Ulid,
    target_id: Ulid,
    config: &EngineConfig,
) -> Result<Reified> {
    const OP: &str = "reify_causal";

    let unit = registry.require(unit_id)?;
    check_flattenable(OP, unit)?;
    require_container_parent(OP, registry, unit_id)?;

    let neighbors = registry.neighbors(unit_id);
    if neighbors.len() < 2 {
        return Err(GraphError::precondition(
            OP,
            Ineligible::TooFewNeighbors {
                found: neighbors.len(),
            },
        ));
    }
    for endpoint in [source_id, target_id] {
        if !neighbors.contains(&endpoint) {
            return Err(GraphError::precondition(
                OP,
                Ineligible::EndpointNotNeighbor(endpoint),
            ));
        }
    }

    flatten(
        OP,
        registry,
        unit,
        source_id,
        target_id,
        RelationKind::Semantic,
        config,
    )
}

fn require_container_parent(operation: &'static str, registry: &Registry, unit_id: Ulid) -> Result<()> {
    let has_parent = build_hierarchy_map(registry)
        .get(&unit_id)
        .map(|parents| !parents.is_empty())
        .unwrap_or(false);
    if has_parent {
        Ok(())
    } else {
        Err(GraphError::precondition(operation, Ineligible::NoContainerParent))
    }
}

fn check_flattenable(operation: &'static str, unit: &Entity) -> Result<()> {
    if is_link(unit) {
        return Err(GraphError::precondition(operation, Ineligible::AlreadyLink));
    }
    if is_reified(unit) {
        return Err(GraphError::precondition(operation, Ineligible::AlreadyReified));
    }
    if let Some(container) = unit.container() {
        if !container.containment.permits_flattening() {
            return Err(GraphError::precondition(
                operation,
                Ineligible::ContainmentForbidsFlattening,
            ));
        }
    }
    Ok(())
}

/// Replace `unit` with a relation from `source_id` to `target_id`.
///
/// Links between the unit and either chosen endpoint are absorbed into the
/// new relation and removed. Other links touching the unit are repointed to
/// the new relation. Child-list entries naming the unit are removed.
fn flatten(
    operation: &'static str,
    registry: &Registry,
    unit: &Entity,
    source_id: Ulid,
    target_id: Ulid,
    kind: RelationKind,
    config: &EngineConfig,
) -> Result<Reified> {
    let unit_id = unit.id();
    if source_id == unit_id || target_id == unit_id || source_id == target_id {
        return Err(GraphError::precondition(operation, Ineligible::SelfEndpoint));
    }

    let (verb, inverse) = match unit.title().map(str::trim) {
        Some(title) if !title.is_empty() => {
            (title.to_string(), config.labels.fallback_inverse.clone())
        }
        _ => (
            config.labels.causal.verb.clone(),
            config.labels.causal.inverse.clone(),
        ),
    };
    let link = LinkFields::new(source_id, target_id, verb, inverse, kind);
    registry.check_endpoints(operation, &link)?;

    let absorbed: Vec<Ulid> = registry
        .relations_of(unit_id)
        .into_iter()
        .filter(|rel| {
            rel.link()
                .and_then(|l| l.other_end(unit_id))
                .map(|other| other == source_id || other == target_id)
                .unwrap_or(false)
        })
        .map(Entity::id)
        .collect();

    let mut meta = unit.meta().reissue();
    meta.relation_ids.retain(|r| !absorbed.contains(r));
    let relation = Relation { meta, link };
    let new_id = relation.meta.id;

    let mut next = registry.clone();
    for rel in &absorbed {
        // an earlier cascade may already have taken it
        if next.contains(*rel) {
            next.delete_in_place(*rel)?;
        }
    }
    for parent in container_parents(&next, unit_id) {
        next.remove_child(parent, unit_id)?;
    }
    next.take(unit_id);
    next.insert(relation);
    let repointed = next.repoint_references(unit_id, new_id);

    debug!(
        op = operation,
        old = %unit_id,
        new = %new_id,
        absorbed = absorbed.len(),
        repointed,
        "unit flattened into relation"
    );
    Ok(Reified {
        registry: next,
        new_entity_id: new_id,
    })
}
