mod fixtures;

use assert_matches::assert_matches;
use fixtures::story_graphs::*;
use pretty_assertions::assert_eq;
use story_graph::{
    build_hierarchy_map, delete_entity, dissolve_aggregate, find_dangling_references,
    is_container, is_link, is_reified, load_snapshot, materialize_tree, reify_causal, reify_node,
    reify_relation, relink, save_snapshot, swap_adjacent, ContainmentKind, EngineConfig,
    GraphError, Ineligible, LinkMarker, RelationKind, RootPolicy, UnitContent, ValidatedRegistry,
};
use tempfile::TempDir;

#[test]
fn test_book_scenario() {
    let (registry, book, c1, c2) = scenario_book();
    let config = EngineConfig::default();

    let tree = materialize_tree(&registry, RootPolicy::Auto, &config).unwrap();
    assert_eq!(tree.root_ids(), vec![book]);
    let book_node = &tree.roots()[0];
    assert_eq!(book_node.child_ids(), vec![c1, c2]);
    for child in &book_node.children {
        let edge = child.edge.as_ref().unwrap();
        assert_eq!(edge.verb, "contains");
        assert!(!edge.reified);
    }

    let relinked = relink(&[c2, c1], &registry, &config).unwrap();
    let position = |id| relinked.get(id).unwrap().sequence().unwrap().position;
    assert_eq!(position(c2), 1);
    assert_eq!(position(c1), 2);

    let transitions: Vec<_> = relinked
        .links()
        .filter(|(_, l)| l.marker == Some(LinkMarker::SequenceTransition))
        .collect();
    assert_eq!(transitions.len(), 1);
    let (entity, link) = transitions[0];
    assert_eq!((link.source_id, link.target_id), (c2, c1));
    assert_eq!(link.verb, "sequenced to");
    assert!(is_reified(entity));

    assert!(!relinked.validate().has_errors());
}

#[test]
fn test_reify_relation_repoints_meta_links() {
    let (registry, r, m) = meta_linked_relation();

    let reified = reify_relation(&registry, r).unwrap();
    let next = &reified.registry;
    let new_id = reified.new_entity_id;

    assert!(!next.contains(r));
    assert_eq!(next.get(m).unwrap().link().unwrap().target_id, new_id);
    assert!(next.links().all(|(_, l)| !l.involves(r)));

    let aggregated = next.get(new_id).unwrap();
    assert!(is_link(aggregated));
    assert!(is_container(aggregated));
    assert!(is_reified(aggregated));
    assert!(find_dangling_references(next).is_empty());

    // and back again
    let dissolved = dissolve_aggregate(next, new_id).unwrap();
    let plain = dissolved.registry.get(dissolved.new_entity_id).unwrap();
    assert!(is_link(plain));
    assert!(!is_reified(plain));
    assert_eq!(
        dissolved.registry.get(m).unwrap().link().unwrap().target_id,
        dissolved.new_entity_id
    );
}

#[test]
fn test_eligibility_gating() {
    let config = EngineConfig::default();
    let mut registry = story_graph::Registry::new();
    let loner = registry.create_unit(UnitContent::titled("Loner"));
    let friend = registry.create_unit(UnitContent::titled("Friend"));
    let other = registry.create_unit(UnitContent::titled("Other"));
    registry.create_relation(semantic(loner, friend, "knows")).unwrap();

    assert!(build_hierarchy_map(&registry).get(&loner).is_none());
    let err = reify_node(&registry, loner, friend, other, RelationKind::Semantic, &config)
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::PreconditionFailed {
            operation: "reify_node",
            clause: Ineligible::NoContainerParent,
        }
    );

    let err = reify_causal(&registry, loner, friend, other, &config).unwrap_err();
    assert_matches!(err.clause(), Some(Ineligible::NoContainerParent));

    let folder = registry.create_container(UnitContent::titled("Drawer"), ContainmentKind::Loose);
    registry.add_child(folder, loner).unwrap();
    let err = reify_causal(&registry, loner, friend, other, &config).unwrap_err();
    assert_matches!(err.clause(), Some(Ineligible::TooFewNeighbors { found: 1 }));
}

#[test]
fn test_relation_only_child_is_placed_under_parent() {
    let mut registry = story_graph::Registry::new();
    let realm = registry.create_container(UnitContent::titled("Realm"), ContainmentKind::Loose);
    let city = registry.create_unit(UnitContent::titled("City"));
    registry.create_relation(parent_of(realm, city)).unwrap();

    assert_eq!(build_hierarchy_map(&registry).get(&city), Some(&vec![realm]));
    let tree = materialize_tree(&registry, RootPolicy::Auto, &EngineConfig::default()).unwrap();
    assert_eq!(tree.root_ids(), vec![realm]);
    assert_eq!(tree.roots()[0].child_ids(), vec![city]);
}

#[test]
fn test_causal_promotion() {
    let (registry, folder, cause, event, effect) = causal_triangle();
    let config = EngineConfig::default();

    let promoted = reify_causal(&registry, event, cause, effect, &config).unwrap();
    let next = &promoted.registry;

    assert!(!next.contains(event));
    let link = next.get(promoted.new_entity_id).unwrap().link().unwrap();
    assert_eq!((link.source_id, link.target_id), (cause, effect));
    assert_eq!(link.verb, "causes");
    assert_eq!(link.kind, RelationKind::Semantic);
    assert_eq!(next.get(folder).unwrap().children().unwrap(), &[] as &[ulid::Ulid]);
    assert_eq!(next.relation_count(), 1);
    assert!(!next.validate().has_errors());
}

#[test]
fn test_reify_node_in_container() {
    let (registry, folder, cause, event, effect) = causal_triangle();
    let config = EngineConfig::default();

    let flattened = reify_node(
        &registry,
        event,
        cause,
        effect,
        RelationKind::Hierarchical(story_graph::HierarchyKind::PartOf),
        &config,
    )
    .unwrap();

    let next = &flattened.registry;
    assert!(!next.contains(event));
    assert!(!next.get(folder).unwrap().children().unwrap().contains(&event));
    assert!(find_dangling_references(next).is_empty());
}

#[test]
fn test_delete_cascades() {
    let (registry, book, c1, c2) = scenario_book();

    let next = delete_entity(&registry, c1).unwrap();

    assert!(!next.contains(c1));
    assert_eq!(next.get(book).unwrap().children().unwrap(), &[c2]);
    assert_eq!(next.relation_count(), 1);
    assert!(find_dangling_references(&next).is_empty());
    assert!(next.validate().is_valid());

    assert_eq!(
        delete_entity(&next, c1),
        Err(GraphError::NotFound(c1))
    );
}

#[test]
fn test_cycle_under_root() {
    let (registry, top, a, b) = rooted_cycle();
    let tree = materialize_tree(&registry, RootPolicy::Auto, &EngineConfig::default()).unwrap();

    assert_eq!(tree.root_ids(), vec![top]);
    let a_node = &tree.roots()[0].children[0];
    assert_eq!(a_node.unit_id, Some(a));
    assert_eq!(a_node.child_ids(), vec![b]);
    assert!(a_node.children[0].children.is_empty());
}

#[test]
fn test_edit_then_snapshot_round_trip() {
    let (registry, book, c1, c2) = scenario_book();
    let config = EngineConfig::default();
    let registry = relink(&[c1, c2], &registry, &config).unwrap();
    let registry = swap_adjacent(&registry, book, 0, &config).unwrap();

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("story.json");
    save_snapshot(&path, &registry).unwrap();
    let (manifest, loaded) = load_snapshot(&path).unwrap();

    assert_eq!(manifest.entity_count, registry.len());
    assert_eq!(loaded, registry);
    assert_eq!(
        materialize_tree(&loaded, RootPolicy::Auto, &config).unwrap(),
        materialize_tree(&registry, RootPolicy::Auto, &config).unwrap()
    );
}
