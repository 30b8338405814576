// Helper functions to build test registries with various shapes

use story_graph::{
    ContainmentKind, HierarchyKind, LinkFields, Registry, RelationKind, UnitContent,
};
use ulid::Ulid;

pub fn parent_of(parent: Ulid, child: Ulid) -> LinkFields {
    LinkFields::new(
        parent,
        child,
        "contains",
        "part of",
        RelationKind::Hierarchical(HierarchyKind::ParentOf),
    )
}

pub fn semantic(source: Ulid, target: Ulid, verb: &str) -> LinkFields {
    LinkFields::new(source, target, verb, "related to", RelationKind::Semantic)
}

/// Book `b` with chapters `c1`, `c2`, each backed by a hierarchical relation
pub fn scenario_book() -> (Registry, Ulid, Ulid, Ulid) {
    let mut registry = Registry::new();
    let book = registry.create_container(UnitContent::titled("Book"), ContainmentKind::Nested);
    let c1 = registry.create_sequence_unit(UnitContent::titled("Chapter 1"));
    let c2 = registry.create_sequence_unit(UnitContent::titled("Chapter 2"));

    for chapter in [c1, c2] {
        registry.add_child(book, chapter).unwrap();
        registry.create_relation(parent_of(book, chapter)).unwrap();
    }

    (registry, book, c1, c2)
}

/// Book holding `count` sequence units, no transitions yet
pub fn book_with_chapters(count: usize) -> (Registry, Ulid, Vec<Ulid>) {
    let mut registry = Registry::new();
    let book = registry.create_container(UnitContent::titled("Book"), ContainmentKind::Nested);
    let mut chapters = Vec::with_capacity(count);
    for i in 0..count {
        let chapter = registry.create_sequence_unit(UnitContent::titled(format!("Chapter {}", i + 1)));
        registry.add_child(book, chapter).unwrap();
        chapters.push(chapter);
    }
    (registry, book, chapters)
}

/// Relation `r` (a → b) targeted by a meta-link `m` (note → r)
pub fn meta_linked_relation() -> (Registry, Ulid, Ulid) {
    let mut registry = Registry::new();
    let a = registry.create_unit(UnitContent::titled("Mira"));
    let b = registry.create_unit(UnitContent::titled("Oren"));
    let note = registry.create_unit(UnitContent::titled("Gossip"));
    let r = registry.create_relation(semantic(a, b, "owes money to")).unwrap();
    let m = registry.create_relation(semantic(note, r, "comments on")).unwrap();
    (registry, r, m)
}

/// Containers `a` and `b` listing each other, under a common parent
pub fn rooted_cycle() -> (Registry, Ulid, Ulid, Ulid) {
    let mut registry = Registry::new();
    let top = registry.create_container(UnitContent::titled("Top"), ContainmentKind::Loose);
    let a = registry.create_container(UnitContent::titled("A"), ContainmentKind::Loose);
    let b = registry.create_container(UnitContent::titled("B"), ContainmentKind::Loose);
    registry.add_child(top, a).unwrap();
    registry.add_child(a, b).unwrap();
    registry.add_child(b, a).unwrap();
    (registry, top, a, b)
}

/// A plain unit `event` between `cause` and `effect`, filed under a folder
pub fn causal_triangle() -> (Registry, Ulid, Ulid, Ulid, Ulid) {
    let mut registry = Registry::new();
    let folder = registry.create_container(UnitContent::titled("Events"), ContainmentKind::Loose);
    let cause = registry.create_unit(UnitContent::titled("Drought"));
    let event = registry.create_unit(UnitContent::titled("causes"));
    let effect = registry.create_unit(UnitContent::titled("Famine"));
    registry.add_child(folder, event).unwrap();
    registry.create_relation(semantic(cause, event, "triggers")).unwrap();
    registry.create_relation(semantic(event, effect, "triggers")).unwrap();
    (registry, folder, cause, event, effect)
}

/// `count` loose containers wired by `edges` (parent index, child index)
pub fn container_web(count: usize, edges: &[(usize, usize)]) -> (Registry, Vec<Ulid>) {
    let mut registry = Registry::new();
    let ids: Vec<Ulid> = (0..count)
        .map(|i| registry.create_container(UnitContent::titled(format!("Node {i}")), ContainmentKind::Loose))
        .collect();
    for &(parent, child) in edges {
        registry.add_child(ids[parent % count], ids[child % count]).unwrap();
    }
    (registry, ids)
}
