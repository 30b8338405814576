//! Ordering of sibling sequence units (chapters under a book, scenes
//! under a chapter).
//!
//! Every edit goes through [`relink`], which rewrites positions and the
//! chain of transition relations for the whole sibling list at once.

use crate::config::EngineConfig;
use crate::entity::{
    AggregatedRelation, ContainerFields, Entity, EntityMeta, LinkFields, LinkMarker, RelationKind,
    UnitContent,
};
use crate::error::{GraphError, Ineligible, Result};
use crate::Registry;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use ulid::Ulid;

/// Renumber `ordered` and regenerate its transition chain.
///
/// Positions become 1-based list indices. Each adjacent pair ends up with
/// exactly one reified transition relation; a transition that already
/// links a still-adjacent pair is kept as is, so relinking an unchanged
/// list returns an identical registry. Transitions touching a member that
/// no longer chain adjacent members are deleted.
pub fn relink(ordered: &[Ulid], registry: &Registry, config: &EngineConfig) -> Result<Registry> {
    check_members("relink", ordered, registry)?;

    let members: HashSet<Ulid> = ordered.iter().copied().collect();
    let wanted: HashSet<(Ulid, Ulid)> = ordered.windows(2).map(|w| (w[0], w[1])).collect();

    // Oldest transition wins when a pair is chained more than once
    let mut existing: Vec<&Entity> = registry
        .links()
        .filter(|(_, link)| {
            link.marker == Some(LinkMarker::SequenceTransition)
                && (members.contains(&link.source_id) || members.contains(&link.target_id))
        })
        .map(|(entity, _)| entity)
        .collect();
    existing.sort_by_key(|e| (e.meta().created_at, e.id()));

    let mut kept: HashMap<(Ulid, Ulid), Ulid> = HashMap::new();
    let mut stale = Vec::new();
    for transition in existing {
        let Some(pair) = transition.endpoints() else {
            continue;
        };
        if wanted.contains(&pair) && !kept.contains_key(&pair) {
            kept.insert(pair, transition.id());
        } else {
            stale.push(transition.id());
        }
    }

    let mut next = registry.clone();

    for id in &stale {
        if next.contains(*id) {
            next.delete_in_place(*id)?;
        }
    }
    if !stale.is_empty() {
        warn!(removed = stale.len(), "removed stale sequence transitions");
    }

    let labels = &config.labels.sequence;
    for transition_id in kept.values() {
        if let Some(entity) = next.get_mut(*transition_id) {
            let mut relabelled = false;
            if let Some(link) = entity.link_mut() {
                if link.verb != labels.verb || link.inverse_verb != labels.inverse {
                    link.verb = labels.verb.clone();
                    link.inverse_verb = labels.inverse.clone();
                    relabelled = true;
                }
            }
            if relabelled {
                entity.meta_mut().touch();
            }
        }
    }

    let mut renumbered = 0;
    for (index, id) in ordered.iter().enumerate() {
        let position = index as u32 + 1;
        let entity = next.require_mut(*id)?;
        if let Some(sequence) = entity.sequence_mut() {
            if sequence.position != position {
                sequence.position = position;
                entity.meta_mut().touch();
                renumbered += 1;
            }
        }
    }

    let mut created = 0;
    for pair in ordered.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if kept.contains_key(&(from, to)) {
            continue;
        }
        next.insert(transition(from, to, config));
        created += 1;
    }

    debug!(
        members = ordered.len(),
        renumbered,
        kept = kept.len(),
        created,
        removed = stale.len(),
        "sequence relinked"
    );
    Ok(next)
}

fn transition(from: Ulid, to: Ulid, config: &EngineConfig) -> AggregatedRelation {
    let labels = &config.labels.sequence;
    AggregatedRelation {
        meta: EntityMeta::new().with_weight(config.default_weight),
        link: LinkFields::new(from, to, labels.verb.clone(), labels.inverse.clone(), RelationKind::Plain)
            .with_marker(LinkMarker::SequenceTransition),
        content: UnitContent::titled(labels.verb.clone()),
        container: ContainerFields::default(),
        is_reified: true,
    }
}

fn check_members(operation: &'static str, ordered: &[Ulid], registry: &Registry) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ordered {
        let entity = registry.require(*id)?;
        if entity.sequence().is_none() {
            return Err(GraphError::precondition(operation, Ineligible::NotASequenceUnit(*id)));
        }
        if !seen.insert(*id) {
            return Err(GraphError::precondition(operation, Ineligible::DuplicateMember(*id)));
        }
    }
    Ok(())
}

/// Sequence-unit children of `parent`, in child-list order
pub fn sequence_members(registry: &Registry, parent: Ulid) -> Result<Vec<Ulid>> {
    let entity = registry.require(parent)?;
    let children = entity.children().ok_or_else(|| {
        GraphError::precondition("sequence_members", Ineligible::NotAContainer(parent))
    })?;
    Ok(children
        .iter()
        .copied()
        .filter(|id| registry.get(*id).and_then(Entity::sequence).is_some())
        .collect())
}

/// Add `unit` at the end of `parent`'s sequence
pub fn append_to_sequence(
    registry: &Registry,
    parent: Ulid,
    unit: Ulid,
    config: &EngineConfig,
) -> Result<Registry> {
    const OP: &str = "append_to_sequence";
    let entity = registry.require(unit)?;
    if entity.sequence().is_none() {
        return Err(GraphError::precondition(OP, Ineligible::NotASequenceUnit(unit)));
    }

    let mut next = registry.clone();
    if !next.add_child(parent, unit)? {
        return Err(GraphError::precondition(OP, Ineligible::DuplicateMember(unit)));
    }
    let members = sequence_members(&next, parent)?;
    relink(&members, &next, config)
}

/// Move the member at `from` so it ends up at index `to`.
/// Indices count sequence units only; other children keep their slots.
pub fn move_in_sequence(
    registry: &Registry,
    parent: Ulid,
    from: usize,
    to: usize,
    config: &EngineConfig,
) -> Result<Registry> {
    const OP: &str = "move_in_sequence";
    let mut members = sequence_members(registry, parent)?;
    let len = members.len();
    for index in [from, to] {
        if index >= len {
            return Err(GraphError::precondition(OP, Ineligible::IndexOutOfRange { index, len }));
        }
    }

    let moved = members.remove(from);
    members.insert(to, moved);

    let mut next = registry.clone();
    write_member_order(&mut next, parent, &members)?;
    relink(&members, &next, config)
}

/// Swap the members at `index` and `index + 1`
pub fn swap_adjacent(
    registry: &Registry,
    parent: Ulid,
    index: usize,
    config: &EngineConfig,
) -> Result<Registry> {
    let len = sequence_members(registry, parent)?.len();
    let next_index = index
        .checked_add(1)
        .filter(|next| *next < len)
        .ok_or_else(|| {
            GraphError::precondition(
                "swap_adjacent",
                Ineligible::IndexOutOfRange { index, len },
            )
        })?;
    move_in_sequence(registry, parent, index, next_index, config)
}

/// Detach `unit` from `parent` and close the gap it leaves.
/// The unit itself stays in the registry; delete it separately if wanted.
pub fn remove_from_sequence(
    registry: &Registry,
    parent: Ulid,
    unit: Ulid,
    config: &EngineConfig,
) -> Result<Registry> {
    let before = sequence_members(registry, parent)?;
    if !before.contains(&unit) {
        return Err(GraphError::NotFound(unit));
    }

    let mut next = registry.clone();
    next.remove_child(parent, unit)?;

    // The leaving unit's own transitions go with it
    let orphaned: Vec<Ulid> = next
        .links()
        .filter(|(_, link)| link.marker == Some(LinkMarker::SequenceTransition) && link.involves(unit))
        .map(|(entity, _)| entity.id())
        .collect();
    for id in orphaned {
        if next.contains(id) {
            next.delete_in_place(id)?;
        }
    }

    let members = sequence_members(&next, parent)?;
    relink(&members, &next, config)
}

/// Rewrite the member slots of `parent`'s child list in `order`
fn write_member_order(registry: &mut Registry, parent: Ulid, order: &[Ulid]) -> Result<()> {
    let members: HashSet<Ulid> = order.iter().copied().collect();
    let entity = registry.require_mut(parent)?;
    let container = entity.container_mut().ok_or_else(|| {
        GraphError::precondition("move_in_sequence", Ineligible::NotAContainer(parent))
    })?;

    let mut replacements = order.iter();
    let mut changed = false;
    for slot in container.children_ids.iter_mut() {
        if members.contains(slot) {
            if let Some(next_id) = replacements.next() {
                changed |= *slot != *next_id;
                *slot = *next_id;
            }
        }
    }
    if changed {
        entity.meta_mut().touch();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ContainmentKind;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn book_with_chapters(count: usize) -> (Registry, Ulid, Vec<Ulid>) {
        let mut registry = Registry::new();
        let book = registry.create_container(UnitContent::titled("Book"), ContainmentKind::Nested);
        let chapters: Vec<Ulid> = (0..count)
            .map(|i| {
                let id = registry.create_sequence_unit(UnitContent::titled(format!("Chapter {}", i + 1)));
                registry.add_child(book, id).unwrap();
                id
            })
            .collect();
        (registry, book, chapters)
    }

    fn position(registry: &Registry, id: Ulid) -> u32 {
        registry.get(id).unwrap().sequence().unwrap().position
    }

    fn transitions(registry: &Registry) -> Vec<(Ulid, Ulid)> {
        let mut pairs: Vec<(Ulid, Ulid)> = registry
            .links()
            .filter(|(_, l)| l.marker == Some(LinkMarker::SequenceTransition))
            .map(|(_, l)| (l.source_id, l.target_id))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_relink_positions_and_chain() {
        let (registry, _, ch) = book_with_chapters(3);
        let config = EngineConfig::default();

        let next = relink(&[ch[2], ch[0], ch[1]], &registry, &config).unwrap();

        assert_eq!(position(&next, ch[2]), 1);
        assert_eq!(position(&next, ch[0]), 2);
        assert_eq!(position(&next, ch[1]), 3);

        let mut expected = vec![(ch[2], ch[0]), (ch[0], ch[1])];
        expected.sort();
        assert_eq!(transitions(&next), expected);

        let (entity, link) = next
            .links()
            .find(|(_, l)| l.source_id == ch[2])
            .unwrap();
        assert!(crate::entity::is_reified(entity));
        assert_eq!(link.verb, "sequenced to");
        assert_eq!(link.inverse_verb, "follows");
    }

    #[test]
    fn test_relink_twice_is_identical() {
        let (registry, _, ch) = book_with_chapters(4);
        let config = EngineConfig::default();
        let order = [ch[1], ch[3], ch[0], ch[2]];

        let once = relink(&order, &registry, &config).unwrap();
        let twice = relink(&order, &once, &config).unwrap();

        assert_eq!(once, twice);
        assert_eq!(transitions(&twice).len(), 3);
    }

    #[test]
    fn test_relink_reuses_adjacent_transition() {
        let (registry, _, ch) = book_with_chapters(3);
        let config = EngineConfig::default();
        let first = relink(&ch, &registry, &config).unwrap();
        let kept = first
            .links()
            .find(|(_, l)| l.source_id == ch[0] && l.target_id == ch[1])
            .map(|(e, _)| e.id())
            .unwrap();

        let second = relink(&[ch[0], ch[1]], &first, &config).unwrap();

        assert!(second.contains(kept));
        assert_eq!(transitions(&second), vec![(ch[0], ch[1])]);
    }

    #[test]
    fn test_relink_leaves_unrelated_entities() {
        let (mut registry, book, ch) = book_with_chapters(2);
        let note = registry.create_unit(UnitContent::titled("Note"));
        let config = EngineConfig::default();

        let next = relink(&ch, &registry, &config).unwrap();

        assert_eq!(next.get(note), registry.get(note));
        assert_eq!(next.get(book), registry.get(book));
    }

    #[test]
    fn test_relink_rejects_bad_members() {
        let (mut registry, _, ch) = book_with_chapters(2);
        let note = registry.create_unit(UnitContent::titled("Note"));
        let config = EngineConfig::default();

        let err = relink(&[ch[0], note], &registry, &config).unwrap_err();
        assert_matches!(err.clause(), Some(Ineligible::NotASequenceUnit(id)) if *id == note);

        let err = relink(&[ch[0], ch[1], ch[0]], &registry, &config).unwrap_err();
        assert_matches!(err.clause(), Some(Ineligible::DuplicateMember(_)));

        let ghost = Ulid::new();
        assert_eq!(relink(&[ghost], &registry, &config), Err(GraphError::NotFound(ghost)));
    }

    #[test]
    fn test_empty_and_single_lists() {
        let (registry, _, ch) = book_with_chapters(1);
        let config = EngineConfig::default();

        assert_eq!(relink(&[], &registry, &config).unwrap(), registry);

        let next = relink(&ch, &registry, &config).unwrap();
        assert_eq!(position(&next, ch[0]), 1);
        assert!(transitions(&next).is_empty());
    }

    #[test]
    fn test_append() {
        let (mut registry, book, ch) = book_with_chapters(2);
        let config = EngineConfig::default();
        let epilogue = registry.create_sequence_unit(UnitContent::titled("Epilogue"));

        let next = append_to_sequence(&registry, book, epilogue, &config).unwrap();

        assert_eq!(sequence_members(&next, book).unwrap(), vec![ch[0], ch[1], epilogue]);
        assert_eq!(position(&next, epilogue), 3);
        assert_eq!(transitions(&next).len(), 2);

        let err = append_to_sequence(&next, book, epilogue, &config).unwrap_err();
        assert_matches!(err.clause(), Some(Ineligible::DuplicateMember(_)));
    }

    #[test]
    fn test_move_keeps_other_children_in_place() {
        let (mut registry, book, ch) = book_with_chapters(3);
        let note = registry.create_unit(UnitContent::titled("Margin note"));
        registry
            .get_mut(book)
            .unwrap()
            .container_mut()
            .unwrap()
            .insert_child(1, note);
        let config = EngineConfig::default();

        let next = move_in_sequence(&registry, book, 0, 2, &config).unwrap();

        assert_eq!(
            next.get(book).unwrap().children().unwrap(),
            &[ch[1], note, ch[2], ch[0]]
        );
        assert_eq!(position(&next, ch[1]), 1);
        assert_eq!(position(&next, ch[0]), 3);

        let err = move_in_sequence(&registry, book, 0, 3, &config).unwrap_err();
        assert_matches!(err.clause(), Some(Ineligible::IndexOutOfRange { index: 3, len: 3 }));
    }

    #[test]
    fn test_swap_adjacent() {
        let (registry, book, ch) = book_with_chapters(3);
        let config = EngineConfig::default();
        let chained = relink(&ch, &registry, &config).unwrap();

        let next = swap_adjacent(&chained, book, 1, &config).unwrap();

        assert_eq!(sequence_members(&next, book).unwrap(), vec![ch[0], ch[2], ch[1]]);
        let mut expected = vec![(ch[0], ch[2]), (ch[2], ch[1])];
        expected.sort();
        assert_eq!(transitions(&next), expected);

        assert!(swap_adjacent(&chained, book, 2, &config).is_err());
    }

    #[test]
    fn test_swap_at_max_index_is_out_of_range() {
        let (registry, book, _) = book_with_chapters(2);
        let config = EngineConfig::default();

        let err = swap_adjacent(&registry, book, usize::MAX, &config).unwrap_err();
        assert_matches!(
            err.clause(),
            Some(Ineligible::IndexOutOfRange { index: usize::MAX, len: 2 })
        );
    }

    #[test]
    fn test_remove_closes_gap() {
        let (registry, book, ch) = book_with_chapters(3);
        let config = EngineConfig::default();
        let chained = relink(&ch, &registry, &config).unwrap();

        let next = remove_from_sequence(&chained, book, ch[1], &config).unwrap();

        assert_eq!(sequence_members(&next, book).unwrap(), vec![ch[0], ch[2]]);
        assert_eq!(position(&next, ch[2]), 2);
        assert_eq!(transitions(&next), vec![(ch[0], ch[2])]);
        assert!(next.contains(ch[1]));

        let stray = Ulid::new();
        assert_eq!(
            remove_from_sequence(&next, book, stray, &config),
            Err(GraphError::NotFound(stray))
        );
    }
}
