//! Wiki-style mentions: `[[Target]]` spans in a unit's text become
//! semantic relations from that unit to the target.

use crate::config::EngineConfig;
use crate::entity::{is_link, is_reified, EntityMeta, LinkFields, LinkMarker, Relation, RelationKind};
use crate::error::{GraphError, Ineligible, Result};
use crate::Registry;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    /// Text between the brackets, trimmed
    pub target: String,
    /// Start position in the text
    pub start: usize,
    /// End position in the text
    pub end: usize,
    /// The full mention including brackets
    pub full_text: String,
}

fn mention_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[\[([^\[\]]+)\]\]").ok())
        .as_ref()
}

/// Every `[[...]]` span in `text`, in order
pub fn parse_mentions(text: &str) -> Vec<Mention> {
    let Some(re) = mention_pattern() else {
        return Vec::new();
    };

    re.captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let target = cap.get(1)?.as_str().trim();
            if target.is_empty() {
                return None;
            }
            Some(Mention {
                target: target.to_string(),
                start: whole.start(),
                end: whole.end(),
                full_text: whole.as_str().to_string(),
            })
        })
        .collect()
}

/// The mention covering byte `position`, if any
pub fn mention_at(text: &str, position: usize) -> Option<Mention> {
    parse_mentions(text)
        .into_iter()
        .find(|m| position >= m.start && position < m.end)
}

/// Outcome of [`sync_mentions`]
#[derive(Debug, Clone)]
pub struct MentionSync {
    pub registry: Registry,
    pub created: Vec<Ulid>,
    pub removed: Vec<Ulid>,
    /// Targets that matched no entity
    pub unresolved: Vec<String>,
}

/// Find the entity a mention names: an id first, then a title or alias
/// (case-insensitive, oldest entity wins). Plain relations cannot be
/// mentioned.
pub fn resolve_mention(registry: &Registry, target: &str) -> Option<Ulid> {
    if let Ok(id) = Ulid::from_string(target) {
        if registry.contains(id) {
            return Some(id);
        }
    }

    registry
        .sorted_entities()
        .into_iter()
        .filter(|e| !is_link(e) || is_reified(e))
        .find(|e| e.content().map(|c| c.answers_to(target)).unwrap_or(false))
        .map(|e| e.id())
}

/// Regenerate the outgoing mention relations of `unit_id` from its gist and
/// body. Mention relations whose target is no longer named are deleted;
/// ones still named are kept untouched.
pub fn sync_mentions(registry: &Registry, unit_id: Ulid, config: &EngineConfig) -> Result<MentionSync> {
    let unit = registry.require(unit_id)?;
    let content = unit
        .content()
        .ok_or_else(|| GraphError::precondition("sync_mentions", Ineligible::AlreadyLink))?;

    let mut wanted: Vec<Ulid> = Vec::new();
    let mut unresolved = Vec::new();
    for text in [&content.gist, &content.body] {
        for mention in parse_mentions(text) {
            match resolve_mention(registry, &mention.target) {
                Some(target) if target == unit_id => {}
                Some(target) => {
                    if !wanted.contains(&target) {
                        wanted.push(target);
                    }
                }
                None => {
                    if !unresolved.contains(&mention.target) {
                        unresolved.push(mention.target);
                    }
                }
            }
        }
    }

    let mut present: BTreeSet<Ulid> = BTreeSet::new();
    let mut stale = Vec::new();
    for (entity, link) in registry.links() {
        if link.source_id != unit_id || link.marker != Some(LinkMarker::Mention) {
            continue;
        }
        if wanted.contains(&link.target_id) && present.insert(link.target_id) {
            continue;
        }
        stale.push(entity.id());
    }
    stale.sort();

    let mut next = registry.clone();
    let mut removed = Vec::new();
    for id in stale {
        if next.contains(id) {
            removed.extend(next.delete_in_place(id)?);
        }
    }

    let labels = &config.labels.mention;
    let mut created = Vec::new();
    for target in wanted.into_iter().filter(|t| !present.contains(t)) {
        let link = LinkFields::new(
            unit_id,
            target,
            labels.verb.clone(),
            labels.inverse.clone(),
            RelationKind::Semantic,
        )
        .with_marker(LinkMarker::Mention);
        created.push(next.insert(Relation {
            meta: EntityMeta::new().with_weight(config.default_weight),
            link,
        }));
    }

    debug!(
        unit = %unit_id,
        created = created.len(),
        removed = removed.len(),
        unresolved = unresolved.len(),
        "mentions synced"
    );
    Ok(MentionSync {
        registry: next,
        created,
        removed,
        unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::UnitContent;

    #[test]
    fn test_parse_single_mention() {
        let mentions = parse_mentions("Check out [[Harbor]] for more info");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].target, "Harbor");
        assert_eq!(mentions[0].full_text, "[[Harbor]]");
    }

    #[test]
    fn test_parse_multiple_mentions() {
        let mentions = parse_mentions("See [[ Mira ]] and [[The Keep]], not [[]]");
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].target, "Mira");
        assert_eq!(mentions[1].target, "The Keep");
    }

    #[test]
    fn test_mention_at_position() {
        let text = "Check out [[Harbor]] for more info";
        assert_eq!(mention_at(text, 12).unwrap().target, "Harbor");
        assert!(mention_at(text, 0).is_none());
    }

    #[test]
    fn test_resolve_by_title_alias_and_id() {
        let mut registry = Registry::new();
        let mira = registry.create_unit(UnitContent {
            aliases: ["The Captain".to_string()].into_iter().collect(),
            ..UnitContent::titled("Mira")
        });

        assert_eq!(resolve_mention(&registry, "mira"), Some(mira));
        assert_eq!(resolve_mention(&registry, "the captain"), Some(mira));
        assert_eq!(resolve_mention(&registry, &mira.to_string()), Some(mira));
        assert_eq!(resolve_mention(&registry, "Nobody"), None);
    }

    #[test]
    fn test_sync_creates_and_prunes() {
        let mut registry = Registry::new();
        let harbor = registry.create_unit(UnitContent::titled("Harbor"));
        let keep = registry.create_unit(UnitContent::titled("Keep"));
        let scene = registry.create_unit(
            UnitContent::titled("Arrival").with_body("Ships reach [[Harbor]] near [[Keep]] and [[Atlantis]]."),
        );
        let config = EngineConfig::default();

        let first = sync_mentions(&registry, scene, &config).unwrap();
        assert_eq!(first.created.len(), 2);
        assert_eq!(first.unresolved, vec!["Atlantis".to_string()]);
        assert_eq!(first.registry.neighbors(scene), {
            let mut expected = vec![harbor, keep];
            expected.sort();
            expected
        });

        let again = sync_mentions(&first.registry, scene, &config).unwrap();
        assert!(again.created.is_empty());
        assert!(again.removed.is_empty());
        assert_eq!(again.registry, first.registry);

        let mut edited = first.registry.clone();
        edited
            .update_content(scene, UnitContent::titled("Arrival").with_body("Only [[Keep]] now."))
            .unwrap();
        let pruned = sync_mentions(&edited, scene, &config).unwrap();
        assert_eq!(pruned.removed.len(), 1);
        assert_eq!(pruned.registry.neighbors(scene), vec![keep]);
    }

    #[test]
    fn test_self_mention_ignored() {
        let mut registry = Registry::new();
        let unit = registry.create_unit(UnitContent::titled("Echo").with_body("[[Echo]]"));
        let synced = sync_mentions(&registry, unit, &EngineConfig::default()).unwrap();
        assert!(synced.created.is_empty());
        assert!(synced.unresolved.is_empty());
    }
}
