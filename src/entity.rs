use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ulid::Ulid;

/// Bookkeeping carried by every registry entity, unit or relation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityMeta {
    /// Globally unique, never changes for the lifetime of the entity
    pub id: Ulid,

    pub created_at: DateTime<Utc>,

    /// Bumped on every in-place edit, never earlier than `created_at`
    pub last_modified: DateTime<Utc>,

    /// Relative importance scalar (>= 0)
    pub internal_weight: f64,

    /// Cached aggregate maintained by layout collaborators
    pub subtree_mass: f64,

    /// Relations incident to this entity, kept for fast lookup
    pub relation_ids: BTreeSet<Ulid>,
}

impl EntityMeta {
    /// Create metadata with a fresh id
    pub fn new() -> Self {
        Self::with_id(Ulid::new())
    }

    /// Create metadata with a specific id (useful for testing)
    pub fn with_id(id: Ulid) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_modified: now,
            internal_weight: 1.0,
            subtree_mass: 0.0,
            relation_ids: BTreeSet::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.internal_weight = weight;
        self
    }

    /// Record an in-place modification
    pub fn touch(&mut self) {
        self.last_modified = Utc::now().max(self.created_at);
    }

    /// Copy of this metadata under a brand new id, as used when an entity
    /// changes shape and its old id is retired. Everything else carries over.
    pub fn reissue(&self) -> Self {
        let mut meta = self.clone();
        meta.id = Ulid::new();
        meta.touch();
        meta
    }
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Text payload shared by every node-like entity
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UnitContent {
    pub title: String,
    pub gist: String,
    pub body: String,
    pub category: Option<String>,
    pub aliases: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

impl UnitContent {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Case-insensitive match against the title or any alias
    pub fn answers_to(&self, name: &str) -> bool {
        self.title.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// How a container holds its children
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ContainmentKind {
    /// Ad-hoc grouping; dissolving it loses nothing structural
    #[default]
    Loose,
    /// Part/whole nesting (a region inside a country)
    Nested,
    /// Ordered narrative structure (book, chapter, scene)
    Narrative,
}

impl ContainmentKind {
    /// Whether a container of this kind may be flattened into a relation
    pub fn permits_flattening(&self) -> bool {
        matches!(self, ContainmentKind::Loose)
    }
}

/// Preferred presentation of a container's children
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LayoutKind {
    #[default]
    Tree,
    Timeline,
    Board,
}

/// Ordered children of a container
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerFields {
    /// Ordered, duplicate-free
    pub children_ids: Vec<Ulid>,
    pub containment: ContainmentKind,
    pub collapsed: bool,
    pub layout: LayoutKind,
}

impl ContainerFields {
    pub fn of_kind(containment: ContainmentKind) -> Self {
        Self {
            containment,
            ..Self::default()
        }
    }

    /// Append a child unless already present. Returns true if added.
    pub fn add_child(&mut self, child_id: Ulid) -> bool {
        if self.children_ids.contains(&child_id) {
            return false;
        }
        self.children_ids.push(child_id);
        true
    }

    /// Insert a child at `index` (clamped), moving it if already present
    pub fn insert_child(&mut self, index: usize, child_id: Ulid) {
        self.children_ids.retain(|c| *c != child_id);
        let index = index.min(self.children_ids.len());
        self.children_ids.insert(index, child_id);
    }

    pub fn remove_child(&mut self, child_id: Ulid) -> bool {
        let before = self.children_ids.len();
        self.children_ids.retain(|c| *c != child_id);
        before != self.children_ids.len()
    }

    pub fn has_child(&self, child_id: Ulid) -> bool {
        self.children_ids.contains(&child_id)
    }
}

/// Drafting lifecycle of a story beat
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SequenceStatus {
    #[default]
    Idea,
    Outlined,
    Drafted,
    Revised,
    Final,
}

/// Ordering and narrative data of a sequence unit (chapter, scene)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SequenceFields {
    /// 1-based index among siblings, rewritten by the relinker
    pub position: u32,
    pub tension: f64,
    pub status: SequenceStatus,
    pub pov_id: Option<Ulid>,
    /// Nested outline payload, opaque here
    pub blueprint: Option<serde_json::Value>,
}

/// Direction flavour of a hierarchical relation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HierarchyKind {
    ParentOf,
    PartOf,
}

/// Semantic flavour of a relation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RelationKind {
    #[default]
    Plain,
    /// Untyped associative edge ("mentions")
    Semantic,
    /// Source is the parent of target
    Hierarchical(HierarchyKind),
}

impl RelationKind {
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, RelationKind::Hierarchical(_))
    }
}

/// Marks relations generated by the engine so they can be found again
/// without looking at verbs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LinkMarker {
    SequenceTransition,
    Mention,
}

/// Endpoints and labels of an edge-like entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkFields {
    pub source_id: Ulid,
    pub target_id: Ulid,
    /// Forward label
    pub verb: String,
    pub inverse_verb: String,
    pub kind: RelationKind,
    pub marker: Option<LinkMarker>,
}

impl LinkFields {
    pub fn new(
        source_id: Ulid,
        target_id: Ulid,
        verb: impl Into<String>,
        inverse_verb: impl Into<String>,
        kind: RelationKind,
    ) -> Self {
        Self {
            source_id,
            target_id,
            verb: verb.into(),
            inverse_verb: inverse_verb.into(),
            kind,
            marker: None,
        }
    }

    pub fn with_marker(mut self, marker: LinkMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Check if this link touches a given entity at either end
    pub fn involves(&self, id: Ulid) -> bool {
        self.source_id == id || self.target_id == id
    }

    /// The endpoint opposite to `from`
    pub fn other_end(&self, from: Ulid) -> Option<Ulid> {
        if from == self.source_id {
            Some(self.target_id)
        } else if from == self.target_id {
            Some(self.source_id)
        } else {
            None
        }
    }

    /// Replace every endpoint equal to `old` with `new`. Returns true if changed.
    pub fn repoint(&mut self, old: Ulid, new: Ulid) -> bool {
        let mut changed = false;
        if self.source_id == old {
            self.source_id = new;
            changed = true;
        }
        if self.target_id == old {
            self.target_id = new;
            changed = true;
        }
        changed
    }
}

/// Plain note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub meta: EntityMeta,
    pub content: UnitContent,
}

impl Unit {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            content: UnitContent::titled(title),
        }
    }
}

/// Note holding an ordered list of children
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerUnit {
    pub meta: EntityMeta,
    pub content: UnitContent,
    pub container: ContainerFields,
}

impl ContainerUnit {
    pub fn new(title: impl Into<String>, containment: ContainmentKind) -> Self {
        Self {
            meta: EntityMeta::new(),
            content: UnitContent::titled(title),
            container: ContainerFields::of_kind(containment),
        }
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Ulid>) -> Self {
        for child in children {
            self.container.add_child(child);
        }
        self
    }
}

/// Story beat: a container that also has a place in an ordered sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceUnit {
    pub meta: EntityMeta,
    pub content: UnitContent,
    pub container: ContainerFields,
    pub sequence: SequenceFields,
}

impl SequenceUnit {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::new(),
            content: UnitContent::titled(title),
            container: ContainerFields::of_kind(ContainmentKind::Narrative),
            sequence: SequenceFields::default(),
        }
    }
}

/// Edge between two registry entries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub meta: EntityMeta,
    pub link: LinkFields,
}

impl Relation {
    pub fn new(link: LinkFields) -> Self {
        Self {
            meta: EntityMeta::new(),
            link,
        }
    }
}

/// A relation with enough substance to hold children and be visited as a
/// place. Link-shaped and container-shaped at the same time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedRelation {
    pub meta: EntityMeta,
    pub link: LinkFields,
    pub content: UnitContent,
    pub container: ContainerFields,
    /// Always true once set
    pub is_reified: bool,
}

/// Any registry entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Entity {
    Unit(Unit),
    Container(ContainerUnit),
    Sequence(SequenceUnit),
    Relation(Relation),
    Aggregated(AggregatedRelation),
}

impl Entity {
    pub fn id(&self) -> Ulid {
        self.meta().id
    }

    pub fn meta(&self) -> &EntityMeta {
        match self {
            Entity::Unit(e) => &e.meta,
            Entity::Container(e) => &e.meta,
            Entity::Sequence(e) => &e.meta,
            Entity::Relation(e) => &e.meta,
            Entity::Aggregated(e) => &e.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut EntityMeta {
        match self {
            Entity::Unit(e) => &mut e.meta,
            Entity::Container(e) => &mut e.meta,
            Entity::Sequence(e) => &mut e.meta,
            Entity::Relation(e) => &mut e.meta,
            Entity::Aggregated(e) => &mut e.meta,
        }
    }

    /// Title, gist and body, if the entity is node-like
    pub fn content(&self) -> Option<&UnitContent> {
        match self {
            Entity::Unit(e) => Some(&e.content),
            Entity::Container(e) => Some(&e.content),
            Entity::Sequence(e) => Some(&e.content),
            Entity::Aggregated(e) => Some(&e.content),
            Entity::Relation(_) => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut UnitContent> {
        match self {
            Entity::Unit(e) => Some(&mut e.content),
            Entity::Container(e) => Some(&mut e.content),
            Entity::Sequence(e) => Some(&mut e.content),
            Entity::Aggregated(e) => Some(&mut e.content),
            Entity::Relation(_) => None,
        }
    }

    /// Child list, if the entity has one
    pub fn container(&self) -> Option<&ContainerFields> {
        match self {
            Entity::Container(e) => Some(&e.container),
            Entity::Sequence(e) => Some(&e.container),
            Entity::Aggregated(e) => Some(&e.container),
            Entity::Unit(_) | Entity::Relation(_) => None,
        }
    }

    pub fn container_mut(&mut self) -> Option<&mut ContainerFields> {
        match self {
            Entity::Container(e) => Some(&mut e.container),
            Entity::Sequence(e) => Some(&mut e.container),
            Entity::Aggregated(e) => Some(&mut e.container),
            Entity::Unit(_) | Entity::Relation(_) => None,
        }
    }

    pub fn sequence(&self) -> Option<&SequenceFields> {
        match self {
            Entity::Sequence(e) => Some(&e.sequence),
            _ => None,
        }
    }

    pub fn sequence_mut(&mut self) -> Option<&mut SequenceFields> {
        match self {
            Entity::Sequence(e) => Some(&mut e.sequence),
            _ => None,
        }
    }

    /// Endpoints and labels, if the entity is edge-like
    pub fn link(&self) -> Option<&LinkFields> {
        match self {
            Entity::Relation(e) => Some(&e.link),
            Entity::Aggregated(e) => Some(&e.link),
            _ => None,
        }
    }

    pub fn link_mut(&mut self) -> Option<&mut LinkFields> {
        match self {
            Entity::Relation(e) => Some(&mut e.link),
            Entity::Aggregated(e) => Some(&mut e.link),
            _ => None,
        }
    }

    fn reified_flag(&self) -> bool {
        match self {
            Entity::Aggregated(e) => e.is_reified,
            _ => false,
        }
    }

    pub fn children(&self) -> Option<&[Ulid]> {
        self.container().map(|c| c.children_ids.as_slice())
    }

    pub fn endpoints(&self) -> Option<(Ulid, Ulid)> {
        self.link().map(|l| (l.source_id, l.target_id))
    }

    pub fn title(&self) -> Option<&str> {
        self.content().map(|c| c.title.as_str())
    }

    /// Short shape name for display metadata
    pub fn shape_name(&self) -> &'static str {
        match self {
            Entity::Unit(_) => "unit",
            Entity::Container(_) => "container",
            Entity::Sequence(_) => "sequence",
            Entity::Relation(_) => "relation",
            Entity::Aggregated(_) => "aggregated",
        }
    }
}

impl From<Unit> for Entity {
    fn from(value: Unit) -> Self {
        Entity::Unit(value)
    }
}

impl From<ContainerUnit> for Entity {
    fn from(value: ContainerUnit) -> Self {
        Entity::Container(value)
    }
}

impl From<SequenceUnit> for Entity {
    fn from(value: SequenceUnit) -> Self {
        Entity::Sequence(value)
    }
}

impl From<Relation> for Entity {
    fn from(value: Relation) -> Self {
        Entity::Relation(value)
    }
}

impl From<AggregatedRelation> for Entity {
    fn from(value: AggregatedRelation) -> Self {
        Entity::Aggregated(value)
    }
}

/// True iff the entity has a child-id sequence
pub fn is_container(entity: &Entity) -> bool {
    entity.children().is_some()
}

/// True iff the entity has both a source and a target
pub fn is_link(entity: &Entity) -> bool {
    entity.endpoints().is_some()
}

/// True iff the entity carries the reified flag
pub fn is_reified(entity: &Entity) -> bool {
    entity.reified_flag()
}
