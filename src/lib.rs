// Story Graph - Core Library

pub mod config;
pub mod entity;
pub mod error;
pub mod hierarchy;
pub mod mentions;
pub mod registry;
pub mod reify;
pub mod sequence;
pub mod snapshot;
pub mod validation;

// Re-export main types for convenience
pub use config::{EngineConfig, Labels, VerbPair};
pub use entity::{
    is_container, is_link, is_reified, AggregatedRelation, ContainerFields, ContainerUnit,
    ContainmentKind, Entity, EntityMeta, HierarchyKind, LayoutKind, LinkFields, LinkMarker,
    Relation, RelationKind, SequenceFields, SequenceStatus, SequenceUnit, Unit, UnitContent,
};
pub use error::{GraphError, Ineligible, Result};
pub use hierarchy::{materialize_tree, DisplayNode, DisplayTree, EdgeLabel, RootPolicy};
pub use mentions::{parse_mentions, resolve_mention, sync_mentions, Mention, MentionSync};
pub use registry::{container_parents, delete_entity, Registry};
pub use reify::{dissolve_aggregate, reify_causal, reify_node, reify_relation, Reified};
pub use sequence::{
    append_to_sequence, move_in_sequence, relink, remove_from_sequence, sequence_members,
    swap_adjacent,
};
pub use snapshot::{load_snapshot, save_snapshot, Manifest};
pub use validation::{
    build_hierarchy_map, find_consistency_drift, find_dangling_references, Drift, DriftKind,
    ValidatedRegistry, ValidationIssue, ValidationIssueType, ValidationResult, ValidationSeverity,
    Validator,
};
