use std::fmt;
use thiserror::Error;
use ulid::Ulid;

/// Which eligibility rule an operation tripped over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    AlreadyLink,
    AlreadyReified,
    NotALink,
    NotReified,
    ContainmentForbidsFlattening,
    NoContainerParent,
    TooFewNeighbors { found: usize },
    EndpointMissing(Ulid),
    EndpointNotNeighbor(Ulid),
    SelfEndpoint,
    StillHasChildren { count: usize },
    NotASequenceUnit(Ulid),
    NotAContainer(Ulid),
    DuplicateMember(Ulid),
    IndexOutOfRange { index: usize, len: usize },
    UnsupportedKind,
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligible::AlreadyLink => write!(f, "entity is already a link"),
            Ineligible::AlreadyReified => write!(f, "entity is already reified"),
            Ineligible::NotALink => write!(f, "entity is not a link"),
            Ineligible::NotReified => write!(f, "entity is not reified"),
            Ineligible::ContainmentForbidsFlattening => {
                write!(f, "containment kind does not allow flattening")
            }
            Ineligible::NoContainerParent => write!(f, "unit has no container parent"),
            Ineligible::TooFewNeighbors { found } => {
                write!(f, "unit has {found} neighbor(s), at least 2 required")
            }
            Ineligible::EndpointMissing(id) => write!(f, "endpoint {id} is not in the registry"),
            Ineligible::EndpointNotNeighbor(id) => write!(f, "endpoint {id} is not a neighbor"),
            Ineligible::SelfEndpoint => write!(f, "an endpoint cannot be the entity itself"),
            Ineligible::StillHasChildren { count } => write!(f, "entity still holds {count} child(ren)"),
            Ineligible::NotASequenceUnit(id) => write!(f, "{id} is not a sequence unit"),
            Ineligible::NotAContainer(id) => write!(f, "{id} is not a container"),
            Ineligible::DuplicateMember(id) => write!(f, "{id} appears more than once"),
            Ineligible::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for {len} member(s)")
            }
            Ineligible::UnsupportedKind => {
                write!(f, "a unit can only become a semantic or hierarchical relation")
            }
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("{operation}: precondition failed: {clause}")]
    PreconditionFailed {
        operation: &'static str,
        clause: Ineligible,
    },

    #[error("Entity not found: {0}")]
    NotFound(Ulid),
}

impl GraphError {
    pub(crate) fn precondition(operation: &'static str, clause: Ineligible) -> Self {
        GraphError::PreconditionFailed { operation, clause }
    }

    /// The failed clause, if this is a precondition failure
    pub fn clause(&self) -> Option<&Ineligible> {
        match self {
            GraphError::PreconditionFailed { clause, .. } => Some(clause),
            GraphError::NotFound(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
