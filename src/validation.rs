use crate::entity::is_container;
use crate::Registry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use ulid::Ulid;

/// Validation severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationSeverity {
    Info,    // advisory, usually harmless drift
    Warning, // likely a mistake, views still render
    Error,   // broken invariant
}

/// Validation issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
    pub affected: Vec<Ulid>,
    pub issue_type: ValidationIssueType,
}

/// Types of validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssueType {
    IdMismatch,
    DanglingReference,
    DanglingChild,
    DuplicateChild,
    ConsistencyDrift,
    TimestampOrder,
    NegativeWeight,
}

/// Which side of a hierarchy pair is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftKind {
    /// Hierarchical relation exists but the parent's child list lacks the child
    MissingChildEntry,
    /// Child list entry exists but no hierarchical relation backs it
    MissingRelation,
}

/// A parent/child pair witnessed by only one of its two sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drift {
    pub parent: Ulid,
    pub child: Ulid,
    pub relation_id: Option<Ulid>,
    pub kind: DriftKind,
}

/// Complete validation result
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add_issue(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Warning)
    }

    fn with_severity(&self, severity: ValidationSeverity) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == severity).collect()
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.with_severity(ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.with_severity(ValidationSeverity::Warning)
    }

    pub fn info(&self) -> Vec<&ValidationIssue> {
        self.with_severity(ValidationSeverity::Info)
    }

    pub fn of_type(&self, issue_type: ValidationIssueType) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.issue_type == issue_type).collect()
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }
}

/// Parents of every unit, discovered from hierarchical relations and from
/// container child lists. One witness from either source is enough.
pub fn build_hierarchy_map(registry: &Registry) -> HashMap<Ulid, Vec<Ulid>> {
    let mut map: HashMap<Ulid, Vec<Ulid>> = HashMap::new();
    let mut push = |child: Ulid, parent: Ulid| {
        let parents = map.entry(child).or_default();
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    };

    for entity in registry.entities() {
        if let Some(link) = entity.link() {
            if link.kind.is_hierarchical() {
                push(link.target_id, link.source_id);
            }
        }
        if let Some(children) = entity.children() {
            for child in children {
                push(*child, entity.id());
            }
        }
    }

    for parents in map.values_mut() {
        parents.sort();
    }
    map
}

/// Links whose source or target is absent from the registry
pub fn find_dangling_references(registry: &Registry) -> Vec<Ulid> {
    let mut dangling: Vec<Ulid> = registry
        .links()
        .filter(|(_, link)| !registry.contains(link.source_id) || !registry.contains(link.target_id))
        .map(|(entity, _)| entity.id())
        .collect();
    dangling.sort();
    dangling
}

/// Hierarchy pairs where the relation and the child list disagree
pub fn find_consistency_drift(registry: &Registry) -> Vec<Drift> {
    let mut drift = Vec::new();
    let mut related: HashSet<(Ulid, Ulid)> = HashSet::new();

    for (entity, link) in registry.links() {
        if !link.kind.is_hierarchical() {
            continue;
        }
        related.insert((link.source_id, link.target_id));
        let Some(parent) = registry.get(link.source_id) else {
            continue;
        };
        if let Some(children) = parent.children() {
            if !children.contains(&link.target_id) {
                drift.push(Drift {
                    parent: link.source_id,
                    child: link.target_id,
                    relation_id: Some(entity.id()),
                    kind: DriftKind::MissingChildEntry,
                });
            }
        }
    }

    for entity in registry.entities().filter(|e| is_container(e)) {
        for child in entity.children().unwrap_or_default() {
            if !related.contains(&(entity.id(), *child)) {
                drift.push(Drift {
                    parent: entity.id(),
                    child: *child,
                    relation_id: None,
                    kind: DriftKind::MissingRelation,
                });
            }
        }
    }

    drift.sort_by_key(|d| (d.parent, d.child));
    drift
}

/// Read-only checker for registry snapshots. Never repairs anything.
pub struct Validator;

impl Validator {
    /// Run all validations on a registry
    pub fn validate(registry: &Registry) -> ValidationResult {
        let mut result = ValidationResult::new();

        for (key, entity) in registry.iter() {
            if *key != entity.id() {
                result.add_issue(ValidationIssue {
                    severity: ValidationSeverity::Error,
                    message: format!("Registry key {} holds entity {}", key, entity.id()),
                    affected: vec![*key, entity.id()],
                    issue_type: ValidationIssueType::IdMismatch,
                });
            }

            let meta = entity.meta();
            if meta.last_modified < meta.created_at {
                result.add_issue(ValidationIssue {
                    severity: ValidationSeverity::Error,
                    message: format!("{} was modified before it was created", meta.id),
                    affected: vec![meta.id],
                    issue_type: ValidationIssueType::TimestampOrder,
                });
            }
            if !(meta.internal_weight >= 0.0) || !(meta.subtree_mass >= 0.0) {
                result.add_issue(ValidationIssue {
                    severity: ValidationSeverity::Warning,
                    message: format!(
                        "{} has weight {} and mass {}; both must be non-negative",
                        meta.id, meta.internal_weight, meta.subtree_mass
                    ),
                    affected: vec![meta.id],
                    issue_type: ValidationIssueType::NegativeWeight,
                });
            }

            if let Some(children) = entity.children() {
                Self::check_children(registry, entity.id(), children, &mut result);
            }
        }

        let dangling = find_dangling_references(registry);
        if !dangling.is_empty() {
            result.add_issue(ValidationIssue {
                severity: ValidationSeverity::Warning,
                message: format!(
                    "{} relation(s) point at entities that no longer exist",
                    dangling.len()
                ),
                affected: dangling,
                issue_type: ValidationIssueType::DanglingReference,
            });
        }

        for d in find_consistency_drift(registry) {
            let (severity, message) = match d.kind {
                DriftKind::MissingChildEntry => (
                    ValidationSeverity::Warning,
                    format!("{} is related as child of {} but not listed in it", d.child, d.parent),
                ),
                DriftKind::MissingRelation => (
                    ValidationSeverity::Info,
                    format!("{} lists {} without a hierarchical relation", d.parent, d.child),
                ),
            };
            let mut affected = vec![d.parent, d.child];
            affected.extend(d.relation_id);
            result.add_issue(ValidationIssue {
                severity,
                message,
                affected,
                issue_type: ValidationIssueType::ConsistencyDrift,
            });
        }

        result
    }

    fn check_children(
        registry: &Registry,
        parent: Ulid,
        children: &[Ulid],
        result: &mut ValidationResult,
    ) {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let mut missing = Vec::new();

        for child in children {
            if !seen.insert(*child) && !duplicates.contains(child) {
                duplicates.push(*child);
            }
            if !registry.contains(*child) && !missing.contains(child) {
                missing.push(*child);
            }
        }

        if !duplicates.is_empty() {
            let mut affected = vec![parent];
            affected.extend(&duplicates);
            result.add_issue(ValidationIssue {
                severity: ValidationSeverity::Error,
                message: format!("{} lists {} child(ren) more than once", parent, duplicates.len()),
                affected,
                issue_type: ValidationIssueType::DuplicateChild,
            });
        }

        if !missing.is_empty() {
            let mut affected = vec![parent];
            affected.extend(&missing);
            result.add_issue(ValidationIssue {
                severity: ValidationSeverity::Warning,
                message: format!("{} lists {} child(ren) not in the registry", parent, missing.len()),
                affected,
                issue_type: ValidationIssueType::DanglingChild,
            });
        }
    }
}

/// Extension trait for Registry to add validation
pub trait ValidatedRegistry {
    fn validate(&self) -> ValidationResult;

    /// Highest severity reported against each entity
    fn entities_with_issues(&self, result: &ValidationResult) -> HashMap<Ulid, ValidationSeverity>;
}

impl ValidatedRegistry for Registry {
    fn validate(&self) -> ValidationResult {
        Validator::validate(self)
    }

    fn entities_with_issues(&self, result: &ValidationResult) -> HashMap<Ulid, ValidationSeverity> {
        let mut entities = HashMap::new();

        for issue in &result.issues {
            for id in &issue.affected {
                entities
                    .entry(*id)
                    .and_modify(|severity: &mut ValidationSeverity| {
                        if issue.severity > *severity {
                            *severity = issue.severity;
                        }
                    })
                    .or_insert(issue.severity);
            }
        }

        entities
    }
}
