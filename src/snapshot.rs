use crate::entity::Entity;
use crate::validation::{ValidationSeverity, Validator};
use crate::Registry;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

pub const SNAPSHOT_VERSION: &str = "0.1.0";

/// Header written in front of every snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: String,
    pub saved_at: DateTime<Utc>,
    pub entity_count: usize,
}

impl Manifest {
    pub fn for_registry(registry: &Registry) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            saved_at: Utc::now(),
            entity_count: registry.len(),
        }
    }
}

/// On-disk form of a registry
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    manifest: Manifest,
    entities: Vec<Entity>,
}

impl SnapshotFile {
    fn from_registry(registry: &Registry) -> Self {
        let mut entities: Vec<Entity> = registry.entities().cloned().collect();
        entities.sort_by_key(Entity::id);
        Self {
            manifest: Manifest::for_registry(registry),
            entities,
        }
    }

    fn into_registry(self) -> Result<Registry> {
        let mut seen = HashSet::with_capacity(self.entities.len());
        for entity in &self.entities {
            if !seen.insert(entity.id()) {
                return Err(anyhow!("Duplicate entity id in snapshot: {}", entity.id()));
            }
        }
        Ok(Registry::from_entities(self.entities))
    }
}

/// Write `registry` as pretty JSON, entities sorted by id
pub fn save_snapshot(path: &Path, registry: &Registry) -> Result<Manifest> {
    let snapshot = SnapshotFile::from_registry(registry);

    let file = File::create(path)
        .with_context(|| format!("Failed to create snapshot file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &snapshot)
        .with_context(|| format!("Failed to write snapshot to: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush snapshot: {}", path.display()))?;

    info!(path = %path.display(), entities = snapshot.manifest.entity_count, "snapshot saved");
    Ok(snapshot.manifest)
}

/// Read a snapshot back. Integrity problems are logged, not fatal;
/// duplicate ids are.
pub fn load_snapshot(path: &Path) -> Result<(Manifest, Registry)> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open snapshot file: {}", path.display()))?;
    let reader = BufReader::new(file);
    let snapshot: SnapshotFile = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse snapshot from: {}", path.display()))?;

    if snapshot.manifest.entity_count != snapshot.entities.len() {
        warn!(
            declared = snapshot.manifest.entity_count,
            found = snapshot.entities.len(),
            "snapshot manifest entity count mismatch"
        );
    }

    let manifest = snapshot.manifest.clone();
    let registry = snapshot
        .into_registry()
        .with_context(|| format!("Corrupt snapshot: {}", path.display()))?;

    let report = Validator::validate(&registry);
    for issue in &report.issues {
        match issue.severity {
            ValidationSeverity::Error | ValidationSeverity::Warning => {
                warn!(kind = ?issue.issue_type, "{}", issue.message)
            }
            ValidationSeverity::Info => {}
        }
    }

    info!(path = %path.display(), entities = registry.len(), "snapshot loaded");
    Ok((manifest, registry))
}
