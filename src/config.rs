use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A forward label and its inverse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerbPair {
    pub verb: String,
    pub inverse: String,
}

impl VerbPair {
    pub fn new(verb: impl Into<String>, inverse: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            inverse: inverse.into(),
        }
    }
}

/// Labels the engine writes on relations and tree edges it generates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Labels {
    /// Tree edge label when no relation backs a parent/child pair
    pub contains: String,
    pub sequence: VerbPair,
    pub mention: VerbPair,
    /// Used by causal promotion when the promoted unit has no title
    pub causal: VerbPair,
    /// Inverse verb for relations built from a unit title
    pub fallback_inverse: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            contains: "contains".to_string(),
            sequence: VerbPair::new("sequenced to", "follows"),
            mention: VerbPair::new("mentions", "mentioned by"),
            causal: VerbPair::new("leads to", "results from"),
            fallback_inverse: "related to".to_string(),
        }
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub labels: Labels,

    /// Tag that makes a unit a tree root regardless of its parents
    pub force_root_tag: String,

    /// Title of the synthetic node joining all roots
    pub root_title: String,

    /// `internal_weight` given to freshly generated entities
    pub default_weight: f64,

    /// Promote units trapped in parentless cycles to extra roots
    pub rescue_unreachable: bool,

    /// Let sequence transition aggregates root the tree. Off keeps them
    /// out of the top level; they still appear wherever a container lists them.
    pub transition_roots: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            labels: Labels::default(),
            force_root_tag: "root".to_string(),
            root_title: "World".to_string(),
            default_weight: 1.0,
            rescue_unreachable: true,
            transition_roots: true,
        }
    }
}

impl EngineConfig {
    /// Parse from a JSON string; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config from: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.default_weight >= 0.0) {
            return Err(anyhow!(
                "default_weight must be a non-negative number, got {}",
                self.default_weight
            ));
        }

        let labels = [
            ("labels.contains", &self.labels.contains),
            ("labels.sequence.verb", &self.labels.sequence.verb),
            ("labels.sequence.inverse", &self.labels.sequence.inverse),
            ("labels.mention.verb", &self.labels.mention.verb),
            ("labels.mention.inverse", &self.labels.mention.inverse),
            ("labels.causal.verb", &self.labels.causal.verb),
            ("labels.causal.inverse", &self.labels.causal.inverse),
            ("labels.fallback_inverse", &self.labels.fallback_inverse),
            ("force_root_tag", &self.force_root_tag),
        ];
        for (field, value) in labels {
            if value.trim().is_empty() {
                return Err(anyhow!("{} must not be empty", field));
            }
        }

        Ok(())
    }
}
