//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [memory]                          # snapshot path
//! [memory.decay]                    # sweep cadence
//! [memory.decay.kinds.references]   # per-kind decay overrides
//! [memory.inference]                # relationship inference thresholds
//! [memory.moc]                      # map-of-content defaults
//! [logging]                         # tracing filter
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    /// Memory subsystem configuration.
    pub memory: Option<MemoryConfig>,

    /// Logging configuration.
    pub logging: Option<LoggingConfig>,
}

impl CairnConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: CairnConfig) {
        if other.memory.is_some() {
            self.memory = other.memory;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Memory config, falling back to defaults when the section is absent.
    pub fn memory_or_default(&self) -> MemoryConfig {
        self.memory.clone().unwrap_or_default()
    }

    /// Logging config, falling back to defaults when the section is absent.
    pub fn logging_or_default(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check value ranges across all present sections.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref memory) = self.memory {
            memory.validate()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Memory subsystem configuration.
///
/// ```toml
/// [memory]
/// snapshot = "graph.db"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Path to the SQLite file holding the persisted graph snapshot.
    /// Relative paths read from a file are anchored to that file's directory.
    /// Unset means the graph lives in memory only.
    pub snapshot: Option<PathBuf>,
    /// Relationship decay settings.
    pub decay: DecayConfig,
    /// Relationship inference settings.
    pub inference: InferenceConfig,
    /// Map-of-content generation defaults.
    pub moc: MocConfig,
}

impl MemoryConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        self.decay.validate()?;
        self.inference.validate()?;
        self.moc.validate()
    }
}

/// Built-in defaults for the decay tables.
pub mod defaults {
    /// Relationship kind names with built-in decay settings.
    pub const KIND_NAMES: [&str; 4] = ["references", "tagged-with", "co-occurs", "derived-from"];

    /// Seconds between background decay sweeps.
    pub const SWEEP_INTERVAL_SECS: u64 = 3600;

    /// Strength below which a relationship is pruned.
    pub const MIN_STRENGTH: f64 = 0.05;

    /// Strength added when an existing relationship is observed again.
    pub const REINFORCEMENT_BOOST: f64 = 0.2;

    /// Strength of a relationship created from a single observation.
    pub const INITIAL_STRENGTH: f64 = 0.5;

    /// Half-life in days for a kind name.
    ///
    /// Explicit mentions fade slowest; co-occurrence is the most transient.
    pub fn half_life_days(kind: &str) -> f64 {
        match kind {
            "references" => 30.0,
            "tagged-with" => 14.0,
            "co-occurs" => 7.0,
            "derived-from" => 90.0,
            _ => 30.0,
        }
    }
}

/// Relationship decay configuration.
///
/// ```toml
/// [memory.decay]
/// sweep_interval_secs = 3600
/// lazy_interval_secs = 300
///
/// [memory.decay.kinds.co-occurs]
/// half_life_days = 3.5
/// min_strength = 0.1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Seconds between background sweeps.
    pub sweep_interval_secs: u64,
    /// When set, queries sweep first if the last sweep is older than this.
    pub lazy_interval_secs: Option<u64>,
    /// Per-kind overrides keyed by kind name.
    pub kinds: BTreeMap<String, KindDecayConfig>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: defaults::SWEEP_INTERVAL_SECS,
            lazy_interval_secs: None,
            kinds: BTreeMap::new(),
        }
    }
}

impl DecayConfig {
    /// Resolve the settings for a kind, filling unset fields from defaults.
    pub fn resolve(&self, kind: &str) -> KindDecaySettings {
        let overrides = self.kinds.get(kind).cloned().unwrap_or_default();
        KindDecaySettings {
            half_life_days: overrides
                .half_life_days
                .unwrap_or_else(|| defaults::half_life_days(kind)),
            min_strength: overrides.min_strength.unwrap_or(defaults::MIN_STRENGTH),
            reinforcement_boost: overrides
                .reinforcement_boost
                .unwrap_or(defaults::REINFORCEMENT_BOOST),
            initial_strength: overrides
                .initial_strength
                .unwrap_or(defaults::INITIAL_STRENGTH),
        }
    }

    /// Check value ranges for every configured kind.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "memory.decay.sweep_interval_secs",
                "must be greater than zero",
            ));
        }
        for name in self.kinds.keys() {
            self.resolve(name).validate(name)?;
        }
        Ok(())
    }
}

/// Per-kind decay overrides. Unset fields use the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindDecayConfig {
    /// Days for strength to halve without reinforcement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub half_life_days: Option<f64>,
    /// Strength below which the relationship is pruned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_strength: Option<f64>,
    /// Strength added on reinforcement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reinforcement_boost: Option<f64>,
    /// Strength of a newly observed relationship.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_strength: Option<f64>,
}

/// Fully resolved decay settings for one relationship kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindDecaySettings {
    pub half_life_days: f64,
    pub min_strength: f64,
    pub reinforcement_boost: f64,
    pub initial_strength: f64,
}

impl KindDecaySettings {
    fn validate(&self, kind: &str) -> Result<()> {
        let field = |name: &str| format!("memory.decay.kinds.{}.{}", kind, name);

        if !(self.half_life_days.is_finite() && self.half_life_days > 0.0) {
            return Err(ConfigError::invalid(
                field("half_life_days"),
                format!("must be a positive number, got {}", self.half_life_days),
            ));
        }
        check_unit(&field("min_strength"), self.min_strength)?;
        check_unit(&field("reinforcement_boost"), self.reinforcement_boost)?;
        check_unit(&field("initial_strength"), self.initial_strength)
    }
}

/// Relationship inference configuration.
///
/// ```toml
/// [memory.inference]
/// label_similarity_threshold = 0.85
/// max_label_matches = 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Minimum normalized label similarity (0.0–1.0) for a `references` proposal.
    pub label_similarity_threshold: f64,
    /// Maximum `references` proposals kept per upsert.
    pub max_label_matches: usize,
    /// Tag overlap fraction that must be exceeded for a `tagged-with` proposal.
    pub min_tag_overlap: f64,
    /// Minimum combined score for connection suggestions.
    pub suggestion_threshold: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            label_similarity_threshold: 0.85,
            max_label_matches: 10,
            min_tag_overlap: 0.0,
            suggestion_threshold: 0.3,
        }
    }
}

impl InferenceConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        check_unit(
            "memory.inference.label_similarity_threshold",
            self.label_similarity_threshold,
        )?;
        check_unit("memory.inference.min_tag_overlap", self.min_tag_overlap)?;
        check_unit(
            "memory.inference.suggestion_threshold",
            self.suggestion_threshold,
        )
    }
}

/// Map-of-content defaults.
///
/// ```toml
/// [memory.moc]
/// max_depth = 2
/// min_strength = 0.1
/// max_entries = 50
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MocConfig {
    /// Traversal depth from the root.
    pub max_depth: usize,
    /// Edges weaker than this are not followed.
    pub min_strength: f64,
    /// Maximum number of entries listed in one document.
    pub max_entries: usize,
}

impl Default for MocConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            min_strength: 0.1,
            max_entries: 50,
        }
    }
}

impl MocConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        check_unit("memory.moc.min_strength", self.min_strength)?;
        if self.max_entries == 0 {
            return Err(ConfigError::invalid(
                "memory.moc.max_entries",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration.
///
/// ```toml
/// [logging]
/// filter = "cairn_memory=debug,info"
/// json = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "cairn_memory=info,cairn_config=info,warn".to_string(),
            json: false,
        }
    }
}

fn check_unit(field: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be within [0.0, 1.0], got {}", value),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
