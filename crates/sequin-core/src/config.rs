//! Configuration management for the pattern learning engine
//!
//! Handles loading and validation of `sequin.toml` configuration files.
//!
//! # Schema Overview
//!
//! - `general`: Log level and format
//! - `capture`: Enable flag, sequence length bounds, command vocabularies
//! - `store`: Backing file path, capacity, prune watermark
//! - `rules`: Validator rule set (length/occurrence/success thresholds)
//!
//! # Forward Compatibility
//!
//! All sections use `#[serde(default)]` to allow missing fields. Unknown
//! fields are ignored to support forward compatibility.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::logging::LogFormat;

/// Main configuration structure for the engine
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings (log level, format)
    pub general: GeneralConfig,

    /// Capture settings (buffering, vocabularies)
    pub capture: CaptureConfig,

    /// Pattern store settings (path, capacity)
    pub store: StoreConfig,

    /// Validator rule set
    pub rules: ValidationRules,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load_from(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }
}

/// General configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,

    /// Log format: pretty (human-readable) or json (machine-parseable)
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Master switch; when false, `capture_session` rejects all input
    pub enabled: bool,

    /// Minimum normalized sequence length for a capture to succeed
    pub min_sequence_length: usize,

    /// Maximum window length for offline sliding-window extraction
    pub max_window_length: usize,

    /// Key workflow commands: anchor classification and extraction windows
    pub key_commands: Vec<String>,

    /// Commands that terminate a buffered session and trigger extraction
    pub workflow_ending_commands: Vec<String>,

    /// Known-command vocabulary; commands outside it draw a validator warning
    pub known_commands: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let key_commands = vec![
            "create-next-story".to_string(),
            "validate-next-story".to_string(),
            "develop".to_string(),
            "review-qa".to_string(),
            "apply-qa-fixes".to_string(),
            "correct-course".to_string(),
        ];

        let mut known_commands = key_commands.clone();
        known_commands.extend(
            ["run-tests", "execute-checklist", "shard-doc", "explain", "halt"]
                .iter()
                .map(|s| (*s).to_string()),
        );

        Self {
            enabled: true,
            min_sequence_length: 3,
            max_window_length: 10,
            key_commands,
            workflow_ending_commands: vec![
                "apply-qa-fixes".to_string(),
                "correct-course".to_string(),
                "complete-story".to_string(),
            ],
            known_commands,
        }
    }
}

/// Pattern store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backing file path; `None` uses the platform data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Maximum number of persisted patterns
    pub max_patterns: usize,

    /// Fraction of `max_patterns` at which an automatic prune runs
    pub prune_threshold: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_patterns: 100,
            prune_threshold: 0.8,
        }
    }
}

impl StoreConfig {
    /// Resolve the backing file path, falling back to the platform default.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_store_path)
    }
}

/// Default backing store location under the platform data directory.
#[must_use]
pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sequin")
        .join("patterns.json")
}

/// Validator rule set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Sequences shorter than this are rejected
    pub min_sequence_length: usize,

    /// Sequences longer than this draw an "unusually long" warning
    pub max_sequence_length: usize,

    /// Occurrence count required for promotion readiness
    pub min_occurrences: u32,

    /// Success rate required for validity and promotion readiness
    pub min_success_rate: f64,

    /// Combined-similarity score at which a pattern counts as a duplicate
    pub duplicate_similarity_threshold: f64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_sequence_length: 3,
            max_sequence_length: 10,
            min_occurrences: 2,
            min_success_rate: 0.8,
            duplicate_similarity_threshold: 0.85,
        }
    }
}

/// Partial rule overrides; unset fields keep their current values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleOverrides {
    pub min_sequence_length: Option<usize>,
    pub max_sequence_length: Option<usize>,
    pub min_occurrences: Option<u32>,
    pub min_success_rate: Option<f64>,
    pub duplicate_similarity_threshold: Option<f64>,
}

impl ValidationRules {
    /// Merge overrides into this rule set without discarding unset fields.
    pub fn apply(&mut self, overrides: &RuleOverrides) {
        if let Some(v) = overrides.min_sequence_length {
            self.min_sequence_length = v;
        }
        if let Some(v) = overrides.max_sequence_length {
            self.max_sequence_length = v;
        }
        if let Some(v) = overrides.min_occurrences {
            self.min_occurrences = v;
        }
        if let Some(v) = overrides.min_success_rate {
            self.min_success_rate = v;
        }
        if let Some(v) = overrides.duplicate_similarity_threshold {
            self.duplicate_similarity_threshold = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml("").expect("parse empty TOML");
        assert!(config.capture.enabled);
        assert_eq!(config.capture.min_sequence_length, 3);
        assert_eq!(config.store.max_patterns, 100);
        assert!((config.store.prune_threshold - 0.8).abs() < f64::EPSILON);
        assert!((config.rules.min_success_rate - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let toml_str = r#"
            [store]
            max_patterns = 50

            [rules]
            duplicate_similarity_threshold = 0.9
        "#;
        let config = Config::from_toml(toml_str).expect("parse");
        assert_eq!(config.store.max_patterns, 50);
        assert!((config.rules.duplicate_similarity_threshold - 0.9).abs() < f64::EPSILON);
        // Untouched sections keep defaults
        assert_eq!(config.rules.min_sequence_length, 3);
        assert!(config.capture.enabled);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let result = Config::from_toml("store = nonsense [");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let toml_str = r#"
            [capture]
            enabled = false
            some_future_flag = true
        "#;
        let config = Config::from_toml(toml_str).expect("parse");
        assert!(!config.capture.enabled);
    }

    #[test]
    fn toml_roundtrip() {
        let config = Config::default();
        let serialized = config.to_toml().expect("serialize");
        let parsed = Config::from_toml(&serialized).expect("reparse");
        assert_eq!(parsed.store.max_patterns, config.store.max_patterns);
        assert_eq!(parsed.capture.key_commands, config.capture.key_commands);
    }

    #[test]
    fn rule_overrides_merge_without_discarding() {
        let mut rules = ValidationRules::default();
        rules.apply(&RuleOverrides {
            min_success_rate: Some(0.9),
            ..Default::default()
        });
        assert!((rules.min_success_rate - 0.9).abs() < f64::EPSILON);
        assert_eq!(rules.min_sequence_length, 3);
        assert_eq!(rules.max_sequence_length, 10);
    }
}
