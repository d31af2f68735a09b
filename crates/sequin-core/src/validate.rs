//! Candidate pattern validation
//!
//! Pure functions over a candidate pattern record; no state beyond the
//! active rule set, no I/O. Decides whether a candidate is well-formed and
//! worth persisting, and whether it duplicates an existing pattern.
//!
//! Malformed input is always reported through structured reports; nothing
//! here returns an error or panics.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::config::{CaptureConfig, Config, RuleOverrides, ValidationRules};
use crate::pattern::Pattern;
use crate::similarity::combined_score;

/// Outcome of a well-formedness check.
///
/// `errors` make the candidate invalid; `warnings` are advisory and never
/// affect `valid`. `reason` mirrors the first error for quick display.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub reason: Option<String>,
}

/// Outcome of a duplicate check against a set of existing patterns.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    /// Id of the matched existing pattern, when a duplicate was found
    pub duplicate_of: Option<String>,
    /// True when the sequences are element-wise identical
    pub exact: bool,
    /// Best combined similarity score; not reported for exact matches
    pub similarity: Option<f64>,
}

impl DuplicateCheck {
    fn not_a_duplicate() -> Self {
        Self {
            is_duplicate: false,
            duplicate_of: None,
            exact: false,
            similarity: None,
        }
    }
}

/// Promotion-readiness check against configured minimums.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdCheck {
    pub meets_threshold: bool,
    pub meets_occurrences: bool,
    pub meets_success_rate: bool,
    pub current_occurrences: u32,
    pub required_occurrences: u32,
    pub current_success_rate: f64,
    pub required_success_rate: f64,
}

/// Stateless validator over candidate patterns.
#[derive(Debug, Clone)]
pub struct Validator {
    rules: ValidationRules,
    key_commands: HashSet<String>,
    known_commands: HashSet<String>,
}

impl Validator {
    /// Build a validator from a rule set and command vocabularies.
    #[must_use]
    pub fn new(
        rules: ValidationRules,
        key_commands: impl IntoIterator<Item = String>,
        known_commands: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            rules,
            key_commands: key_commands.into_iter().collect(),
            known_commands: known_commands.into_iter().collect(),
        }
    }

    /// Build a validator from engine configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::from_parts(&config.rules, &config.capture)
    }

    /// Build a validator from the rule and capture sections.
    #[must_use]
    pub fn from_parts(rules: &ValidationRules, capture: &CaptureConfig) -> Self {
        Self::new(
            rules.clone(),
            capture.key_commands.iter().cloned(),
            capture.known_commands.iter().cloned(),
        )
    }

    /// Check a candidate pattern for well-formedness.
    #[must_use]
    pub fn validate(&self, pattern: &Pattern) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if pattern.sequence.len() < self.rules.min_sequence_length {
            errors.push(format!(
                "sequence too short: {} commands (minimum {})",
                pattern.sequence.len(),
                self.rules.min_sequence_length
            ));
        }

        if pattern.success_rate < self.rules.min_success_rate {
            errors.push(format!(
                "success rate {:.2} below minimum {:.2}",
                pattern.success_rate, self.rules.min_success_rate
            ));
        }

        if !pattern
            .sequence
            .iter()
            .any(|c| self.key_commands.contains(c.as_str()))
        {
            errors.push("sequence contains no key workflow commands".to_string());
        }

        if pattern.sequence.len() > self.rules.max_sequence_length {
            warnings.push(format!(
                "unusually long sequence: {} commands (soft maximum {})",
                pattern.sequence.len(),
                self.rules.max_sequence_length
            ));
        }

        if pattern.occurrences < self.rules.min_occurrences {
            warnings.push(format!(
                "low occurrences: {} (minimum for promotion {})",
                pattern.occurrences, self.rules.min_occurrences
            ));
        }

        let unknown: Vec<&str> = pattern
            .sequence
            .iter()
            .filter(|c| !self.known_commands.contains(c.as_str()))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            warnings.push(format!("unknown commands: {}", unknown.join(", ")));
        }

        if pattern
            .sequence
            .windows(2)
            .any(|pair| pair[0] == pair[1])
        {
            warnings.push("duplicate consecutive commands".to_string());
        }

        let valid = errors.is_empty();
        let reason = errors.first().cloned();

        if !valid {
            debug!(pattern_id = %pattern.id, ?errors, "Candidate rejected");
        }

        ValidationReport {
            valid,
            errors,
            warnings,
            reason,
        }
    }

    /// Check whether a candidate duplicates any existing pattern.
    ///
    /// Exact element-wise sequence equality short-circuits; otherwise the
    /// best combined Jaccard/order-match score across `existing` is compared
    /// against the configured threshold.
    #[must_use]
    pub fn is_duplicate(&self, pattern: &Pattern, existing: &[Pattern]) -> DuplicateCheck {
        if existing.is_empty() {
            return DuplicateCheck::not_a_duplicate();
        }

        if let Some(found) = existing.iter().find(|p| p.sequence == pattern.sequence) {
            return DuplicateCheck {
                is_duplicate: true,
                duplicate_of: Some(found.id.clone()),
                exact: true,
                similarity: None,
            };
        }

        let mut best: Option<(&Pattern, f64)> = None;
        for candidate in existing {
            let score = combined_score(&pattern.sequence, &candidate.sequence);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((found, score)) if score >= self.rules.duplicate_similarity_threshold => {
                DuplicateCheck {
                    is_duplicate: true,
                    duplicate_of: Some(found.id.clone()),
                    exact: false,
                    similarity: Some(score),
                }
            }
            _ => DuplicateCheck::not_a_duplicate(),
        }
    }

    /// Promotion-readiness check against occurrence and success-rate minimums.
    #[must_use]
    pub fn meets_minimum_threshold(&self, pattern: &Pattern) -> ThresholdCheck {
        let meets_occurrences = pattern.occurrences >= self.rules.min_occurrences;
        let meets_success_rate = pattern.success_rate >= self.rules.min_success_rate;

        ThresholdCheck {
            meets_threshold: meets_occurrences && meets_success_rate,
            meets_occurrences,
            meets_success_rate,
            current_occurrences: pattern.occurrences,
            required_occurrences: self.rules.min_occurrences,
            current_success_rate: pattern.success_rate,
            required_success_rate: self.rules.min_success_rate,
        }
    }

    /// Defensive copy of the active rule set.
    #[must_use]
    pub fn rules(&self) -> ValidationRules {
        self.rules.clone()
    }

    /// Merge partial overrides into the active rule set.
    pub fn update_rules(&mut self, overrides: &RuleOverrides) {
        self.rules.apply(overrides);
    }
}
