//! Learning engine facade
//!
//! Wires the capture → validation → storage data flow behind one entry
//! point. Callers that need finer control can still drive [`Capture`],
//! [`Validator`], and [`PatternStore`] individually.

use tracing::{debug, instrument};

use crate::capture::{Capture, CaptureOutcome, TaskContext};
use crate::config::Config;
use crate::pattern::Pattern;
use crate::store::{PatternStore, SaveAction, SimilarPattern};
use crate::validate::Validator;
use crate::Result;

/// What an [`LearningEngine::observe`] call did with the event.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    /// The command extended a session buffer (or was rejected pre-capture)
    Buffered { reason: String },
    /// A candidate was captured but failed validation
    Rejected { errors: Vec<String> },
    /// A validated pattern was saved
    Stored {
        action: SaveAction,
        pattern: Pattern,
    },
}

/// Facade owning the three engine components.
#[derive(Debug)]
pub struct LearningEngine {
    capture: Capture,
    validator: Validator,
    store: PatternStore,
}

impl LearningEngine {
    /// Build an engine from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            capture: Capture::new(config.capture.clone()),
            validator: Validator::from_config(config),
            store: PatternStore::new(&config.store),
        }
    }

    /// Assemble an engine from preconfigured components.
    #[must_use]
    pub fn new(capture: Capture, validator: Validator, store: PatternStore) -> Self {
        Self {
            capture,
            validator,
            store,
        }
    }

    /// Feed one completed command through capture, validation, and storage.
    #[instrument(skip(self), level = "debug")]
    pub fn observe(&mut self, command: &str, ctx: &TaskContext) -> Result<EngineOutcome> {
        let pattern = match self.capture.on_task_complete(command, ctx) {
            CaptureOutcome::Rejected { reason } => {
                return Ok(EngineOutcome::Buffered { reason });
            }
            CaptureOutcome::Captured { pattern } => pattern,
        };

        let report = self.validator.validate(&pattern);
        if !report.valid {
            return Ok(EngineOutcome::Rejected {
                errors: report.errors,
            });
        }

        let check = self
            .validator
            .is_duplicate(&pattern, &self.store.load().patterns);
        if check.is_duplicate {
            debug!(
                duplicate_of = check.duplicate_of.as_deref().unwrap_or(""),
                exact = check.exact,
                "Candidate duplicates a stored pattern; statistics will merge"
            );
        }

        let outcome = self.store.save(pattern)?;
        Ok(EngineOutcome::Stored {
            action: outcome.action,
            pattern: outcome.pattern,
        })
    }

    /// Ranked near-matches for a partial sequence (suggestion read path).
    pub fn suggest(&mut self, sequence: &[String]) -> Vec<SimilarPattern> {
        self.store.find_similar(sequence)
    }

    /// Capture front-end.
    pub fn capture_mut(&mut self) -> &mut Capture {
        &mut self.capture
    }

    /// Active validator.
    pub fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }

    /// Pattern store.
    pub fn store_mut(&mut self) -> &mut PatternStore {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StoreConfig};
    use tempfile::tempdir;

    fn seq(commands: &[&str]) -> Vec<String> {
        commands.iter().map(|s| (*s).to_string()).collect()
    }

    fn engine_in(dir: &tempfile::TempDir) -> LearningEngine {
        let config = Config {
            store: StoreConfig {
                path: Some(dir.path().join("patterns.json")),
                ..Default::default()
            },
            ..Default::default()
        };
        LearningEngine::from_config(&config)
    }

    fn ctx(session: &str) -> TaskContext {
        TaskContext {
            session_id: Some(session.to_string()),
            agent_id: Some("dev".to_string()),
        }
    }

    #[test]
    fn observe_buffers_then_stores_a_full_workflow() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(&dir);

        let first = engine.observe("*develop", &ctx("s1")).unwrap();
        assert!(matches!(first, EngineOutcome::Buffered { .. }));
        engine.observe("*review-qa", &ctx("s1")).unwrap();

        let last = engine.observe("*apply-qa-fixes", &ctx("s1")).unwrap();
        let EngineOutcome::Stored { action, pattern } = last else {
            panic!("expected stored outcome");
        };
        assert_eq!(action, SaveAction::Created);
        assert_eq!(
            pattern.sequence,
            seq(&["develop", "review-qa", "apply-qa-fixes"])
        );

        // Second pass over the same workflow merges statistics
        engine.observe("develop", &ctx("s2")).unwrap();
        engine.observe("review-qa", &ctx("s2")).unwrap();
        let repeat = engine.observe("apply-qa-fixes", &ctx("s2")).unwrap();
        let EngineOutcome::Stored { action, pattern } = repeat else {
            panic!("expected stored outcome");
        };
        assert_eq!(action, SaveAction::Updated);
        assert_eq!(pattern.occurrences, 2);
    }

    #[test]
    fn failed_sessions_never_reach_the_store() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(&dir);

        engine.capture_mut().mark_session_failed("s1");
        engine.observe("develop", &ctx("s1")).unwrap();
        engine.observe("review-qa", &ctx("s1")).unwrap();
        let outcome = engine.observe("apply-qa-fixes", &ctx("s1")).unwrap();
        let EngineOutcome::Buffered { reason } = outcome else {
            panic!("expected buffered outcome");
        };
        assert_eq!(reason, "session_failed");

        assert!(engine.store_mut().load().patterns.is_empty());
    }

    #[test]
    fn observe_rejects_captures_that_fail_validation() {
        // Capture is permissive (length 2) while the validator still
        // requires 3, so a short workflow is captured but then rejected.
        let dir = tempdir().unwrap();
        let mut config = Config {
            store: StoreConfig {
                path: Some(dir.path().join("patterns.json")),
                ..Default::default()
            },
            ..Default::default()
        };
        config.capture.min_sequence_length = 2;
        let mut engine = LearningEngine::from_config(&config);

        engine.observe("develop", &ctx("s1")).unwrap();
        let outcome = engine.observe("apply-qa-fixes", &ctx("s1")).unwrap();
        let EngineOutcome::Rejected { errors } = outcome else {
            panic!("expected rejected outcome");
        };
        assert!(errors.iter().any(|e| e.contains("too short")));
        assert!(engine.store_mut().load().patterns.is_empty());
    }

    #[test]
    fn suggest_reads_back_stored_patterns() {
        let dir = tempdir().unwrap();
        let mut engine = engine_in(&dir);

        engine.observe("develop", &ctx("s1")).unwrap();
        engine.observe("review-qa", &ctx("s1")).unwrap();
        engine.observe("apply-qa-fixes", &ctx("s1")).unwrap();

        let hits = engine.suggest(&seq(&["develop", "review-qa"]));
        assert!(!hits.is_empty());
        assert!(hits[0].similarity > 0.0);
    }
}
