//! Session capture and candidate extraction
//!
//! Turns a live stream of per-command completion events into candidate
//! [`Pattern`] records. Commands accumulate in per-session buffers owned by
//! the [`Capture`] value (no global state); a workflow-ending command
//! triggers extraction. A stateless [`Capture::capture_session`] variant
//! handles replay and callers that manage their own buffering.
//!
//! All rejections are structured outcomes, never errors or panics.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::CaptureConfig;
use crate::pattern::{
    classify_workflow, normalize_command, normalize_sequence, Pattern, SessionRecord,
};

/// Per-event context passed with each completed command.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    /// Session identifier; a missing id gets a generated one
    pub session_id: Option<String>,
    /// Agent that executed the command, when known
    pub agent_id: Option<String>,
}

/// Outcome of a capture attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// A candidate pattern was extracted
    Captured { pattern: Pattern },
    /// No pattern was produced; `reason` says why
    Rejected { reason: String },
}

impl CaptureOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// The extracted pattern, when capture succeeded.
    #[must_use]
    pub fn pattern(&self) -> Option<&Pattern> {
        match self {
            Self::Captured { pattern } => Some(pattern),
            Self::Rejected { .. } => None,
        }
    }

    /// The rejection reason, when capture did not produce a pattern.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Captured { .. } => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}

/// Transient per-session accumulation of commands and agents.
#[derive(Debug, Default)]
struct SessionBuffer {
    commands: Vec<String>,
    agents: HashSet<String>,
    failed: bool,
}

/// Live capture front-end with per-session buffering.
#[derive(Debug)]
pub struct Capture {
    config: CaptureConfig,
    ending_commands: HashSet<String>,
    key_commands: HashSet<String>,
    sessions: HashMap<String, SessionBuffer>,
}

impl Capture {
    /// Build a capture front-end from configuration.
    #[must_use]
    pub fn new(config: CaptureConfig) -> Self {
        let ending_commands = config
            .workflow_ending_commands
            .iter()
            .map(|c| normalize_command(c))
            .collect();
        let key_commands = config
            .key_commands
            .iter()
            .map(|c| normalize_command(c))
            .collect();
        Self {
            config,
            ending_commands,
            key_commands,
            sessions: HashMap::new(),
        }
    }

    /// Record a completed command for a session.
    ///
    /// Appends the normalized command to the session's buffer and records
    /// the agent. A workflow-ending command immediately attempts extraction
    /// and clears the buffer; anything else reports `workflow_in_progress`.
    #[instrument(skip(self), level = "debug")]
    pub fn on_task_complete(&mut self, command: &str, ctx: &TaskContext) -> CaptureOutcome {
        if !self.config.enabled {
            return CaptureOutcome::rejected("capture_disabled");
        }

        let normalized = normalize_command(command);
        if normalized.is_empty() {
            return CaptureOutcome::rejected("empty_command");
        }

        let session_id = ctx
            .session_id
            .clone()
            .unwrap_or_else(generate_session_id);

        let buffer = self.sessions.entry(session_id.clone()).or_default();
        buffer.commands.push(normalized.clone());
        if let Some(agent) = &ctx.agent_id {
            buffer.agents.insert(agent.clone());
        }

        if !self.ending_commands.contains(&normalized) {
            return CaptureOutcome::rejected("workflow_in_progress");
        }

        // Workflow-ending command: extract from the buffer and clear it.
        let Some(buffer) = self.sessions.remove(&session_id) else {
            return CaptureOutcome::rejected("session_not_buffered");
        };

        debug!(
            session_id = %session_id,
            commands = buffer.commands.len(),
            "Workflow-ending command, attempting extraction"
        );

        let record = SessionRecord {
            commands: buffer.commands,
            agent_sequence: buffer.agents.into_iter().collect(),
            success: !buffer.failed,
            timestamp: Some(Utc::now()),
            session_id: Some(session_id),
        };
        self.capture_session(&record)
    }

    /// Stateless capture over an already-complete session record.
    #[instrument(skip_all, level = "debug")]
    pub fn capture_session(&self, session: &SessionRecord) -> CaptureOutcome {
        if !self.config.enabled {
            return CaptureOutcome::rejected("capture_disabled");
        }

        if session.commands.is_empty() {
            return CaptureOutcome::rejected("no_commands");
        }

        if !session.success {
            return CaptureOutcome::rejected("session_failed");
        }

        let sequence = normalize_sequence(&session.commands);
        if sequence.len() < self.config.min_sequence_length {
            return CaptureOutcome::rejected(format!(
                "sequence_too_short: {} commands (minimum {})",
                sequence.len(),
                self.config.min_sequence_length
            ));
        }

        let workflow = classify_workflow(&sequence);
        let pattern = Pattern::candidate(sequence, session.agent_sequence.clone(), workflow);

        debug!(
            pattern_id = %pattern.id,
            workflow = %pattern.workflow,
            "Captured candidate pattern"
        );

        CaptureOutcome::Captured { pattern }
    }

    /// Flag a buffered session as failed so a later ending command cannot
    /// produce a captured pattern from it. Creates the buffer if absent.
    pub fn mark_session_failed(&mut self, session_id: &str) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .failed = true;
    }

    /// Clear one buffered session, or all buffered sessions when `None`.
    pub fn clear_session(&mut self, session_id: Option<&str>) {
        match session_id {
            Some(id) => {
                self.sessions.remove(id);
            }
            None => self.sessions.clear(),
        }
    }

    /// Number of sessions currently buffered.
    #[must_use]
    pub fn buffered_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Offline sliding-window extraction over a raw command history.
    ///
    /// Emits every window of length `min_sequence_length..=max_window_length`
    /// (capped by history length) that contains at least one key command.
    /// Used for retrospective mining rather than the live capture path.
    #[must_use]
    pub fn extract_patterns(&self, history: &[String]) -> Vec<Vec<String>> {
        let normalized = normalize_sequence(history);
        let min_len = self.config.min_sequence_length;
        if normalized.len() < min_len {
            return Vec::new();
        }

        let max_len = self.config.max_window_length.min(normalized.len());
        let mut windows = Vec::new();

        for len in min_len..=max_len {
            for window in normalized.windows(len) {
                if window
                    .iter()
                    .any(|c| self.key_commands.contains(c.as_str()))
                {
                    windows.push(window.to_vec());
                }
            }
        }

        windows
    }
}

/// Generate a session id for events that arrive without one.
fn generate_session_id() -> String {
    let random: u32 = rand::random();
    format!("session-{}-{random:08x}", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::WorkflowKind;

    fn seq(commands: &[&str]) -> Vec<String> {
        commands.iter().map(|s| (*s).to_string()).collect()
    }

    fn capture() -> Capture {
        Capture::new(CaptureConfig::default())
    }

    fn session(commands: &[&str], success: bool) -> SessionRecord {
        SessionRecord {
            commands: seq(commands),
            agent_sequence: vec!["dev".to_string()],
            success,
            timestamp: Some(Utc::now()),
            session_id: Some("s1".to_string()),
        }
    }

    #[test]
    fn short_sequences_are_rejected() {
        let outcome = capture().capture_session(&session(&["develop", "review-qa"], true));
        let reason = outcome.reason().expect("rejected");
        assert!(reason.contains("too_short"));
    }

    #[test]
    fn failed_sessions_are_rejected() {
        let outcome = capture().capture_session(&session(
            &["develop", "review-qa", "apply-qa-fixes"],
            false,
        ));
        assert_eq!(outcome.reason(), Some("session_failed"));
    }

    #[test]
    fn empty_sessions_are_rejected() {
        let outcome = capture().capture_session(&session(&[], true));
        assert_eq!(outcome.reason(), Some("no_commands"));
    }

    #[test]
    fn disabled_capture_rejects_everything() {
        let config = CaptureConfig {
            enabled: false,
            ..Default::default()
        };
        let outcome = Capture::new(config).capture_session(&session(
            &["develop", "review-qa", "apply-qa-fixes"],
            true,
        ));
        assert_eq!(outcome.reason(), Some("capture_disabled"));
    }

    #[test]
    fn markers_are_stripped_and_workflow_classified() {
        let outcome = capture().capture_session(&session(
            &["*develop", "*review-qa", "*apply-qa-fixes"],
            true,
        ));
        let pattern = outcome.pattern().expect("captured");
        assert_eq!(
            pattern.sequence,
            seq(&["develop", "review-qa", "apply-qa-fixes"])
        );
        assert_eq!(pattern.workflow, WorkflowKind::StoryDevelopment);
        assert_eq!(pattern.occurrences, 1);
        assert_eq!(pattern.status, crate::pattern::PatternStatus::Pending);
    }

    #[test]
    fn live_flow_captures_on_ending_command() {
        let mut capture = capture();
        let ctx = TaskContext {
            session_id: Some("s1".to_string()),
            agent_id: Some("dev".to_string()),
        };

        let first = capture.on_task_complete("*develop", &ctx);
        assert_eq!(first.reason(), Some("workflow_in_progress"));
        let second = capture.on_task_complete("*review-qa", &ctx);
        assert_eq!(second.reason(), Some("workflow_in_progress"));

        let last = capture.on_task_complete("*apply-qa-fixes", &ctx);
        let pattern = last.pattern().expect("captured on ending command");
        assert_eq!(
            pattern.sequence,
            seq(&["develop", "review-qa", "apply-qa-fixes"])
        );
        assert_eq!(pattern.agents, vec!["dev".to_string()]);

        // Buffer was consumed
        assert_eq!(capture.buffered_sessions(), 0);
    }

    #[test]
    fn failed_session_cannot_capture_on_ending_command() {
        let mut capture = capture();
        let ctx = TaskContext {
            session_id: Some("s1".to_string()),
            agent_id: None,
        };

        capture.on_task_complete("develop", &ctx);
        capture.on_task_complete("review-qa", &ctx);
        capture.mark_session_failed("s1");

        let outcome = capture.on_task_complete("apply-qa-fixes", &ctx);
        assert_eq!(outcome.reason(), Some("session_failed"));
    }

    #[test]
    fn ending_command_with_short_buffer_is_rejected_and_clears() {
        let mut capture = capture();
        let ctx = TaskContext {
            session_id: Some("s1".to_string()),
            agent_id: None,
        };

        let outcome = capture.on_task_complete("apply-qa-fixes", &ctx);
        assert!(outcome.reason().expect("rejected").contains("too_short"));
        assert_eq!(capture.buffered_sessions(), 0);
    }

    #[test]
    fn sessions_are_buffered_independently() {
        let mut capture = capture();
        let ctx_a = TaskContext {
            session_id: Some("a".to_string()),
            agent_id: None,
        };
        let ctx_b = TaskContext {
            session_id: Some("b".to_string()),
            agent_id: None,
        };

        capture.on_task_complete("develop", &ctx_a);
        capture.on_task_complete("explain", &ctx_b);
        assert_eq!(capture.buffered_sessions(), 2);

        capture.clear_session(Some("a"));
        assert_eq!(capture.buffered_sessions(), 1);

        capture.clear_session(None);
        assert_eq!(capture.buffered_sessions(), 0);
    }

    #[test]
    fn missing_session_id_gets_a_generated_one() {
        let mut capture = capture();
        let outcome = capture.on_task_complete("develop", &TaskContext::default());
        assert_eq!(outcome.reason(), Some("workflow_in_progress"));
        assert_eq!(capture.buffered_sessions(), 1);
    }

    #[test]
    fn extract_patterns_emits_key_command_windows() {
        let history = seq(&["develop", "review-qa", "apply-qa-fixes", "explain"]);
        let windows = capture().extract_patterns(&history);

        // Lengths 3 and 4: two windows of length 3 plus one of length 4,
        // all containing a key command.
        assert_eq!(windows.len(), 3);
        assert!(windows.contains(&seq(&["develop", "review-qa", "apply-qa-fixes"])));
        assert!(windows.contains(&seq(&[
            "develop",
            "review-qa",
            "apply-qa-fixes",
            "explain"
        ])));
    }

    #[test]
    fn extract_patterns_skips_windows_without_key_commands() {
        let history = seq(&["explain", "shard-doc", "halt", "develop", "review-qa", "explain"]);
        let windows = capture().extract_patterns(&history);
        assert!(!windows.is_empty());
        assert!(windows
            .iter()
            .all(|w| w.iter().any(|c| c == "develop" || c == "review-qa")));
    }

    #[test]
    fn extract_patterns_handles_short_histories() {
        assert!(capture().extract_patterns(&[]).is_empty());
        assert!(capture()
            .extract_patterns(&seq(&["develop", "review-qa"]))
            .is_empty());
    }
}
