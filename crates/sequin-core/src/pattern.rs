//! Core pattern data model
//!
//! A [`Pattern`] is a recorded command sequence believed to represent a
//! recurring, successful workflow. Patterns are constructed through the
//! capture and store entry points so that partially-initialized records
//! never propagate through the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Lifecycle status of a stored pattern.
///
/// The intended forward path is `Pending → Active → Promoted`; `Deprecated`
/// is reachable from any state. No transition is automatic — all transitions
/// are driven by explicit [`crate::store::PatternStore::update_status`] calls
/// from policy external to this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    /// Newly captured, not yet eligible for suggestion
    Pending,
    /// Eligible for suggestion
    Active,
    /// Proven pattern, retained preferentially during pruning
    Promoted,
    /// Scheduled-out pattern, removed first during pruning
    Deprecated,
}

impl std::fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Promoted => write!(f, "promoted"),
            Self::Deprecated => write!(f, "deprecated"),
        }
    }
}

impl std::str::FromStr for PatternStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "promoted" => Ok(Self::Promoted),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

impl PatternStatus {
    /// Pruning priority: lower ranks are removed first.
    #[must_use]
    pub(crate) fn prune_rank(self) -> u8 {
        match self {
            Self::Deprecated => 0,
            Self::Pending => 1,
            Self::Active => 2,
            Self::Promoted => 3,
        }
    }
}

/// Best-effort workflow classification derived from recognizable
/// sub-sequences. Advisory metadata only; carries no structural invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Development loop: develop + review-qa with an adjacent fix/test step
    StoryDevelopment,
    /// Authoring flow: story creation/validation steps leading into develop
    StoryCreation,
    /// No recognizable sub-sequence
    #[default]
    Unclassified,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoryDevelopment => write!(f, "story_development"),
            Self::StoryCreation => write!(f, "story_creation"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// A persisted workflow pattern record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique identifier, assigned on first capture/save; immutable
    pub id: String,
    /// Ordered list of normalized command tokens
    pub sequence: Vec<String>,
    /// Unordered agent identifiers observed during the session (may be empty)
    pub agents: Vec<String>,
    /// Advisory workflow classification
    pub workflow: WorkflowKind,
    /// Times an equal sequence has been saved; starts at 1
    pub occurrences: u32,
    /// Observed success rate in [0, 1]
    pub success_rate: f64,
    /// Lifecycle status
    pub status: PatternStatus,
    /// When the pattern was first stored
    pub first_seen: DateTime<Utc>,
    /// When an equal sequence was last saved
    pub last_seen: DateTime<Utc>,
    /// When the record was last mutated (status changes included)
    pub last_updated: DateTime<Utc>,
}

impl Pattern {
    /// Build a freshly captured candidate with default statistics.
    #[must_use]
    pub fn candidate(
        sequence: Vec<String>,
        agents: Vec<String>,
        workflow: WorkflowKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_pattern_id(&sequence),
            sequence,
            agents,
            workflow,
            occurrences: 1,
            success_rate: 1.0,
            status: PatternStatus::Pending,
            first_seen: now,
            last_seen: now,
            last_updated: now,
        }
    }
}

/// A complete session record for stateless capture (replay, testing, or
/// callers that manage their own buffering).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecord {
    /// Commands executed during the session, in order (raw, unnormalized)
    pub commands: Vec<String>,
    /// Agent identifiers active during the session
    pub agent_sequence: Vec<String>,
    /// Whether the session completed successfully
    pub success: bool,
    /// Session completion time (informational)
    pub timestamp: Option<DateTime<Utc>>,
    /// Originating session identifier (informational)
    pub session_id: Option<String>,
}

/// Strip leading marker characters (`*`) and surrounding whitespace.
///
/// Applies everywhere commands are compared or stored, so `*develop` and
/// `develop` resolve to the same token.
#[must_use]
pub fn normalize_command(raw: &str) -> String {
    raw.trim().trim_start_matches('*').trim().to_string()
}

/// Normalize a full command history.
#[must_use]
pub fn normalize_sequence(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|c| normalize_command(c))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Commands that anchor the story-development classification when adjacent
/// to `review-qa`.
const QA_FOLLOWUPS: [&str; 2] = ["apply-qa-fixes", "run-tests"];

/// Commands that open a story-creation flow.
const CREATION_OPENERS: [&str; 2] = ["create-next-story", "validate-next-story"];

/// Classify a normalized sequence by recognizable sub-sequences.
///
/// The label is best-effort metadata: a development loop is `develop` plus
/// `review-qa` with a QA-fix or test step adjacent to the review; a creation
/// flow starts with story creation/validation and reaches `develop` later.
#[must_use]
pub fn classify_workflow(sequence: &[String]) -> WorkflowKind {
    let has_develop = sequence.iter().any(|c| c == "develop");

    if has_develop {
        if let Some(review_idx) = sequence.iter().position(|c| c == "review-qa") {
            let adjacent_followup = [review_idx.wrapping_sub(1), review_idx + 1]
                .iter()
                .filter_map(|&i| sequence.get(i))
                .any(|c| QA_FOLLOWUPS.contains(&c.as_str()));
            if adjacent_followup {
                return WorkflowKind::StoryDevelopment;
            }
        }
    }

    if let Some(first) = sequence.first() {
        if CREATION_OPENERS.contains(&first.as_str())
            && sequence.iter().skip(1).any(|c| c == "develop")
        {
            return WorkflowKind::StoryCreation;
        }
    }

    WorkflowKind::Unclassified
}

/// Generate a unique pattern id.
///
/// Hashes the sequence together with the current time and 8 bytes of random
/// entropy, so equal sequences captured at different moments still receive
/// distinct ids. Encoded as 32 lowercase hex chars.
#[must_use]
pub fn generate_pattern_id(sequence: &[String]) -> String {
    let mut hasher = Sha256::new();
    for command in sequence {
        hasher.update(command.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(Utc::now().timestamp_millis().to_le_bytes());

    let entropy: [u8; 8] = rand::random();
    hasher.update(entropy);

    let hash = hasher.finalize();
    hex_encode(&hash[..16])
}

/// Encode bytes as lowercase hex string
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
