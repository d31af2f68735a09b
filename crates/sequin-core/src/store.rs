//! Persistent pattern store
//!
//! Durable, cached, capacity-bounded persistence of [`Pattern`] records
//! with similarity search and lifecycle operations. The backing file is a
//! human-readable JSON document rewritten after every mutation; writes go
//! to a temp file first and are renamed into place so a crash cannot leave
//! a truncated store behind.
//!
//! A missing, empty, or corrupt backing file loads as an empty document —
//! storage corruption must never crash the caller.
//!
//! # Limitations
//!
//! No inter-process locking: concurrent writers in separate processes can
//! race and the last writer wins.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::pattern::{generate_pattern_id, normalize_sequence, Pattern, PatternStatus};
use crate::similarity::combined_score;
use crate::Result;

/// Persisted document schema version
pub const SCHEMA_VERSION: &str = "1.0";

/// The full persisted structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Schema version string
    pub version: String,
    /// Ordered list of pattern records
    pub patterns: Vec<Pattern>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            patterns: Vec::new(),
        }
    }
}

/// What a [`PatternStore::save`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveAction {
    /// A new record was created
    Created,
    /// An existing record with an equal sequence was updated
    Updated,
}

impl std::fmt::Display for SaveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Result of a save: the action taken and the stored record.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub action: SaveAction,
    pub pattern: Pattern,
}

/// A similarity-search hit: the pattern's fields plus its score.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarPattern {
    #[serde(flatten)]
    pub pattern: Pattern,
    pub similarity: f64,
}

/// Same-priority ordering applied while pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneStrategy {
    /// Remove by status priority, oldest `last_seen` first within a status
    #[default]
    StatusPriority,
    /// Remove by status priority, lowest success rate first within a status
    LowestSuccessRate,
}

/// Result of a prune pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PruneReport {
    pub pruned: usize,
    pub remaining: usize,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_patterns: usize,
    pub max_patterns: usize,
    pub utilization_percent: f64,
    pub status_counts: StatusCounts,
    pub avg_success_rate: f64,
    pub storage_file: PathBuf,
}

/// Per-status record counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub active: usize,
    pub promoted: usize,
    pub deprecated: usize,
}

/// Durable pattern store with an in-process read cache.
#[derive(Debug)]
pub struct PatternStore {
    path: PathBuf,
    max_patterns: usize,
    prune_threshold: f64,
    cache: Option<StoreDocument>,
    generation: u64,
}

impl PatternStore {
    /// Build a store from configuration.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: config.resolved_path(),
            max_patterns: config.max_patterns,
            prune_threshold: config.prune_threshold,
            cache: None,
            generation: 0,
        }
    }

    /// Build a store over an explicit backing file with default capacity.
    #[must_use]
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        Self::new(&StoreConfig {
            path: Some(path.into()),
            ..Default::default()
        })
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cache generation counter; bumped on every real re-read and every
    /// persisted mutation. Two `load()` calls returning the same generation
    /// served the same cached document.
    #[must_use]
    pub fn cache_generation(&self) -> u64 {
        self.generation
    }

    /// The full persisted structure, served from cache when warm.
    pub fn load(&mut self) -> &StoreDocument {
        self.doc_mut()
    }

    /// Drop the cached document, forcing the next `load()` to re-read the
    /// backing file.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    /// Save a candidate pattern.
    ///
    /// An existing record with an identical sequence is updated in place:
    /// occurrences + 1, success rate replaced by the plain two-value mean of
    /// stored and incoming, `last_seen` refreshed. Otherwise a new record is
    /// created. The document is persisted after the mutation, and an
    /// automatic prune runs when the store reaches the configured watermark.
    #[instrument(skip(self, candidate), level = "debug")]
    pub fn save(&mut self, mut candidate: Pattern) -> Result<SaveOutcome> {
        let now = Utc::now();
        candidate.occurrences = candidate.occurrences.max(1);
        if !candidate.success_rate.is_finite() {
            candidate.success_rate = 1.0;
        }
        candidate.success_rate = candidate.success_rate.clamp(0.0, 1.0);
        candidate.sequence = normalize_sequence(&candidate.sequence);
        if candidate.id.is_empty() {
            candidate.id = generate_pattern_id(&candidate.sequence);
        }

        let doc = self.doc_mut();
        let (action, stored) = match doc
            .patterns
            .iter_mut()
            .find(|p| p.sequence == candidate.sequence)
        {
            Some(existing) => {
                existing.occurrences += 1;
                // Plain two-value mean, deliberately not occurrence-weighted
                existing.success_rate =
                    (existing.success_rate + candidate.success_rate) / 2.0;
                existing.last_seen = now;
                existing.last_updated = now;
                (SaveAction::Updated, existing.clone())
            }
            None => {
                candidate.first_seen = now;
                candidate.last_seen = now;
                candidate.last_updated = now;
                doc.patterns.push(candidate.clone());
                (SaveAction::Created, candidate)
            }
        };

        self.persist()?;
        info!(pattern_id = %stored.id, action = %action, "Saved pattern");

        let len = self.cache.as_ref().map_or(0, |d| d.patterns.len());
        let watermark = (self.max_patterns as f64 * self.prune_threshold).floor() as usize;
        if watermark > 0 && len >= watermark {
            self.prune(watermark.saturating_sub(1), PruneStrategy::default())?;
        }

        Ok(SaveOutcome {
            action,
            pattern: stored,
        })
    }

    /// Ranked near-matches for a (possibly partial) query sequence.
    ///
    /// Uses the same combined Jaccard/order-match formula as the validator's
    /// duplicate detection. Results are sorted by descending similarity and
    /// every reported score is in (0, 1]. Empty queries yield an empty list.
    pub fn find_similar(&mut self, query: &[String]) -> Vec<SimilarPattern> {
        let query = normalize_sequence(query);
        if query.is_empty() {
            return Vec::new();
        }

        let doc = self.doc_mut();
        let mut hits: Vec<SimilarPattern> = doc
            .patterns
            .iter()
            .filter_map(|p| {
                let similarity = combined_score(&query, &p.sequence);
                (similarity > 0.0).then(|| SimilarPattern {
                    pattern: p.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }

    /// Aggregate statistics over the stored patterns.
    pub fn get_stats(&mut self) -> StoreStats {
        let max_patterns = self.max_patterns;
        let storage_file = self.path.clone();
        let doc = self.doc_mut();

        let total = doc.patterns.len();
        let mut counts = StatusCounts::default();
        let mut success_sum = 0.0;
        for pattern in &doc.patterns {
            match pattern.status {
                PatternStatus::Pending => counts.pending += 1,
                PatternStatus::Active => counts.active += 1,
                PatternStatus::Promoted => counts.promoted += 1,
                PatternStatus::Deprecated => counts.deprecated += 1,
            }
            success_sum += pattern.success_rate;
        }

        StoreStats {
            total_patterns: total,
            max_patterns,
            utilization_percent: if max_patterns == 0 {
                0.0
            } else {
                total as f64 / max_patterns as f64 * 100.0
            },
            status_counts: counts,
            avg_success_rate: if total == 0 { 0.0 } else { success_sum / total as f64 },
            storage_file,
        }
    }

    /// Remove records down to `keep_count`.
    ///
    /// Removal order is `deprecated`, then `pending`, then `active`/`promoted`
    /// only if still over budget; a `promoted` record is never removed while
    /// any lower-priority record remains. Within the same status the chosen
    /// [`PruneStrategy`] orders the candidates.
    #[instrument(skip(self), level = "debug")]
    pub fn prune(&mut self, keep_count: usize, strategy: PruneStrategy) -> Result<PruneReport> {
        let doc = self.doc_mut();
        let total = doc.patterns.len();
        if total <= keep_count {
            return Ok(PruneReport {
                pruned: 0,
                remaining: total,
            });
        }

        let mut order: Vec<usize> = (0..total).collect();
        order.sort_by(|&a, &b| {
            let pa = &doc.patterns[a];
            let pb = &doc.patterns[b];
            pa.status
                .prune_rank()
                .cmp(&pb.status.prune_rank())
                .then_with(|| match strategy {
                    PruneStrategy::LowestSuccessRate => pa
                        .success_rate
                        .partial_cmp(&pb.success_rate)
                        .unwrap_or(std::cmp::Ordering::Equal),
                    PruneStrategy::StatusPriority => pa.last_seen.cmp(&pb.last_seen),
                })
        });

        let to_remove: HashSet<usize> = order.into_iter().take(total - keep_count).collect();
        let mut idx = 0;
        doc.patterns.retain(|_| {
            let keep = !to_remove.contains(&idx);
            idx += 1;
            keep
        });
        let remaining = doc.patterns.len();

        self.persist()?;
        info!(pruned = total - remaining, remaining, "Pruned pattern store");

        Ok(PruneReport {
            pruned: total - remaining,
            remaining,
        })
    }

    /// Set a pattern's lifecycle status.
    ///
    /// Fails with [`StoreError::PatternNotFound`] for an unknown id. On
    /// success refreshes `last_updated` and returns the updated record.
    pub fn update_status(&mut self, id: &str, status: PatternStatus) -> Result<Pattern> {
        let doc = self.doc_mut();
        let Some(pattern) = doc.patterns.iter_mut().find(|p| p.id == id) else {
            return Err(StoreError::PatternNotFound(id.to_string()).into());
        };

        pattern.status = status;
        pattern.last_updated = Utc::now();
        let updated = pattern.clone();

        self.persist()?;
        info!(pattern_id = %id, status = %status, "Updated pattern status");
        Ok(updated)
    }

    /// Set a pattern's status from a string label.
    ///
    /// Fails with [`StoreError::InvalidStatus`] for labels outside the
    /// pending/active/promoted/deprecated enum.
    pub fn update_status_label(&mut self, id: &str, label: &str) -> Result<Pattern> {
        let status: PatternStatus = label.parse().map_err(crate::Error::Store)?;
        self.update_status(id, status)
    }

    /// All patterns with the given status.
    pub fn get_by_status(&mut self, status: PatternStatus) -> Vec<Pattern> {
        self.doc_mut()
            .patterns
            .iter()
            .filter(|p| p.status == status)
            .cloned()
            .collect()
    }

    /// Patterns eligible for suggestion: `active` and `promoted`.
    pub fn get_active_patterns(&mut self) -> Vec<Pattern> {
        self.doc_mut()
            .patterns
            .iter()
            .filter(|p| {
                matches!(p.status, PatternStatus::Active | PatternStatus::Promoted)
            })
            .cloned()
            .collect()
    }

    /// Remove a pattern by id, returning the removed record.
    ///
    /// Fails with [`StoreError::PatternNotFound`] for an unknown id.
    pub fn delete(&mut self, id: &str) -> Result<Pattern> {
        let doc = self.doc_mut();
        let Some(idx) = doc.patterns.iter().position(|p| p.id == id) else {
            return Err(StoreError::PatternNotFound(id.to_string()).into());
        };

        let removed = doc.patterns.remove(idx);
        self.persist()?;
        info!(pattern_id = %id, "Deleted pattern");
        Ok(removed)
    }

    /// Load the cache if cold, then hand out the document.
    fn doc_mut(&mut self) -> &mut StoreDocument {
        if self.cache.is_none() {
            let doc = self.read_document();
            self.generation += 1;
            self.cache = Some(doc);
        }
        self.cache.get_or_insert_with(StoreDocument::default)
    }

    /// Read the backing file, degrading to an empty document on any failure.
    fn read_document(&self) -> StoreDocument {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => {
                debug!(path = ?self.path, "Empty store file, starting fresh");
                StoreDocument::default()
            }
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = ?self.path, error = %e, "Corrupt store file, starting fresh");
                    StoreDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No store file yet");
                StoreDocument::default()
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Unreadable store file, starting fresh");
                StoreDocument::default()
            }
        }
    }

    /// Write the cached document to disk atomically (temp file + rename).
    fn persist(&mut self) -> std::result::Result<(), StoreError> {
        let doc = self.cache.get_or_insert_with(StoreDocument::default);
        let json = serde_json::to_string_pretty(doc)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::Persist {
                    path: self.path.clone(),
                    source: e,
                })?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Persist {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Persist {
            path: self.path.clone(),
            source: e,
        })?;

        self.generation += 1;
        debug!(path = ?self.path, "Persisted pattern store");
        Ok(())
    }
}
