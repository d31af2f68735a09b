//! Sequence similarity scoring
//!
//! Combines set overlap (Jaccard) with positional order agreement into a
//! single [0, 1] score. The 0.4/0.6 split is empirical tuning inherited
//! from the original system; both the validator's duplicate detection and
//! the store's `find_similar` ranking use the same formula so the two
//! components agree on what "close" means.

use std::collections::HashSet;

/// Weight applied to the Jaccard (set overlap) component.
pub const JACCARD_WEIGHT: f64 = 0.4;

/// Weight applied to the positional order-match component.
pub const ORDER_WEIGHT: f64 = 0.6;

/// Intersection-over-union of the two sequences treated as sets.
///
/// Returns 0.0 when both sequences are empty.
#[must_use]
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();

    intersection as f64 / union as f64
}

/// Fraction of positions (up to the shorter length) where both sequences
/// hold the same command.
///
/// Returns 0.0 when either sequence is empty.
#[must_use]
pub fn order_match_ratio(a: &[String], b: &[String]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }

    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matches as f64 / len as f64
}

/// Combined similarity: `0.4 * jaccard + 0.6 * order_match_ratio`.
#[must_use]
pub fn combined_score(a: &[String], b: &[String]) -> f64 {
    JACCARD_WEIGHT * jaccard(a, b) + ORDER_WEIGHT * order_match_ratio(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(commands: &[&str]) -> Vec<String> {
        commands.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn identical_sequences_score_one() {
        let a = seq(&["develop", "review-qa", "apply-qa-fixes"]);
        assert!((combined_score(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_sequences_score_zero() {
        let a = seq(&["develop", "review-qa"]);
        let b = seq(&["shard-doc", "explain"]);
        assert!(combined_score(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn empty_sequences_score_zero() {
        let a = seq(&["develop"]);
        let empty: Vec<String> = Vec::new();
        assert!(combined_score(&a, &empty).abs() < 1e-9);
        assert!(combined_score(&empty, &empty).abs() < 1e-9);
    }

    #[test]
    fn two_of_three_positions_shared_scores_below_dedup_threshold() {
        // Jaccard 2/4 = 0.5, order match 2/3 ≈ 0.667 → 0.4*0.5 + 0.6*0.667 = 0.6
        let a = seq(&["develop", "review-qa", "apply-qa-fixes"]);
        let b = seq(&["develop", "review-qa", "correct-course"]);

        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert!((order_match_ratio(&a, &b) - 2.0 / 3.0).abs() < 1e-9);

        let score = combined_score(&a, &b);
        assert!((score - 0.6).abs() < 1e-9);
        assert!(score < 0.85);
    }

    #[test]
    fn order_matters_beyond_set_overlap() {
        let a = seq(&["develop", "review-qa", "apply-qa-fixes"]);
        let reordered = seq(&["apply-qa-fixes", "develop", "review-qa"]);

        // Same set (jaccard 1.0) but no aligned position
        assert!((jaccard(&a, &reordered) - 1.0).abs() < 1e-9);
        assert!(order_match_ratio(&a, &reordered).abs() < 1e-9);
        assert!((combined_score(&a, &reordered) - JACCARD_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn prefix_query_scores_against_shorter_length() {
        let stored = seq(&["develop", "review-qa", "apply-qa-fixes", "run-tests"]);
        let query = seq(&["develop", "review-qa"]);

        assert!((order_match_ratio(&query, &stored) - 1.0).abs() < 1e-9);
        assert!((jaccard(&query, &stored) - 0.5).abs() < 1e-9);
    }
}
