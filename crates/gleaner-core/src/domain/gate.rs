//! Score threshold gate.

/// A score meets the bar iff `score >= threshold` (inclusive).
///
/// NaN never qualifies.
pub fn qualifies(score: f64, threshold: f64) -> bool {
    score >= threshold
}
