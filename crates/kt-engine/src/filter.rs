//! Importance-based parameter filtering between tuning cycles.

use kt_types::ImportanceRank;
use tracing::info;

/// Result of one filter pass: an explicit retained/skipped partition.
///
/// The partition is rebuilt each cycle and consulted when the next remote
/// task is created, instead of mutating knob definitions in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    /// Highest-scoring parameters, descending by score.
    pub retained: Vec<ImportanceRank>,
    /// Names pruned from the next cycle.
    pub skipped: Vec<String>,
}

impl FilterOutcome {
    /// `name:score` summary of the retained set.
    pub fn summary(&self) -> String {
        ImportanceRank::format_list(&self.retained)
    }
}

/// Partition a `name:score` ranking by `skip_percentage`.
///
/// Parameters are sorted descending by score (stable, so input order breaks
/// ties); the top `floor(count * skip_percentage)` survive. Small spaces
/// (count <= 10) are never pruned.
pub fn partition(rank: &str, skip_percentage: f64) -> FilterOutcome {
    let mut ranks = ImportanceRank::parse_list(rank);
    if ranks.is_empty() {
        return FilterOutcome::default();
    }
    ranks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep = (ranks.len() as f64 * skip_percentage) as usize;
    if ranks.len() <= 10 {
        keep = ranks.len();
    }

    let skipped = ranks.split_off(keep);
    let outcome = FilterOutcome {
        retained: ranks,
        skipped: skipped.into_iter().map(|r| r.name).collect(),
    };
    info!(
        retained = outcome.retained.len(),
        skipped = outcome.skipped.len(),
        "parameter importance partition"
    );
    outcome
}
