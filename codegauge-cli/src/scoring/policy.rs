//! Scoring policy: every constant and threshold, single-sited.

use crate::models::FindingStatus;

/// Checks below this dampen a mechanical dimension's effective weight,
/// preventing a three-check dimension from outweighing a 2000-check one.
pub const MIN_SAMPLE: u32 = 200;

/// Display/priority multiplier for holistic findings in the work queue.
/// It never enters the score formulas.
pub const HOLISTIC_MULTIPLIER: f64 = 10.0;

/// Fixed denominator for every subjective dimension.
pub const SUBJECTIVE_CHECKS: u32 = 10;

/// Pool blend fractions.
pub const MECHANICAL_WEIGHT_FRACTION: f64 = 0.40;
pub const SUBJECTIVE_WEIGHT_FRACTION: f64 = 0.60;

/// Word-set Jaccard similarity at or above this makes a superseded finding
/// a remap candidate.
pub const REMAP_SIMILARITY: f64 = 0.7;

/// Which statuses count as failures, per channel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    Lenient,
    Strict,
    VerifiedStrict,
}

impl ScoreMode {
    pub fn failure_set(self) -> &'static [FindingStatus] {
        match self {
            ScoreMode::Lenient => &[FindingStatus::Open],
            ScoreMode::Strict => &[FindingStatus::Open, FindingStatus::Wontfix],
            ScoreMode::VerifiedStrict => &[
                FindingStatus::Open,
                FindingStatus::Wontfix,
                FindingStatus::Fixed,
                FindingStatus::FalsePositive,
            ],
        }
    }
}

/// Per-file weight cap by finding count in the file group.
pub fn file_cap(group_size: usize) -> f64 {
    match group_size {
        0..=2 => 1.0,
        3..=5 => 1.5,
        _ => 2.0,
    }
}

/// The twelve fixed subjective dimensions and their configured weights.
pub const SUBJECTIVE_DIMENSIONS: &[(&str, f64)] = &[
    ("high_elegance", 22.0),
    ("mid_elegance", 22.0),
    ("low_elegance", 12.0),
    ("contracts", 12.0),
    ("type_safety", 12.0),
    ("design_coherence", 10.0),
    ("abstraction", 8.0),
    ("logic_clarity", 6.0),
    ("structure_nav", 5.0),
    ("error_consistency", 3.0),
    ("naming_quality", 2.0),
    ("ai_debt", 1.0),
];

/// Configured weight of a subjective dimension, if it is one of the twelve.
pub fn subjective_weight(dimension: &str) -> Option<f64> {
    SUBJECTIVE_DIMENSIONS
        .iter()
        .find(|(name, _)| *name == dimension)
        .map(|(_, w)| *w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_sets_are_nested() {
        let lenient = ScoreMode::Lenient.failure_set();
        let strict = ScoreMode::Strict.failure_set();
        let verified = ScoreMode::VerifiedStrict.failure_set();
        assert!(lenient.iter().all(|s| strict.contains(s)));
        assert!(strict.iter().all(|s| verified.contains(s)));
        assert!(!verified.contains(&FindingStatus::AutoResolved));
    }

    #[test]
    fn test_file_cap_boundaries() {
        assert_eq!(file_cap(2), 1.0);
        assert_eq!(file_cap(3), 1.5);
        assert_eq!(file_cap(5), 1.5);
        assert_eq!(file_cap(6), 2.0);
    }

    #[test]
    fn test_subjective_weights_sum() {
        let total: f64 = SUBJECTIVE_DIMENSIONS.iter().map(|(_, w)| w).sum();
        assert_eq!(total, 115.0);
        assert_eq!(SUBJECTIVE_DIMENSIONS.len(), 12);
    }

    #[test]
    fn test_pool_fractions_sum_to_one() {
        assert_eq!(MECHANICAL_WEIGHT_FRACTION + SUBJECTIVE_WEIGHT_FRACTION, 1.0);
    }
}
