//! Integrity guard: anti-gaming checks on subjective scores.
//!
//! Runs after scoring. The core check is target-match detection: when two
//! or more subjective dimension scores sit suspiciously close to the
//! configured target, the assessments look anchored to the target rather
//! than observed. Repeat offenses get the matching dimensions zeroed for
//! the current scan: deterministically, with provenance recorded.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::warn;

use crate::models::SubjectiveAssessment;
use crate::scoring::compute::ScoreBundle;

/// Scores within this distance of the target count as a match.
pub const TARGET_MATCH_TOLERANCE: f64 = 0.05;

/// Dimensions that must match before a scan counts as suspicious.
pub const TARGET_MATCH_MIN_DIMENSIONS: usize = 2;

/// Suspicious scans before the penalty fires.
pub const SUBJECTIVE_TARGET_RESET_THRESHOLD: u32 = 2;

/// Strict-minus-lenient gap past which wontfix volume draws a warning.
pub const WONTFIX_GAP_LIMIT: f64 = 1.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    Disabled,
    #[default]
    Pass,
    Warn,
    Penalized,
}

/// Persistent integrity metadata on the state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    #[serde(default)]
    pub status: IntegrityStatus,
    /// Dimensions that matched the target in the most recent check.
    #[serde(default)]
    pub matched_dimensions: Vec<String>,
    /// Consecutive scans with a suspicious match.
    #[serde(default)]
    pub suspicious_scans: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    /// Scan number of the last penalty, for provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalized_at_scan: Option<u64>,
}

/// Outcome of one integrity pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityOutcome {
    pub status: IntegrityStatus,
    pub matched_dimensions: Vec<String>,
    /// Dimensions whose scores were reset to 0 this scan.
    pub reset_dimensions: Vec<String>,
    pub placeholder_dimensions: Vec<String>,
    pub wontfix_warning: Option<String>,
}

/// Is `score` within tolerance of `target`?
pub fn matches_target(score: f64, target: f64) -> bool {
    (score - target).abs() <= TARGET_MATCH_TOLERANCE
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)lorem ipsum|(?:^|\s)(?:TODO|TBD|FIXME)(?:[\s:]|$)").unwrap()
    })
}

/// Eight or more of the same character in a row reads as key-mashing.
fn has_long_char_run(text: &str) -> bool {
    let mut last = None;
    let mut run = 0;
    for c in text.chars() {
        if Some(c) == last {
            run += 1;
            if run >= 8 {
                return true;
            }
        } else {
            last = Some(c);
            run = 1;
        }
    }
    false
}

/// Placeholder content in a review note: boilerplate filler, bare markers,
/// or long character runs.
pub fn is_placeholder_text(text: &str) -> bool {
    placeholder_re().is_match(text) || has_long_char_run(text)
}

/// Run all integrity checks. Mutates `assessments` only when the penalty
/// fires (matching dimension scores reset to 0 for this scan), and updates
/// the persistent record.
pub fn run_integrity_checks(
    assessments: &mut BTreeMap<String, SubjectiveAssessment>,
    record: &mut IntegrityRecord,
    bundle: &ScoreBundle,
    target: f64,
    scan_count: u64,
    enabled: bool,
) -> IntegrityOutcome {
    let now = Utc::now();
    if !enabled {
        record.status = IntegrityStatus::Disabled;
        record.last_checked = Some(now);
        return IntegrityOutcome {
            status: IntegrityStatus::Disabled,
            ..Default::default()
        };
    }

    let mut outcome = IntegrityOutcome::default();

    // --- Target-match detection ---------------------------------------
    let matched: Vec<String> = assessments
        .iter()
        .filter(|(_, a)| matches_target(a.score, target))
        .map(|(dim, _)| dim.clone())
        .collect();

    if matched.len() >= TARGET_MATCH_MIN_DIMENSIONS {
        record.suspicious_scans += 1;
        if record.suspicious_scans >= SUBJECTIVE_TARGET_RESET_THRESHOLD {
            for dim in &matched {
                if let Some(assessment) = assessments.get_mut(dim) {
                    assessment.score = 0.0;
                }
            }
            outcome.reset_dimensions = matched.clone();
            outcome.status = IntegrityStatus::Penalized;
            record.penalized_at_scan = Some(scan_count);
            warn!(
                "integrity: {} dimensions anchored at target {target}; scores reset to 0",
                matched.len()
            );
        } else {
            outcome.status = IntegrityStatus::Warn;
            warn!(
                "integrity: {} dimensions within {TARGET_MATCH_TOLERANCE} of target {target}",
                matched.len()
            );
        }
    } else {
        record.suspicious_scans = 0;
        outcome.status = IntegrityStatus::Pass;
    }
    outcome.matched_dimensions = matched.clone();

    // --- Placeholder content ------------------------------------------
    for (dim, assessment) in assessments.iter() {
        if is_placeholder_text(&assessment.source) {
            outcome.placeholder_dimensions.push(dim.clone());
        }
    }

    // --- Wontfix accountability ---------------------------------------
    let gap = bundle.overall - bundle.strict;
    if gap > WONTFIX_GAP_LIMIT {
        outcome.wontfix_warning = Some(format!(
            "wontfix resolutions cost {gap:.1} points of strict score; review whether they are justified"
        ));
    }

    record.status = outcome.status;
    record.matched_dimensions = matched;
    record.last_checked = Some(now);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn assessment(score: f64) -> SubjectiveAssessment {
        SubjectiveAssessment {
            score,
            source: "trusted_internal".into(),
            assessed_at: Utc::now(),
            needs_review_refresh: false,
        }
    }

    fn empty_bundle() -> ScoreBundle {
        ScoreBundle {
            overall: 100.0,
            objective: 100.0,
            strict: 100.0,
            verified_strict: 100.0,
            mechanical: BTreeMap::new(),
            subjective: BTreeMap::new(),
        }
    }

    #[test]
    fn test_tolerance_boundary_inclusive() {
        assert!(matches_target(95.05, 95.0));
        assert!(matches_target(94.95, 95.0));
        assert!(!matches_target(95.06, 95.0));
    }

    #[test]
    fn test_single_match_passes() {
        let mut assessments = BTreeMap::from([
            ("contracts".to_string(), assessment(95.0)),
            ("type_safety".to_string(), assessment(70.0)),
        ]);
        let mut record = IntegrityRecord::default();
        let outcome = run_integrity_checks(
            &mut assessments,
            &mut record,
            &empty_bundle(),
            95.0,
            1,
            true,
        );
        assert_eq!(outcome.status, IntegrityStatus::Pass);
        assert_eq!(record.suspicious_scans, 0);
    }

    #[test]
    fn test_two_matches_warn_then_penalize() {
        let mut assessments = BTreeMap::from([
            ("contracts".to_string(), assessment(95.0)),
            ("type_safety".to_string(), assessment(95.03)),
        ]);
        let mut record = IntegrityRecord::default();

        let first = run_integrity_checks(
            &mut assessments,
            &mut record,
            &empty_bundle(),
            95.0,
            1,
            true,
        );
        assert_eq!(first.status, IntegrityStatus::Warn);
        assert!(first.reset_dimensions.is_empty());

        let second = run_integrity_checks(
            &mut assessments,
            &mut record,
            &empty_bundle(),
            95.0,
            2,
            true,
        );
        assert_eq!(second.status, IntegrityStatus::Penalized);
        assert_eq!(second.reset_dimensions.len(), 2);
        assert_eq!(assessments["contracts"].score, 0.0);
        assert_eq!(record.penalized_at_scan, Some(2));
    }

    #[test]
    fn test_disabled_skips_everything() {
        let mut assessments =
            BTreeMap::from([("contracts".to_string(), assessment(95.0))]);
        let mut record = IntegrityRecord::default();
        let outcome = run_integrity_checks(
            &mut assessments,
            &mut record,
            &empty_bundle(),
            95.0,
            1,
            false,
        );
        assert_eq!(outcome.status, IntegrityStatus::Disabled);
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder_text("Lorem ipsum dolor sit amet"));
        assert!(is_placeholder_text("TODO write this up"));
        assert!(is_placeholder_text("aaaaaaaaaa"));
        assert!(!is_placeholder_text("reviewed error handling in the scan module"));
    }

    #[test]
    fn test_wontfix_gap_warning() {
        let mut bundle = empty_bundle();
        bundle.strict = 97.0; // 3-point gap
        let mut assessments = BTreeMap::new();
        let mut record = IntegrityRecord::default();
        let outcome =
            run_integrity_checks(&mut assessments, &mut record, &bundle, 95.0, 1, true);
        assert!(outcome.wontfix_warning.is_some());
    }
}
