//! Score computation.
//!
//! One pass per mode: per-detector weighted failure sums (zone exclusion,
//! suppression exclusion, per-file capping), aggregated into mechanical
//! dimensions, sample-dampened, and blended with the subjective pool.

use std::collections::BTreeMap;

use crate::models::{Finding, FindingStatus, SubjectiveAssessment};
use crate::registry::{DetectorKind, Dimension};
use crate::scoring::policy::{
    file_cap, subjective_weight, ScoreMode, MECHANICAL_WEIGHT_FRACTION, MIN_SAMPLE,
    SUBJECTIVE_WEIGHT_FRACTION,
};
use crate::zones::{zone_policy, ZonePolicy};

/// One dimension's computed score and its blend inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionScore {
    pub score: f64,
    pub checks: u32,
    pub weighted_failures: f64,
    pub effective_weight: f64,
}

/// All four channels plus the lenient per-dimension breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBundle {
    pub overall: f64,
    pub objective: f64,
    pub strict: f64,
    pub verified_strict: f64,
    pub mechanical: BTreeMap<Dimension, DimensionScore>,
    pub subjective: BTreeMap<String, DimensionScore>,
}

impl ScoreBundle {
    pub fn channels(&self) -> crate::state::ScoreChannels {
        crate::state::ScoreChannels {
            overall: self.overall,
            objective: self.objective,
            strict: self.strict,
            verified_strict: self.verified_strict,
        }
    }
}

/// Is this finding a scoring failure under `mode`?
fn counts_as_failure(finding: &Finding, mode: ScoreMode) -> bool {
    if finding.suppressed {
        return false;
    }
    if finding.zone.excluded_from_scoring()
        || zone_policy(finding.detector, finding.zone) == ZonePolicy::Skip
    {
        return false;
    }
    mode.failure_set().contains(&finding.status)
}

/// Per-detector weighted failure sums for one mode.
fn weighted_failure_sums<'a, I>(findings: I, mode: ScoreMode) -> BTreeMap<DetectorKind, f64>
where
    I: Iterator<Item = &'a Finding>,
{
    // detector -> file -> weights; holistic contributions tracked apart
    // because they bypass per-file caps.
    let mut per_file: BTreeMap<DetectorKind, BTreeMap<&'a str, Vec<f64>>> = BTreeMap::new();
    let mut uncapped: BTreeMap<DetectorKind, f64> = BTreeMap::new();
    let mut loc_weights: BTreeMap<(DetectorKind, &'a str), f64> = BTreeMap::new();

    for finding in findings {
        if !counts_as_failure(finding, mode) {
            continue;
        }
        let meta = finding.detector.meta();
        if meta.holistic || !meta.file_based {
            *uncapped.entry(finding.detector).or_insert(0.0) += finding.weight();
            continue;
        }
        let group = per_file
            .entry(finding.detector)
            .or_default()
            .entry(finding.file.as_str())
            .or_default();
        // LOC-weighted detectors carry their cap on the first finding.
        if group.is_empty() {
            if let Some(loc_weight) = finding.detail.loc_weight {
                loc_weights.insert((finding.detector, finding.file.as_str()), loc_weight);
            }
        }
        group.push(finding.weight());
    }

    let mut sums: BTreeMap<DetectorKind, f64> = uncapped;
    for (detector, files) in per_file {
        let mut total = 0.0;
        for (file, weights) in files {
            let sum: f64 = weights.iter().sum();
            let cap = loc_weights
                .get(&(detector, file))
                .copied()
                .unwrap_or_else(|| file_cap(weights.len()));
            total += sum.min(cap);
        }
        *sums.entry(detector).or_insert(0.0) += total;
    }
    sums
}

/// Mechanical dimension scores for one mode. Dimensions with zero checks
/// are absent from the result (and from the blend).
fn mechanical_scores(
    findings: &BTreeMap<String, Finding>,
    potentials: &BTreeMap<DetectorKind, u32>,
    mode: ScoreMode,
) -> BTreeMap<Dimension, DimensionScore> {
    let failure_sums = weighted_failure_sums(findings.values(), mode);

    let mut result = BTreeMap::new();
    for dimension in Dimension::all() {
        let mut checks = 0u32;
        let mut weighted_failures = 0.0;
        for kind in DetectorKind::ALL {
            if kind.dimension() != dimension {
                continue;
            }
            checks += potentials.get(&kind).copied().unwrap_or(0);
            weighted_failures += failure_sums.get(&kind).copied().unwrap_or(0.0);
        }
        if checks == 0 {
            continue;
        }
        let ratio = (f64::from(checks) - weighted_failures) / f64::from(checks);
        let score = (ratio.max(0.0) * 100.0).clamp(0.0, 100.0);
        let dampening = (f64::from(checks) / f64::from(MIN_SAMPLE)).min(1.0);
        result.insert(
            dimension,
            DimensionScore {
                score,
                checks,
                weighted_failures,
                effective_weight: dimension.weight() * dampening,
            },
        );
    }
    result
}

fn subjective_scores(
    assessments: &BTreeMap<String, SubjectiveAssessment>,
) -> BTreeMap<String, DimensionScore> {
    let mut result = BTreeMap::new();
    for (dimension, assessment) in assessments {
        let Some(weight) = subjective_weight(dimension) else {
            continue;
        };
        result.insert(
            dimension.clone(),
            DimensionScore {
                score: assessment.score.clamp(0.0, 100.0),
                checks: crate::scoring::policy::SUBJECTIVE_CHECKS,
                weighted_failures: 0.0,
                effective_weight: weight,
            },
        );
    }
    result
}

fn weighted_average<'a, I>(scores: I) -> Option<f64>
where
    I: Iterator<Item = &'a DimensionScore>,
{
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for s in scores {
        numerator += s.score * s.effective_weight;
        denominator += s.effective_weight;
    }
    (denominator > 0.0).then(|| numerator / denominator)
}

/// Blend pools; a missing pool renormalizes the other to 1.0, and a repo
/// with neither pool (nothing checked) is perfect.
fn blend(mechanical: Option<f64>, subjective: Option<f64>) -> f64 {
    match (mechanical, subjective) {
        (Some(m), Some(s)) => {
            MECHANICAL_WEIGHT_FRACTION * m + SUBJECTIVE_WEIGHT_FRACTION * s
        }
        (Some(m), None) => m,
        (None, Some(s)) => s,
        (None, None) => 100.0,
    }
}

/// Compute all four channels.
pub fn compute_scores(
    findings: &BTreeMap<String, Finding>,
    potentials: &BTreeMap<DetectorKind, u32>,
    assessments: &BTreeMap<String, SubjectiveAssessment>,
) -> ScoreBundle {
    let subjective = subjective_scores(assessments);
    let subjective_avg = weighted_average(subjective.values());

    let per_mode = |mode: ScoreMode| {
        let scores = mechanical_scores(findings, potentials, mode);
        let avg = weighted_average(scores.values());
        (scores, avg)
    };

    let (lenient_scores, lenient_avg) = per_mode(ScoreMode::Lenient);
    let (_, strict_avg) = per_mode(ScoreMode::Strict);
    let (_, verified_avg) = per_mode(ScoreMode::VerifiedStrict);

    ScoreBundle {
        overall: blend(lenient_avg, subjective_avg),
        objective: lenient_avg.unwrap_or(100.0),
        strict: blend(strict_avg, subjective_avg),
        verified_strict: blend(verified_avg, subjective_avg),
        mechanical: lenient_scores,
        subjective,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{finding_id, Confidence, Finding, FindingDetail, Tier};
    use crate::zones::Zone;
    use chrono::Utc;

    fn finding(
        detector: DetectorKind,
        file: &str,
        symbol: &str,
        tier: Tier,
        confidence: Confidence,
        status: FindingStatus,
    ) -> Finding {
        let now = Utc::now();
        Finding {
            id: finding_id(detector, file, symbol),
            detector,
            file: file.into(),
            tier,
            confidence,
            status,
            summary: "issue".into(),
            first_seen: now,
            last_seen: now,
            resolved_at: None,
            reopen_count: 0,
            suppressed: false,
            suppression_pattern: None,
            suppressed_at: None,
            resolution_attestation: None,
            zone: Zone::Production,
            lang: "python".into(),
            detail: FindingDetail::default(),
        }
    }

    fn into_map(findings: Vec<Finding>) -> BTreeMap<String, Finding> {
        findings.into_iter().map(|f| (f.id.clone(), f)).collect()
    }

    #[test]
    fn test_empty_repo_scores_100() {
        let bundle = compute_scores(&BTreeMap::new(), &BTreeMap::new(), &BTreeMap::new());
        assert_eq!(bundle.overall, 100.0);
        assert_eq!(bundle.objective, 100.0);
        assert_eq!(bundle.strict, 100.0);
        assert_eq!(bundle.verified_strict, 100.0);
    }

    #[test]
    fn test_single_t3_high_security_finding() {
        // Weighted failure 3.0 over 100 checks -> 97.0 on every channel.
        let findings = into_map(vec![finding(
            DetectorKind::Security,
            "src/db.py",
            "L10",
            Tier::Judgment,
            Confidence::High,
            FindingStatus::Open,
        )]);
        let potentials = BTreeMap::from([(DetectorKind::Security, 100)]);
        let bundle = compute_scores(&findings, &potentials, &BTreeMap::new());
        assert!((bundle.overall - 97.0).abs() < 0.001);
        assert!((bundle.objective - 97.0).abs() < 0.001);
        assert!((bundle.strict - 97.0).abs() < 0.001);
        assert!((bundle.verified_strict - 97.0).abs() < 0.001);
        let dim = &bundle.mechanical[&Dimension::Security];
        assert_eq!(dim.checks, 100);
        assert!((dim.effective_weight - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_wontfix_counts_in_strict_only() {
        let findings = into_map(vec![finding(
            DetectorKind::Security,
            "src/db.py",
            "L10",
            Tier::Judgment,
            Confidence::High,
            FindingStatus::Wontfix,
        )]);
        let potentials = BTreeMap::from([(DetectorKind::Security, 100)]);
        let bundle = compute_scores(&findings, &potentials, &BTreeMap::new());
        assert!((bundle.overall - 100.0).abs() < 0.001);
        assert!((bundle.strict - 97.0).abs() < 0.001);
        assert!((bundle.verified_strict - 97.0).abs() < 0.001);
    }

    #[test]
    fn test_file_cap_applies_per_file() {
        // Six T2-high smells in one file: raw sum 12.0, cap 2.0.
        let mut findings = Vec::new();
        for i in 0..6 {
            findings.push(finding(
                DetectorKind::Smells,
                "src/app.py",
                &format!("L{i}"),
                Tier::QuickFix,
                Confidence::High,
                FindingStatus::Open,
            ));
        }
        let potentials = BTreeMap::from([(DetectorKind::Smells, 100)]);
        let bundle = compute_scores(&into_map(findings), &potentials, &BTreeMap::new());
        // (100 - 2) / 100 = 98
        assert!((bundle.objective - 98.0).abs() < 0.001);
    }

    #[test]
    fn test_loc_weight_overrides_group_cap() {
        let mut f = finding(
            DetectorKind::Large,
            "src/huge.py",
            "",
            Tier::MajorRefactor,
            Confidence::High,
            FindingStatus::Open,
        );
        f.detail.loc_weight = Some(3.0);
        let potentials = BTreeMap::from([(DetectorKind::Large, 100)]);
        let bundle = compute_scores(&into_map(vec![f]), &potentials, &BTreeMap::new());
        // weight 4.0 capped at loc_weight 3.0 -> (100-3)/100
        let dim = &bundle.mechanical[&Dimension::FileHealth];
        assert!((dim.weighted_failures - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_suppressed_and_excluded_zones_do_not_score() {
        let mut suppressed = finding(
            DetectorKind::Smells,
            "a.py",
            "L1",
            Tier::QuickFix,
            Confidence::High,
            FindingStatus::Open,
        );
        suppressed.suppressed = true;
        let mut vendored = finding(
            DetectorKind::Smells,
            "vendor/b.py",
            "L1",
            Tier::QuickFix,
            Confidence::High,
            FindingStatus::Open,
        );
        vendored.zone = Zone::Vendor;
        let potentials = BTreeMap::from([(DetectorKind::Smells, 50)]);
        let bundle = compute_scores(
            &into_map(vec![suppressed, vendored]),
            &potentials,
            &BTreeMap::new(),
        );
        assert_eq!(bundle.objective, 100.0);
    }

    #[test]
    fn test_subjective_pool_blend() {
        let findings = into_map(vec![finding(
            DetectorKind::Security,
            "src/db.py",
            "L10",
            Tier::Judgment,
            Confidence::High,
            FindingStatus::Open,
        )]);
        let potentials = BTreeMap::from([(DetectorKind::Security, 100)]);
        let assessments = BTreeMap::from([(
            "type_safety".to_string(),
            SubjectiveAssessment {
                score: 80.0,
                source: "trusted_internal".into(),
                assessed_at: Utc::now(),
                needs_review_refresh: false,
            },
        )]);
        let bundle = compute_scores(&findings, &potentials, &assessments);
        // 0.4 * 97 + 0.6 * 80 = 86.8
        assert!((bundle.overall - 86.8).abs() < 0.001);
        // objective ignores the subjective pool entirely
        assert!((bundle.objective - 97.0).abs() < 0.001);
    }

    #[test]
    fn test_channels_are_ordered() {
        let findings = into_map(vec![
            finding(
                DetectorKind::Smells,
                "a.py",
                "L1",
                Tier::QuickFix,
                Confidence::High,
                FindingStatus::Open,
            ),
            finding(
                DetectorKind::Smells,
                "b.py",
                "L2",
                Tier::QuickFix,
                Confidence::High,
                FindingStatus::Wontfix,
            ),
            finding(
                DetectorKind::Smells,
                "c.py",
                "L3",
                Tier::QuickFix,
                Confidence::High,
                FindingStatus::Fixed,
            ),
        ]);
        let potentials = BTreeMap::from([(DetectorKind::Smells, 100)]);
        let bundle = compute_scores(&findings, &potentials, &BTreeMap::new());
        assert!(bundle.overall >= bundle.strict);
        assert!(bundle.strict >= bundle.verified_strict);
    }

    #[test]
    fn test_min_sample_boundary_full_weight() {
        let potentials = BTreeMap::from([(DetectorKind::Security, MIN_SAMPLE)]);
        let bundle = compute_scores(&BTreeMap::new(), &potentials, &BTreeMap::new());
        let dim = &bundle.mechanical[&Dimension::Security];
        assert_eq!(dim.effective_weight, Dimension::Security.weight());
    }
}
