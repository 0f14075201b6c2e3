//! Review-freshness phase.
//!
//! Subjective assessments go stale: when a dimension has not been
//! re-reviewed within the configured window, or the state merge flagged it
//! `needs_review_refresh` after its mechanical inputs shifted, this phase
//! surfaces a repo-wide finding prompting a fresh review pass. These are
//! judgment items; they never auto-fix.

use anyhow::Result;
use chrono::Utc;

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::models::{Confidence, FindingDetail, RawFinding};
use crate::registry::DetectorKind;

/// Repo-wide findings anchor to the repository root pseudo-path.
const REPO_FILE: &str = ".";

pub struct ReviewCoveragePhase;

impl Phase for ReviewCoveragePhase {
    fn name(&self) -> &'static str {
        "review_coverage"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[DetectorKind::ReviewCoverage]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let Some(prior) = ctx.prior else {
            // First scan: nothing has been reviewed yet, nothing is stale.
            return Ok(PhaseOutput::default().with_potential(DetectorKind::ReviewCoverage, 0));
        };

        let max_age = chrono::Duration::days(i64::from(ctx.config.review_max_age_days));
        let holistic_max_age =
            chrono::Duration::days(i64::from(ctx.config.holistic_max_age_days));
        let now = Utc::now();

        let mut findings = Vec::new();
        for (dimension, assessment) in &prior.subjective_assessments {
            let age = now - assessment.assessed_at;
            let limit = if dimension.starts_with("holistic") {
                holistic_max_age
            } else {
                max_age
            };
            let stale_by_age = age > limit;
            if !stale_by_age && !assessment.needs_review_refresh {
                continue;
            }
            let reason = if assessment.needs_review_refresh {
                "mechanical inputs changed since last review"
            } else {
                "review is past its maximum age"
            };
            let mut detail = FindingDetail::default();
            detail
                .extra
                .insert("dimension".into(), dimension.clone().into());
            detail
                .extra
                .insert("age_days".into(), age.num_days().into());
            findings.push(
                RawFinding::new(
                    DetectorKind::ReviewCoverage,
                    REPO_FILE,
                    dimension,
                    format!("'{dimension}' needs re-review: {reason}"),
                )
                .with_confidence(Confidence::High)
                .with_detail(detail),
            );
        }

        let checks = prior.subjective_assessments.len() as u32;
        Ok(PhaseOutput {
            findings,
            ..PhaseOutput::default()
        }
        .with_potential(DetectorKind::ReviewCoverage, checks))
    }
}
