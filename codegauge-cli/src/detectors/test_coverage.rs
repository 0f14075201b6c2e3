//! Test-coverage phase.
//!
//! Structural coverage, not line coverage: does each production file have a
//! plausible companion test? A file counts as covered when a test-zone file
//! shares its stem (`scanner.py` -> `test_scanner.py` / `scanner_test.py`)
//! or imports it.

use anyhow::Result;
use rustc_hash::FxHashSet;

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::models::{Confidence, FindingDetail, RawFinding};
use crate::registry::DetectorKind;
use crate::zones::Zone;

/// Files below this many non-blank lines are not worth a coverage finding.
const MIN_LOC_FOR_COVERAGE: u32 = 20;

pub struct TestCoveragePhase;

impl Phase for TestCoveragePhase {
    fn name(&self) -> &'static str {
        "test_coverage"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[DetectorKind::TestCoverage]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let test_files: Vec<_> = ctx.files.iter().filter(|f| f.zone == Zone::Test).collect();

        // Stems claimed by tests, with test_/_test/_spec decoration stripped.
        let mut covered_stems: FxHashSet<String> = FxHashSet::default();
        for test in &test_files {
            let stem = test.stem();
            let bare = stem
                .strip_prefix("test_")
                .or_else(|| stem.strip_suffix("_test"))
                .or_else(|| stem.strip_suffix("_spec"))
                .or_else(|| stem.strip_suffix(".test"))
                .or_else(|| stem.strip_suffix(".spec"))
                .unwrap_or(stem);
            covered_stems.insert(bare.to_string());
        }

        // Files imported by any test are covered regardless of naming.
        let mut imported_by_tests: FxHashSet<&str> = FxHashSet::default();
        for test in &test_files {
            for target in ctx.graph.imports_of(&test.path) {
                imported_by_tests.insert(target);
            }
        }

        let eligible = ctx.eligible_files(DetectorKind::TestCoverage);
        let mut findings = Vec::new();
        for file in &eligible {
            if file.loc < MIN_LOC_FOR_COVERAGE {
                continue;
            }
            if covered_stems.contains(file.stem()) || imported_by_tests.contains(file.path.as_str())
            {
                continue;
            }
            let mut finding = RawFinding::new(
                DetectorKind::TestCoverage,
                &file.path,
                "",
                "no test file names or imports this module",
            )
            .with_confidence(Confidence::Medium)
            .with_detail(FindingDetail {
                loc: Some(file.loc),
                ..Default::default()
            });
            finding.zone = file.zone;
            finding.lang = file.lang.clone();
            if let Some(finding) = ctx.apply_zone_policy(finding) {
                findings.push(finding);
            }
        }

        Ok(PhaseOutput {
            findings,
            ..PhaseOutput::default()
        }
        .with_potential(DetectorKind::TestCoverage, eligible.len() as u32))
    }
}
