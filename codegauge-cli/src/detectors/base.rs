//! Phase trait and shared scan context.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::Config;
use crate::discovery::SourceFile;
use crate::errors::codes;
use crate::graph::ImportGraph;
use crate::lang::LanguagePlugin;
use crate::models::RawFinding;
use crate::registry::DetectorKind;
use crate::state::State;
use crate::zones::{zone_policy, ZonePolicy};

/// Default per-external-tool wall-clock bound.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(120);
/// Default whole-scan bound, checked at phase boundaries.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Everything a phase may read. Built once per scan; registries and the
/// import graph are immutable for the scan's duration: there is no
/// process-wide mutable state to reach around this.
pub struct ScanContext<'a> {
    pub root: &'a Path,
    pub config: &'a Config,
    pub files: &'a [SourceFile],
    pub graph: &'a ImportGraph,
    pub plugin: &'a dyn LanguagePlugin,
    /// Prior state, for phases that compare against history (review
    /// freshness). None on first scan.
    pub prior: Option<&'a State>,
    /// Cooperative cancellation, checked at phase boundaries.
    pub cancel: Option<&'a AtomicBool>,
    pub started: Instant,
    pub tool_timeout: Duration,
    pub scan_timeout: Duration,
}

impl<'a> ScanContext<'a> {
    pub fn cancelled(&self) -> bool {
        self.cancel.map_or(false, |c| c.load(Ordering::Relaxed))
    }

    pub fn scan_deadline_exceeded(&self) -> bool {
        self.started.elapsed() > self.scan_timeout
    }

    /// Files a detector should examine in this scan, zone policy applied.
    /// The count of these is the detector's potentials value for file-based
    /// phases.
    pub fn eligible_files(&self, detector: DetectorKind) -> Vec<&'a SourceFile> {
        self.files
            .iter()
            .filter(|f| zone_policy(detector, f.zone) != ZonePolicy::Skip)
            .collect()
    }

    /// Apply the (detector, zone) policy to a finding: `None` means the
    /// zone skips this detector, `Downgrade` lowers the tier one step.
    pub fn apply_zone_policy(&self, mut finding: RawFinding) -> Option<RawFinding> {
        match zone_policy(finding.detector, finding.zone) {
            ZonePolicy::Skip => None,
            ZonePolicy::Downgrade => {
                finding.tier = finding.tier.downgraded();
                Some(finding)
            }
            ZonePolicy::Normal => Some(finding),
        }
    }
}

/// What one phase produced.
#[derive(Debug, Default)]
pub struct PhaseOutput {
    pub findings: Vec<RawFinding>,
    /// Denominators for scoring, per detector this phase drives.
    pub potentials: BTreeMap<DetectorKind, u32>,
    /// Detectors this phase could not run (missing tool). Their prior
    /// findings must not auto-resolve.
    pub skipped: Vec<DetectorKind>,
}

impl PhaseOutput {
    pub fn with_potential(mut self, detector: DetectorKind, checks: u32) -> Self {
        self.potentials.insert(detector, checks);
        self
    }
}

/// One step of the scan pipeline.
pub trait Phase: Send + Sync {
    fn name(&self) -> &'static str;

    /// Detectors this phase drives. On success they join the ran-set used
    /// by auto-resolve, minus any listed in `PhaseOutput::skipped`.
    fn detectors(&self) -> &'static [DetectorKind];

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput>;
}

/// Validate a finding coming out of a phase. Violations are dropped with a
/// structured warning rather than aborting the scan.
pub fn validate_finding(finding: &RawFinding) -> bool {
    let expected_prefix = format!("{}::{}::", finding.detector.name(), finding.file);
    if !finding.id.starts_with(&expected_prefix) {
        warn!(
            "{}:{} dropping finding with malformed id '{}'",
            codes::BAD_FINDING,
            finding.detector.name(),
            finding.id
        );
        return false;
    }
    if finding.file.is_empty() || finding.summary.is_empty() {
        warn!(
            "{}:{} dropping finding with missing required fields",
            codes::BAD_FINDING,
            finding.detector.name()
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finding_id;

    #[test]
    fn test_validate_accepts_canonical_id() {
        let f = RawFinding::new(DetectorKind::Large, "src/a.py", "", "too large");
        assert!(validate_finding(&f));
    }

    #[test]
    fn test_validate_rejects_mismatched_id() {
        let mut f = RawFinding::new(DetectorKind::Large, "src/a.py", "", "too large");
        f.id = finding_id(DetectorKind::Smells, "src/a.py", "");
        assert!(!validate_finding(&f));
    }

    #[test]
    fn test_validate_rejects_empty_summary() {
        let f = RawFinding::new(DetectorKind::Large, "src/a.py", "", "");
        assert!(!validate_finding(&f));
    }
}
