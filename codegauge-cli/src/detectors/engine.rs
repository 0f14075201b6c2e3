//! Phase execution engine.
//!
//! Runs the plugin's phases in order against an immutable `ScanContext`.
//! Failure policy: a phase that errors is logged with a stable code and
//! contributes zero findings and zero potentials; the scan continues. A
//! phase that reports skipped detectors (missing tools) keeps those
//! detectors out of the ran-set so the state merge never auto-resolves
//! their prior findings.
//!
//! Findings are sorted by id before they leave the engine: phases may
//! parallelize internally, and the merge must be deterministic regardless.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::detectors::base::{validate_finding, Phase, ScanContext};
use crate::errors::{codes, FatalError};
use crate::models::RawFinding;
use crate::registry::DetectorKind;

/// Collected output of a full phase run.
#[derive(Debug, Default)]
pub struct PhaseReport {
    /// All valid findings, sorted by id.
    pub findings: Vec<RawFinding>,
    /// Merged per-detector denominators.
    pub potentials: BTreeMap<DetectorKind, u32>,
    /// Detectors that fully completed. Only these may auto-resolve.
    pub ran: BTreeSet<DetectorKind>,
    /// (phase, code) pairs for phases that failed or were cut off.
    pub failures: Vec<(String, String)>,
}

/// Run every phase in order. Returns `FatalError::Cancelled` if the user
/// cancelled at a phase boundary: callers must not persist anything in
/// that case.
pub fn run_phases(ctx: &ScanContext, phases: &[Box<dyn Phase>]) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();

    for phase in phases {
        if ctx.cancelled() {
            return Err(FatalError::Cancelled.into());
        }
        if ctx.scan_deadline_exceeded() {
            warn!(
                "{}:{} scan timeout reached; remaining phases skipped",
                codes::PHASE_TIMEOUT,
                phase.name()
            );
            report
                .failures
                .push((phase.name().to_string(), codes::PHASE_TIMEOUT.to_string()));
            continue;
        }

        debug!("running phase {}", phase.name());
        match phase.run(ctx) {
            Ok(output) => {
                let skipped: BTreeSet<DetectorKind> = output.skipped.iter().copied().collect();
                for detector in phase.detectors() {
                    if !skipped.contains(detector) {
                        report.ran.insert(*detector);
                    }
                }
                for (detector, checks) in output.potentials {
                    *report.potentials.entry(detector).or_insert(0) += checks;
                }
                let (valid, dropped): (Vec<_>, Vec<_>) =
                    output.findings.into_iter().partition(validate_finding);
                if !dropped.is_empty() {
                    debug!("phase {} dropped {} invalid findings", phase.name(), dropped.len());
                }
                report.findings.extend(valid);
            }
            Err(e) => {
                // Zero findings, zero potentials; detectors stay out of the
                // ran-set so their prior findings survive untouched.
                warn!("{}:{} {e:#}", codes::PHASE_FAILED, phase.name());
                report
                    .failures
                    .push((phase.name().to_string(), codes::PHASE_FAILED.to_string()));
            }
        }
    }

    report.findings.sort_by(|a, b| a.id.cmp(&b.id));
    info!(
        "phase run complete: {} findings from {} detectors",
        report.findings.len(),
        report.ran.len()
    );
    Ok(report)
}
