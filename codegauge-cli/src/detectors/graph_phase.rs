//! Graph phase: coupling, import cycles, orphaned files.
//!
//! Requires the import graph, so it runs after discovery builds it. Cycle
//! findings are cross-file: their identity is a hash of the full sorted
//! member set, so a refactor that keeps two of three members produces a new
//! finding rather than a misleading reopen of the old one.

use anyhow::Result;
use rustc_hash::FxHashMap;

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::models::{member_set_symbol, Confidence, FindingDetail, RawFinding};
use crate::registry::DetectorKind;

/// Outgoing dependencies past which a file is considered over-coupled.
const FAN_OUT_THRESHOLD: u32 = 15;
/// Incoming dependencies past which a file is a change bottleneck.
const FAN_IN_THRESHOLD: u32 = 25;

pub struct GraphPhase;

impl GraphPhase {
    fn coupling_findings(ctx: &ScanContext) -> (Vec<RawFinding>, u32) {
        let eligible = ctx.eligible_files(DetectorKind::Coupling);
        let mut findings = Vec::new();
        for file in &eligible {
            let fan_out = ctx.graph.fan_out(&file.path);
            let fan_in = ctx.graph.fan_in(&file.path);
            if fan_out < FAN_OUT_THRESHOLD && fan_in < FAN_IN_THRESHOLD {
                continue;
            }
            let summary = if fan_out >= FAN_OUT_THRESHOLD {
                format!("imports {fan_out} files (threshold {FAN_OUT_THRESHOLD})")
            } else {
                format!("imported by {fan_in} files (threshold {FAN_IN_THRESHOLD})")
            };
            let mut detail = FindingDetail::default();
            detail.extra.insert("fan_in".into(), fan_in.into());
            detail.extra.insert("fan_out".into(), fan_out.into());
            let mut finding = RawFinding::new(DetectorKind::Coupling, &file.path, "", summary)
                .with_confidence(Confidence::Medium)
                .with_detail(detail);
            finding.zone = file.zone;
            finding.lang = file.lang.clone();
            findings.push(finding);
        }
        (findings, eligible.len() as u32)
    }

    fn cycle_findings(ctx: &ScanContext) -> (Vec<RawFinding>, u32) {
        let zones: FxHashMap<&str, _> = ctx
            .files
            .iter()
            .map(|f| (f.path.as_str(), (f.zone, f.lang.clone())))
            .collect();
        let mut findings = Vec::new();
        for members in ctx.graph.cycles() {
            // Members come back sorted; the first is the representative file.
            let symbol = member_set_symbol(&members);
            let representative = members[0].clone();
            let (zone, lang) = zones
                .get(representative.as_str())
                .cloned()
                .unwrap_or_default();
            let mut finding = RawFinding::new(
                DetectorKind::Cycles,
                &representative,
                &symbol,
                format!("import cycle across {} files", members.len()),
            )
            .with_detail(FindingDetail {
                members,
                ..Default::default()
            });
            finding.zone = zone;
            finding.lang = lang;
            findings.push(finding);
        }
        // Denominator: every file participating in the cycle universe.
        (findings, ctx.graph.node_count() as u32)
    }

    fn orphan_findings(ctx: &ScanContext) -> (Vec<RawFinding>, u32) {
        let eligible = ctx.eligible_files(DetectorKind::Orphaned);
        let entry_patterns = ctx.plugin.entry_patterns();
        let mut findings = Vec::new();
        for file in &eligible {
            if !ctx.graph.is_orphaned(file, entry_patterns) {
                continue;
            }
            let mut finding = RawFinding::new(
                DetectorKind::Orphaned,
                &file.path,
                "",
                "no imports reference this file and no entry pattern claims it",
            )
            .with_confidence(Confidence::Medium)
            .with_detail(FindingDetail {
                loc: Some(file.loc),
                ..Default::default()
            });
            finding.zone = file.zone;
            finding.lang = file.lang.clone();
            findings.push(finding);
        }
        (findings, eligible.len() as u32)
    }
}

impl Phase for GraphPhase {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[
            DetectorKind::Coupling,
            DetectorKind::Cycles,
            DetectorKind::Orphaned,
        ]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let (coupling, coupling_checks) = Self::coupling_findings(ctx);
        let (cycles, cycle_checks) = Self::cycle_findings(ctx);
        let (orphans, orphan_checks) = Self::orphan_findings(ctx);

        let mut findings = coupling;
        findings.extend(cycles);
        findings.extend(orphans);
        let findings = findings
            .into_iter()
            .filter_map(|f| ctx.apply_zone_policy(f))
            .collect();

        Ok(PhaseOutput {
            findings,
            ..PhaseOutput::default()
        }
        .with_potential(DetectorKind::Coupling, coupling_checks)
        .with_potential(DetectorKind::Cycles, cycle_checks)
        .with_potential(DetectorKind::Orphaned, orphan_checks))
    }
}
