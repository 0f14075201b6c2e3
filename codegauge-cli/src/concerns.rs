//! Concern synthesis: mechanical findings -> higher-level design questions.
//!
//! Concerns are ephemeral: computed on demand from current state, never
//! persisted as findings. Each carries a fingerprint (SHA-256 of its sorted
//! canonical evidence, truncated to 16 hex chars) so a user dismissal
//! sticks for as long as the triggering findings are unchanged.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::models::Finding;
use crate::registry::DetectorKind;
use crate::state::State;

/// Signal thresholds that flag a file on their own.
const PARAMS_THRESHOLD: f64 = 8.0;
const NESTING_THRESHOLD: f64 = 6.0;
const LOC_THRESHOLD: f64 = 300.0;
/// Files sharing a detector profile before it is a systemic pattern.
const SYSTEMIC_PATTERN_FILES: usize = 3;
/// Files sharing one smell before it is a systemic smell.
const SYSTEMIC_SMELL_FILES: usize = 5;

/// Concern classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcernType {
    MixedResponsibilities,
    DuplicationDesign,
    CouplingDesign,
    InterfaceDesign,
    StructuralComplexity,
    SystemicPattern,
    SystemicSmell,
    DesignConcern,
}

/// A potential design problem surfaced by mechanical signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Concern {
    pub kind: ConcernType,
    /// Primary file (first affected file for cross-file concerns).
    pub file: String,
    pub summary: String,
    pub evidence: Vec<String>,
    pub fingerprint: String,
    pub source_findings: Vec<String>,
}

/// SHA-256 over the canonical evidence key, truncated to 16 hex chars.
fn fingerprint(kind: &str, file: &str, key_signals: &[String]) -> String {
    let mut sorted = key_signals.to_vec();
    sorted.sort();
    let raw = format!("{kind}::{file}::{}", sorted.join(","));
    let digest = Sha256::digest(raw.as_bytes());
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()[..16]
        .to_string()
}

/// A dismissal holds while the concern's source findings are unchanged.
fn is_dismissed(state: &State, fp: &str, source_ids: &[String]) -> bool {
    state.concern_dismissals.get(fp).is_some_and(|entry| {
        let prev: std::collections::BTreeSet<&String> =
            entry.source_finding_ids.iter().collect();
        let current: std::collections::BTreeSet<&String> = source_ids.iter().collect();
        prev == current
    })
}

#[derive(Default)]
struct FileSignals {
    max_params: f64,
    max_nesting: f64,
    loc: f64,
    has_monster: bool,
}

fn extract_signals(findings: &[&Finding]) -> FileSignals {
    let mut signals = FileSignals::default();
    for f in findings {
        if let Some(loc) = f.detail.loc {
            signals.loc = signals.loc.max(f64::from(loc));
        }
        if let Some(v) = f.detail.extra.get("max_params").and_then(|v| v.as_f64()) {
            signals.max_params = signals.max_params.max(v);
        }
        if let Some(v) = f.detail.extra.get("max_nesting").and_then(|v| v.as_f64()) {
            signals.max_nesting = signals.max_nesting.max(v);
        }
        if f.detail.smell_id.as_deref() == Some("monster_function") {
            signals.has_monster = true;
        }
    }
    signals
}

fn has_elevated_signals(signals: &FileSignals, detectors: &[DetectorKind]) -> bool {
    signals.max_params >= PARAMS_THRESHOLD
        || signals.max_nesting >= NESTING_THRESHOLD
        || signals.loc >= LOC_THRESHOLD
        || signals.has_monster
        || detectors.iter().any(|d| {
            matches!(
                d,
                DetectorKind::Dupes | DetectorKind::BoilerplateDuplication | DetectorKind::Coupling
            )
        })
}

fn classify(detectors: &[DetectorKind], signals: &FileSignals) -> ConcernType {
    if detectors.len() >= 3 {
        return ConcernType::MixedResponsibilities;
    }
    if detectors
        .iter()
        .any(|d| matches!(d, DetectorKind::Dupes | DetectorKind::BoilerplateDuplication))
    {
        return ConcernType::DuplicationDesign;
    }
    if signals.has_monster || signals.max_nesting >= NESTING_THRESHOLD
        || signals.loc >= LOC_THRESHOLD
    {
        return ConcernType::StructuralComplexity;
    }
    if detectors.contains(&DetectorKind::Coupling) {
        return ConcernType::CouplingDesign;
    }
    if signals.max_params >= PARAMS_THRESHOLD {
        return ConcernType::InterfaceDesign;
    }
    ConcernType::DesignConcern
}

fn concern_type_key(kind: ConcernType) -> &'static str {
    match kind {
        ConcernType::MixedResponsibilities => "mixed_responsibilities",
        ConcernType::DuplicationDesign => "duplication_design",
        ConcernType::CouplingDesign => "coupling_design",
        ConcernType::InterfaceDesign => "interface_design",
        ConcernType::StructuralComplexity => "structural_complexity",
        ConcernType::SystemicPattern => "systemic_pattern",
        ConcernType::SystemicSmell => "systemic_smell",
        ConcernType::DesignConcern => "design_concern",
    }
}

fn group_open_by_file(state: &State) -> BTreeMap<&str, Vec<&Finding>> {
    let mut by_file: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for finding in state.open_findings() {
        if finding.file.is_empty() || finding.file == "." {
            continue;
        }
        by_file.entry(finding.file.as_str()).or_default().push(finding);
    }
    by_file
}

/// Per-file concerns from aggregated judgment-detector signals.
fn file_concerns(state: &State, concerns: &mut Vec<Concern>) {
    let judgment: Vec<DetectorKind> = DetectorKind::judgment_detectors().collect();
    for (file, findings) in group_open_by_file(state) {
        let judgment_findings: Vec<&Finding> = findings
            .iter()
            .copied()
            .filter(|f| judgment.contains(&f.detector))
            .collect();
        if judgment_findings.is_empty() {
            continue;
        }
        let mut detectors: Vec<DetectorKind> =
            judgment_findings.iter().map(|f| f.detector).collect();
        detectors.sort();
        detectors.dedup();

        let signals = extract_signals(&judgment_findings);
        let elevated = has_elevated_signals(&signals, &detectors);
        // 2+ judgment detectors, 1 with elevated signals, or 1 judgment
        // detector amid 3+ mechanical findings.
        if detectors.len() < 2 && !elevated && findings.len() < 3 {
            continue;
        }

        let kind = classify(&detectors, &signals);
        let detector_names: Vec<String> =
            detectors.iter().map(|d| d.name().to_string()).collect();
        let mut source_ids: Vec<String> =
            judgment_findings.iter().map(|f| f.id.clone()).collect();
        source_ids.sort();

        let fp = fingerprint(concern_type_key(kind), file, &detector_names);
        if is_dismissed(state, &fp, &source_ids) {
            continue;
        }

        let mut evidence = vec![format!("flagged by: {}", detector_names.join(", "))];
        if signals.loc > 0.0 {
            evidence.push(format!("file size: {} lines", signals.loc as u64));
        }
        if signals.max_params >= PARAMS_THRESHOLD {
            evidence.push(format!("max parameters: {}", signals.max_params as u64));
        }
        if signals.max_nesting >= NESTING_THRESHOLD {
            evidence.push(format!("max nesting depth: {}", signals.max_nesting as u64));
        }
        for f in judgment_findings.iter().take(10) {
            evidence.push(format!("[{}] {}", f.detector.name(), f.summary));
        }

        concerns.push(Concern {
            kind,
            file: file.to_string(),
            summary: format!(
                "issues from {} detectors may point at a design problem",
                detectors.len()
            ),
            evidence,
            fingerprint: fp,
            source_findings: source_ids,
        });
    }
}

/// Same judgment-detector profile across several files.
fn cross_file_patterns(state: &State, concerns: &mut Vec<Concern>) {
    let judgment: Vec<DetectorKind> = DetectorKind::judgment_detectors().collect();
    let by_file = group_open_by_file(state);

    let mut profiles: BTreeMap<Vec<&'static str>, Vec<&str>> = BTreeMap::new();
    for (file, findings) in &by_file {
        let mut dets: Vec<&'static str> = findings
            .iter()
            .filter(|f| judgment.contains(&f.detector))
            .map(|f| f.detector.name())
            .collect();
        dets.sort_unstable();
        dets.dedup();
        if dets.len() >= 2 {
            profiles.entry(dets).or_default().push(file);
        }
    }

    for (combo, mut files) in profiles {
        if files.len() < SYSTEMIC_PATTERN_FILES {
            continue;
        }
        files.sort_unstable();
        let mut source_ids: Vec<String> = files
            .iter()
            .flat_map(|f| by_file[f].iter())
            .filter(|f| combo.contains(&f.detector.name()))
            .map(|f| f.id.clone())
            .collect();
        source_ids.sort();

        let combo_names: Vec<String> = combo.iter().map(|s| s.to_string()).collect();
        // First few files bound the fingerprint so it stays stable.
        let fp = fingerprint(
            "systemic_pattern",
            &files[..files.len().min(5)].join(","),
            &combo_names,
        );
        if is_dismissed(state, &fp, &source_ids) {
            continue;
        }
        concerns.push(Concern {
            kind: ConcernType::SystemicPattern,
            file: files[0].to_string(),
            summary: format!(
                "{} files share the same problem pattern ({})",
                files.len(),
                combo.join(", ")
            ),
            evidence: vec![
                format!("affected files: {}", files[..files.len().min(10)].join(", ")),
                format!("shared detectors: {}", combo.join(", ")),
            ],
            fingerprint: fp,
            source_findings: source_ids,
        });
    }
}

/// One smell id recurring across many files.
fn systemic_smells(state: &State, concerns: &mut Vec<Concern>) {
    let mut smell_files: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut smell_ids: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for finding in state.open_findings() {
        if finding.detector != DetectorKind::Smells {
            continue;
        }
        let Some(smell_id) = finding.detail.smell_id.as_deref() else {
            continue;
        };
        if finding.file.is_empty() || finding.file == "." {
            continue;
        }
        smell_files.entry(smell_id).or_default().push(&finding.file);
        smell_ids.entry(smell_id).or_default().push(finding.id.clone());
    }

    for (smell_id, files) in smell_files {
        let mut unique: Vec<&str> = files;
        unique.sort_unstable();
        unique.dedup();
        if unique.len() < SYSTEMIC_SMELL_FILES {
            continue;
        }
        let mut source_ids = smell_ids.remove(smell_id).unwrap_or_default();
        source_ids.sort();
        let fp = fingerprint("systemic_smell", smell_id, &[smell_id.to_string()]);
        if is_dismissed(state, &fp, &source_ids) {
            continue;
        }
        concerns.push(Concern {
            kind: ConcernType::SystemicSmell,
            file: unique[0].to_string(),
            summary: format!("'{smell_id}' appears in {} files", unique.len()),
            evidence: vec![
                format!("smell: {smell_id}"),
                format!(
                    "affected files ({}): {}",
                    unique.len(),
                    unique[..unique.len().min(10)].join(", ")
                ),
            ],
            fingerprint: fp,
            source_findings: source_ids,
        });
    }
}

/// Run all generators; deduplicate by fingerprint, sort by (kind, file).
pub fn generate_concerns(state: &State) -> Vec<Concern> {
    let mut concerns = Vec::new();
    file_concerns(state, &mut concerns);
    cross_file_patterns(state, &mut concerns);
    systemic_smells(state, &mut concerns);

    let mut seen = std::collections::BTreeSet::new();
    concerns.retain(|c| seen.insert(c.fingerprint.clone()));
    concerns.sort_by(|a, b| {
        concern_type_key(a.kind)
            .cmp(concern_type_key(b.kind))
            .then(a.file.cmp(&b.file))
    });
    concerns
}

/// Drop dismissals whose source findings have all left the open set.
pub fn cleanup_stale_dismissals(state: &mut State) -> usize {
    let open_ids: std::collections::BTreeSet<String> =
        state.open_findings().map(|f| f.id.clone()).collect();
    let stale: Vec<String> = state
        .concern_dismissals
        .iter()
        .filter(|(_, entry)| {
            !entry.source_finding_ids.is_empty()
                && !entry.source_finding_ids.iter().any(|id| open_ids.contains(id))
        })
        .map(|(fp, _)| fp.clone())
        .collect();
    for fp in &stale {
        state.concern_dismissals.remove(fp);
    }
    stale.len()
}
