//! State merge: the central operation of every scan.
//!
//! Inputs: the prior state, this scan's findings (already sorted by id),
//! and the set of detectors that actually ran. Operations, in order:
//! upsert, auto-resolve, suppression, noise budget, stale-dimension
//! flagging. Auto-resolve is gated on the ran-set: a detector whose tool
//! was missing must not resolve anything, because absence of evidence from
//! a detector that never looked is not evidence of absence.
//!
//! Merging the same scan twice is a no-op (idempotence): the second pass
//! upserts every finding onto an already-Open twin and auto-resolves
//! nothing.

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSetBuilder};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::config::Config;
use crate::models::{Attestation, Finding, FindingStatus, RawFinding};
use crate::registry::DetectorKind;
use crate::state::State;

/// Mechanical changes from judgment detectors at or past this count flag
/// every subjective assessment for re-review.
const STALE_MECHANICAL_CHANGES: usize = 3;

/// Suppression tag recorded when the noise budget trims a detector's new
/// findings.
const NOISE_TAG: &str = "noise_budget";

/// Ids changed by one merge pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeResult {
    pub new: Vec<String>,
    pub resolved: Vec<String>,
    pub reopened: Vec<String>,
    pub noise_suppressed: usize,
}

/// Merge one scan's findings into the state. `ran` must contain only
/// detectors that fully completed their phase.
pub fn merge_findings(
    state: &mut State,
    findings: Vec<RawFinding>,
    ran: &BTreeSet<DetectorKind>,
    config: &Config,
    now: DateTime<Utc>,
) -> MergeResult {
    let mut result = MergeResult::default();
    let scanned_ids: BTreeSet<String> = findings.iter().map(|f| f.id.clone()).collect();

    // --- Upsert --------------------------------------------------------
    for raw in findings {
        match state.findings.get_mut(&raw.id) {
            None => {
                result.new.push(raw.id.clone());
                state.findings.insert(
                    raw.id.clone(),
                    Finding {
                        id: raw.id,
                        detector: raw.detector,
                        file: raw.file,
                        tier: raw.tier,
                        confidence: raw.confidence,
                        status: FindingStatus::Open,
                        summary: raw.summary,
                        first_seen: now,
                        last_seen: now,
                        resolved_at: None,
                        reopen_count: 0,
                        suppressed: false,
                        suppression_pattern: None,
                        suppressed_at: None,
                        resolution_attestation: None,
                        zone: raw.zone,
                        lang: raw.lang,
                        detail: raw.detail,
                    },
                );
            }
            Some(existing) => {
                existing.last_seen = now;
                existing.detail.merge_from(raw.detail);
                existing.summary = raw.summary;
                existing.tier = raw.tier;
                existing.confidence = raw.confidence;
                existing.zone = raw.zone;
                if existing.status != FindingStatus::Open {
                    let was_attested = existing.status.requires_attestation();
                    existing.status = FindingStatus::Open;
                    existing.reopen_count += 1;
                    existing.resolved_at = None;
                    if was_attested {
                        if let Some(attestation) = &mut existing.resolution_attestation {
                            attestation.kind = Some("manual_reopen".into());
                        }
                    }
                    result.reopened.push(existing.id.clone());
                }
            }
        }
    }

    // --- Auto-resolve --------------------------------------------------
    for finding in state.findings.values_mut() {
        if finding.status == FindingStatus::Open
            && ran.contains(&finding.detector)
            && !scanned_ids.contains(&finding.id)
        {
            finding.status = FindingStatus::AutoResolved;
            finding.resolved_at = Some(now);
            result.resolved.push(finding.id.clone());
        }
    }

    // --- Suppression ---------------------------------------------------
    apply_suppression(state, config, now);

    // --- Noise budget --------------------------------------------------
    result.noise_suppressed = apply_noise_budget(state, config, &result.new, now);

    // --- Stale-on-mechanical-change ------------------------------------
    let judgment: BTreeSet<DetectorKind> = DetectorKind::judgment_detectors().collect();
    let changed_judgment = result
        .new
        .iter()
        .chain(result.reopened.iter())
        .chain(result.resolved.iter())
        .filter(|id| {
            state
                .findings
                .get(*id)
                .is_some_and(|f| judgment.contains(&f.detector))
        })
        .count();
    if changed_judgment >= STALE_MECHANICAL_CHANGES {
        for assessment in state.subjective_assessments.values_mut() {
            assessment.needs_review_refresh = true;
        }
        debug!(
            "{changed_judgment} judgment findings changed; subjective assessments flagged for refresh"
        );
    }

    state.scan_count += 1;
    state.refresh_status_counts();
    info!(
        "merge: {} new, {} reopened, {} auto-resolved",
        result.new.len(),
        result.reopened.len(),
        result.resolved.len()
    );
    result
}

/// Apply user ignore globs: matching findings stay in state but are marked
/// suppressed and excluded from scoring.
fn apply_suppression(state: &mut State, config: &Config, now: DateTime<Utc>) {
    if config.ignore.is_empty() {
        return;
    }
    let mut builder = GlobSetBuilder::new();
    let mut patterns = Vec::new();
    for pattern in &config.ignore {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
            patterns.push(pattern.clone());
        }
    }
    let Ok(set) = builder.build() else { return };

    for finding in state.findings.values_mut() {
        let matches = set.matches(&finding.file);
        if let Some(&idx) = matches.first() {
            if !finding.suppressed {
                finding.suppressed = true;
                finding.suppression_pattern = Some(patterns[idx].clone());
                finding.suppressed_at = Some(now);
            }
        } else if finding
            .suppression_pattern
            .as_deref()
            .is_some_and(|p| p != NOISE_TAG)
        {
            // Pattern was removed from config; lift the suppression.
            finding.suppressed = false;
            finding.suppression_pattern = None;
            finding.suppressed_at = None;
        }
    }
}

/// Cap new Open findings per detector (and optionally globally), keeping
/// highest-confidence first; the excess is suppressed with a noise tag.
fn apply_noise_budget(
    state: &mut State,
    config: &Config,
    new_ids: &[String],
    now: DateTime<Utc>,
) -> usize {
    let budget = config.finding_noise_budget;
    if budget == 0 && config.finding_noise_global_budget == 0 {
        return 0;
    }

    let mut by_detector: BTreeMap<DetectorKind, Vec<String>> = BTreeMap::new();
    for id in new_ids {
        if let Some(finding) = state.findings.get(id) {
            if !finding.suppressed {
                by_detector
                    .entry(finding.detector)
                    .or_default()
                    .push(id.clone());
            }
        }
    }

    let mut suppressed = 0usize;
    let mut kept_total = 0usize;
    let global = config.finding_noise_global_budget;

    for ids in by_detector.values_mut() {
        // Highest confidence first; id tiebreak keeps this deterministic.
        ids.sort_by_key(|id| {
            let f = &state.findings[id];
            (f.confidence.rank(), id.clone())
        });
        for (pos, id) in ids.iter().enumerate() {
            let over_detector = budget > 0 && pos >= budget;
            let over_global = global > 0 && kept_total >= global;
            if over_detector || over_global {
                if let Some(finding) = state.findings.get_mut(id) {
                    finding.suppressed = true;
                    finding.suppression_pattern = Some(NOISE_TAG.into());
                    finding.suppressed_at = Some(now);
                    suppressed += 1;
                }
            } else {
                kept_total += 1;
            }
        }
    }
    suppressed
}

/// Explicit user resolution of a finding. Wontfix and false-positive
/// require an attestation; the caller enforces collection of one.
pub fn resolve_finding(
    state: &mut State,
    id: &str,
    status: FindingStatus,
    attestation: Option<Attestation>,
    now: DateTime<Utc>,
) -> Result<(), String> {
    if status == FindingStatus::Open {
        return Err("use reopen, not resolve, to open a finding".into());
    }
    if status.requires_attestation() && attestation.is_none() {
        return Err(format!("{status} requires an attestation (--by and --reason)"));
    }
    let finding = state
        .findings
        .get_mut(id)
        .ok_or_else(|| format!("no finding with id '{id}'"))?;
    finding.status = status;
    finding.resolved_at = Some(now);
    finding.resolution_attestation = attestation;
    state.refresh_status_counts();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finding_id;

    fn raw(detector: DetectorKind, file: &str, symbol: &str) -> RawFinding {
        RawFinding::new(detector, file, symbol, "issue")
    }

    fn ran(detectors: &[DetectorKind]) -> BTreeSet<DetectorKind> {
        detectors.iter().copied().collect()
    }

    #[test]
    fn test_insert_sets_lifecycle_fields() {
        let mut state = State::new();
        let now = Utc::now();
        let result = merge_findings(
            &mut state,
            vec![raw(DetectorKind::Smells, "a.py", "f")],
            &ran(&[DetectorKind::Smells]),
            &Config::default(),
            now,
        );
        assert_eq!(result.new.len(), 1);
        let finding = &state.findings[&result.new[0]];
        assert_eq!(finding.status, FindingStatus::Open);
        assert_eq!(finding.first_seen, now);
        assert_eq!(finding.reopen_count, 0);
    }

    #[test]
    fn test_reopen_increments_counter_and_clears_resolution() {
        let mut state = State::new();
        let config = Config::default();
        let t1 = Utc::now();
        merge_findings(
            &mut state,
            vec![raw(DetectorKind::Smells, "a.py", "f")],
            &ran(&[DetectorKind::Smells]),
            &config,
            t1,
        );
        let id = finding_id(DetectorKind::Smells, "a.py", "f");
        resolve_finding(&mut state, &id, FindingStatus::Fixed, None, t1).unwrap();

        let t2 = Utc::now();
        let result = merge_findings(
            &mut state,
            vec![raw(DetectorKind::Smells, "a.py", "f")],
            &ran(&[DetectorKind::Smells]),
            &config,
            t2,
        );
        assert_eq!(result.reopened, vec![id.clone()]);
        let finding = &state.findings[&id];
        assert_eq!(finding.status, FindingStatus::Open);
        assert_eq!(finding.reopen_count, 1);
        assert_eq!(finding.resolved_at, None);
    }

    #[test]
    fn test_reopen_of_attested_resolution_marks_manual_reopen() {
        let mut state = State::new();
        let config = Config::default();
        let now = Utc::now();
        merge_findings(
            &mut state,
            vec![raw(DetectorKind::Smells, "a.py", "f")],
            &ran(&[DetectorKind::Smells]),
            &config,
            now,
        );
        let id = finding_id(DetectorKind::Smells, "a.py", "f");
        resolve_finding(
            &mut state,
            &id,
            FindingStatus::Wontfix,
            Some(Attestation {
                by: "dev".into(),
                reason: "intentional".into(),
                at: now,
                kind: None,
            }),
            now,
        )
        .unwrap();

        merge_findings(
            &mut state,
            vec![raw(DetectorKind::Smells, "a.py", "f")],
            &ran(&[DetectorKind::Smells]),
            &config,
            Utc::now(),
        );
        let finding = &state.findings[&id];
        assert_eq!(
            finding
                .resolution_attestation
                .as_ref()
                .unwrap()
                .kind
                .as_deref(),
            Some("manual_reopen")
        );
    }

    #[test]
    fn test_auto_resolve_only_for_detectors_that_ran() {
        let mut state = State::new();
        let config = Config::default();
        merge_findings(
            &mut state,
            vec![
                raw(DetectorKind::Smells, "a.py", "f"),
                raw(DetectorKind::Security, "b.py", "L3"),
            ],
            &ran(&[DetectorKind::Smells, DetectorKind::Security]),
            &config,
            Utc::now(),
        );

        // Next scan: security tool missing, smells finding gone.
        let result = merge_findings(
            &mut state,
            vec![],
            &ran(&[DetectorKind::Smells]),
            &config,
            Utc::now(),
        );
        let smells_id = finding_id(DetectorKind::Smells, "a.py", "f");
        let security_id = finding_id(DetectorKind::Security, "b.py", "L3");
        assert_eq!(result.resolved, vec![smells_id.clone()]);
        assert_eq!(
            state.findings[&smells_id].status,
            FindingStatus::AutoResolved
        );
        assert_eq!(state.findings[&security_id].status, FindingStatus::Open);
    }

    #[test]
    fn test_merge_idempotent_on_identical_rescan() {
        let mut state = State::new();
        let config = Config::default();
        let findings = || vec![raw(DetectorKind::Smells, "a.py", "f")];
        let detectors = ran(&[DetectorKind::Smells]);

        merge_findings(&mut state, findings(), &detectors, &config, Utc::now());
        let snapshot: Vec<_> = state
            .findings
            .values()
            .map(|f| (f.id.clone(), f.status, f.reopen_count))
            .collect();

        let result = merge_findings(&mut state, findings(), &detectors, &config, Utc::now());
        assert!(result.new.is_empty());
        assert!(result.reopened.is_empty());
        assert!(result.resolved.is_empty());
        let after: Vec<_> = state
            .findings
            .values()
            .map(|f| (f.id.clone(), f.status, f.reopen_count))
            .collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn test_noise_budget_keeps_highest_confidence() {
        let mut state = State::new();
        let config = Config {
            finding_noise_budget: 2,
            ..Default::default()
        };
        let findings = vec![
            raw(DetectorKind::Smells, "a.py", "L1").with_confidence(crate::models::Confidence::Low),
            raw(DetectorKind::Smells, "b.py", "L1")
                .with_confidence(crate::models::Confidence::High),
            raw(DetectorKind::Smells, "c.py", "L1")
                .with_confidence(crate::models::Confidence::Medium),
        ];
        let result = merge_findings(
            &mut state,
            findings,
            &ran(&[DetectorKind::Smells]),
            &config,
            Utc::now(),
        );
        assert_eq!(result.noise_suppressed, 1);
        let low = &state.findings[&finding_id(DetectorKind::Smells, "a.py", "L1")];
        assert!(low.suppressed);
        assert_eq!(low.suppression_pattern.as_deref(), Some(NOISE_TAG));
        let high = &state.findings[&finding_id(DetectorKind::Smells, "b.py", "L1")];
        assert!(!high.suppressed);
    }

    #[test]
    fn test_ignore_patterns_suppress_but_keep_findings() {
        let mut state = State::new();
        let config = Config {
            ignore: vec!["legacy/**".into()],
            ..Default::default()
        };
        merge_findings(
            &mut state,
            vec![raw(DetectorKind::Smells, "legacy/old.py", "f")],
            &ran(&[DetectorKind::Smells]),
            &config,
            Utc::now(),
        );
        let finding = &state.findings[&finding_id(DetectorKind::Smells, "legacy/old.py", "f")];
        assert!(finding.suppressed);
        assert_eq!(finding.suppression_pattern.as_deref(), Some("legacy/**"));
        assert_eq!(finding.status, FindingStatus::Open);
    }

    #[test]
    fn test_resolve_requires_attestation_for_wontfix() {
        let mut state = State::new();
        merge_findings(
            &mut state,
            vec![raw(DetectorKind::Smells, "a.py", "f")],
            &ran(&[DetectorKind::Smells]),
            &Config::default(),
            Utc::now(),
        );
        let id = finding_id(DetectorKind::Smells, "a.py", "f");
        let err = resolve_finding(&mut state, &id, FindingStatus::Wontfix, None, Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn test_mechanical_change_flags_subjective_refresh() {
        let mut state = State::new();
        state.subjective_assessments.insert(
            "type_safety".into(),
            crate::models::SubjectiveAssessment {
                score: 90.0,
                source: "trusted_internal".into(),
                assessed_at: Utc::now(),
                needs_review_refresh: false,
            },
        );
        // Three new judgment-detector findings cross the threshold.
        merge_findings(
            &mut state,
            vec![
                raw(DetectorKind::Large, "a.py", ""),
                raw(DetectorKind::Large, "b.py", ""),
                raw(DetectorKind::Complexity, "c.py", "f"),
            ],
            &ran(&[DetectorKind::Large, DetectorKind::Complexity]),
            &Config::default(),
            Utc::now(),
        );
        assert!(state.subjective_assessments["type_safety"].needs_review_refresh);
    }
}
