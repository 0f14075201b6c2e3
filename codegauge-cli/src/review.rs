//! LLM review contract.
//!
//! The core never originates reviews; it prepares packets for an external
//! review pipeline and imports the results. Packets carry no score
//! information: a reviewer who can see the current scores anchors to
//! them, which is exactly what the integrity guard exists to catch.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::concerns::{generate_concerns, Concern};
use crate::models::{
    finding_id, Finding, FindingStatus, SubjectiveAssessment,
};
use crate::registry::DetectorKind;
use crate::scoring::policy::subjective_weight;
use crate::state::State;

/// How much to trust an imported review result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Our own pipeline: assessments applied as-is.
    TrustedInternal,
    /// External reviewer: applied only with an attestation.
    AttestedExternal,
    /// Human override: applied, recorded as such.
    ManualOverride,
    /// Assessments discarded; only findings are imported.
    FindingsOnly,
}

impl TrustLevel {
    fn source_label(self) -> &'static str {
        match self {
            TrustLevel::TrustedInternal => "trusted_internal",
            TrustLevel::AttestedExternal => "attested_external",
            TrustLevel::ManualOverride => "manual_override",
            TrustLevel::FindingsOnly => "findings_only",
        }
    }
}

/// One finding the review wants on file (repo-wide, holistic detector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFinding {
    /// Symbol slot for the holistic finding id.
    pub key: String,
    pub summary: String,
}

/// The result record the external pipeline hands back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    /// dimension -> score in [0, 100].
    #[serde(default)]
    pub assessments: BTreeMap<String, f64>,
    #[serde(default)]
    pub findings: Vec<ReviewFinding>,
    /// Required for `AttestedExternal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attested_by: Option<String>,
}

/// A finding stripped to what a reviewer needs: no scores, no weights.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketFinding {
    pub id: String,
    pub detector: String,
    pub file: String,
    pub summary: String,
    pub reopen_count: u32,
}

/// What the review pipeline receives. Deliberately score-free.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPacket {
    pub open_findings: Vec<PacketFinding>,
    pub concerns: Vec<Concern>,
    /// Dimensions flagged stale, so the reviewer knows where to look.
    pub dimensions_needing_refresh: Vec<String>,
}

/// Build the packet for the external reviewer.
pub fn prepare_review_packet(state: &State) -> ReviewPacket {
    let open_findings = state
        .open_findings()
        .filter(|f| !f.suppressed)
        .map(|f| PacketFinding {
            id: f.id.clone(),
            detector: f.detector.name().to_string(),
            file: f.file.clone(),
            summary: f.summary.clone(),
            reopen_count: f.reopen_count,
        })
        .collect();
    let dimensions_needing_refresh = state
        .subjective_assessments
        .iter()
        .filter(|(_, a)| a.needs_review_refresh)
        .map(|(dim, _)| dim.clone())
        .collect();
    ReviewPacket {
        open_findings,
        concerns: generate_concerns(state),
        dimensions_needing_refresh,
    }
}

/// Import a review result under a trust level. Returns how many
/// assessments were applied.
pub fn import_review_result(
    state: &mut State,
    result: &ReviewResult,
    trust: TrustLevel,
) -> Result<usize> {
    if trust == TrustLevel::AttestedExternal && result.attested_by.is_none() {
        bail!("attested_external import requires attested_by; re-run the review with attribution or import as findings_only");
    }

    let now = Utc::now();
    let mut applied = 0;

    if trust != TrustLevel::FindingsOnly {
        for (dimension, &score) in &result.assessments {
            if subjective_weight(dimension).is_none() {
                debug!("ignoring assessment for unknown dimension '{dimension}'");
                continue;
            }
            state.subjective_assessments.insert(
                dimension.clone(),
                SubjectiveAssessment {
                    score: score.clamp(0.0, 100.0),
                    source: trust.source_label().to_string(),
                    assessed_at: now,
                    needs_review_refresh: false,
                },
            );
            applied += 1;
        }
    }

    // Review findings land as holistic repo-wide findings; the next scan's
    // merge treats them like any other detector output.
    for review_finding in &result.findings {
        let id = finding_id(DetectorKind::Holistic, ".", &review_finding.key);
        match state.findings.get_mut(&id) {
            Some(existing) => {
                existing.last_seen = now;
                existing.summary = review_finding.summary.clone();
                if existing.status != FindingStatus::Open {
                    existing.status = FindingStatus::Open;
                    existing.reopen_count += 1;
                    existing.resolved_at = None;
                }
            }
            None => {
                state.findings.insert(
                    id.clone(),
                    Finding {
                        id,
                        detector: DetectorKind::Holistic,
                        file: ".".into(),
                        tier: DetectorKind::Holistic.default_tier(),
                        confidence: Default::default(),
                        status: FindingStatus::Open,
                        summary: review_finding.summary.clone(),
                        first_seen: now,
                        last_seen: now,
                        resolved_at: None,
                        reopen_count: 0,
                        suppressed: false,
                        suppression_pattern: None,
                        suppressed_at: None,
                        resolution_attestation: None,
                        zone: Default::default(),
                        lang: String::new(),
                        detail: Default::default(),
                    },
                );
            }
        }
    }

    state.refresh_status_counts();
    info!(
        "review import ({}): {applied} assessments, {} findings",
        trust.source_label(),
        result.findings.len()
    );
    Ok(applied)
}
