//! Core data models for codegauge.
//!
//! A `Finding` is the atomic unit of analysis: one detected quality issue,
//! keyed by a stable composite id of the form
//! `"{detector}::{relative_path}::{symbol}"`. Detectors must produce the
//! same id for the same logical defect across scans, and different ids for
//! different defects: everything downstream (state merge, reopen tracking,
//! plan decisions) hangs off that contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::registry::DetectorKind;
use crate::zones::Zone;

/// Severity tier, ordinal 1..4. The ordinal doubles as the scoring weight.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    AutoFix,
    QuickFix,
    #[default]
    Judgment,
    MajorRefactor,
}

impl Tier {
    /// Ordinal value 1..4, used directly as the tier weight.
    pub fn ordinal(self) -> u8 {
        match self {
            Tier::AutoFix => 1,
            Tier::QuickFix => 2,
            Tier::Judgment => 3,
            Tier::MajorRefactor => 4,
        }
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            1 => Some(Tier::AutoFix),
            2 => Some(Tier::QuickFix),
            3 => Some(Tier::Judgment),
            4 => Some(Tier::MajorRefactor),
            _ => None,
        }
    }

    /// One tier lower (used by zone downgrade policy). T1 stays T1.
    pub fn downgraded(self) -> Self {
        match self {
            Tier::AutoFix | Tier::QuickFix => Tier::AutoFix,
            Tier::Judgment => Tier::QuickFix,
            Tier::MajorRefactor => Tier::Judgment,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.ordinal())
    }
}

/// Detector certainty, a weight multiplier in scoring.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn weight(self) -> f64 {
        match self {
            Confidence::High => 1.0,
            Confidence::Medium => 0.7,
            Confidence::Low => 0.3,
        }
    }

    /// Queue rank: lower sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Confidence::High => 0,
            Confidence::Medium => 1,
            Confidence::Low => 2,
        }
    }
}

/// Lifecycle status. A finding is in exactly one status at any time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    #[default]
    Open,
    Fixed,
    AutoResolved,
    Wontfix,
    FalsePositive,
}

impl FindingStatus {
    /// Statuses that require a resolution attestation.
    pub fn requires_attestation(self) -> bool {
        matches!(self, FindingStatus::Wontfix | FindingStatus::FalsePositive)
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, FindingStatus::Open)
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FindingStatus::Open => "open",
            FindingStatus::Fixed => "fixed",
            FindingStatus::AutoResolved => "auto_resolved",
            FindingStatus::Wontfix => "wontfix",
            FindingStatus::FalsePositive => "false_positive",
        };
        write!(f, "{s}")
    }
}

/// Who resolved a finding and why. Required for wontfix / false-positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub by: String,
    pub reason: String,
    pub at: DateTime<Utc>,
    /// Set to `"manual_reopen"` when a rescan reopens an attested resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Detector-specific payload on a finding.
///
/// Well-known keys are promoted to typed fields; scoring and queue code read
/// only these. Anything else a detector wants to carry rides in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<u32>,
    /// Per-file cap override for LOC-weighted detectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Priority weight for the work queue; holistic findings carry the
    /// display multiplier here, never in score formulas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smell_id: Option<String>,
    /// Member files of a cross-file finding (cycle, duplicate group).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// Freeform detector-private data. Last-wins on merge.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FindingDetail {
    /// Merge newer detail into this one, field by field, last-wins per key.
    pub fn merge_from(&mut self, newer: FindingDetail) {
        macro_rules! take_if_some {
            ($dst:ident, $src:ident, $($field:ident),* $(,)?) => {
                $(if $src.$field.is_some() { $dst.$field = $src.$field; })*
            };
        }
        take_if_some!(
            self, newer, loc, loc_weight, complexity, symbol, line, cluster_id, review_weight,
            smell_id, similarity,
        );
        if !newer.members.is_empty() {
            self.members = newer.members;
        }
        for (k, v) in newer.extra {
            self.extra.insert(k, v);
        }
    }
}

/// One detected quality issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub detector: DetectorKind,
    /// Repository-relative path, forward-slash normalized.
    pub file: String,
    pub tier: Tier,
    pub confidence: Confidence,
    #[serde(default)]
    pub status: FindingStatus,
    pub summary: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reopen_count: u32,
    #[serde(default)]
    pub suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_attestation: Option<Attestation>,
    #[serde(default)]
    pub zone: Zone,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub detail: FindingDetail,
}

/// A freshly-detected issue, before the state merge assigns lifecycle fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFinding {
    pub id: String,
    pub detector: DetectorKind,
    pub file: String,
    pub tier: Tier,
    pub confidence: Confidence,
    pub summary: String,
    pub zone: Zone,
    pub lang: String,
    pub detail: FindingDetail,
}

impl RawFinding {
    pub fn new(
        detector: DetectorKind,
        file: impl Into<String>,
        symbol: &str,
        summary: impl Into<String>,
    ) -> Self {
        let file = normalize_path(&file.into());
        Self {
            id: finding_id(detector, &file, symbol),
            detector,
            file,
            tier: detector.default_tier(),
            confidence: Confidence::High,
            summary: summary.into(),
            zone: Zone::Production,
            lang: String::new(),
            detail: FindingDetail::default(),
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_detail(mut self, detail: FindingDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Weight of this finding in the scoring pipeline.
    pub fn weight(&self) -> f64 {
        self.confidence.weight() * f64::from(self.tier.ordinal())
    }
}

impl Finding {
    pub fn weight(&self) -> f64 {
        self.confidence.weight() * f64::from(self.tier.ordinal())
    }
}

/// Normalize a repository-relative path to forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Canonical finding id: `"{detector}::{relative_path}::{symbol}"`.
///
/// The symbol slot is chosen by the detector per defect class: a qualified
/// symbol name for function-scoped defects, empty for file-scoped, `L{n}`
/// for line-scoped, or a member-set hash for cross-file findings.
pub fn finding_id(detector: DetectorKind, file: &str, symbol: &str) -> String {
    format!("{}::{}::{}", detector.name(), normalize_path(file), symbol)
}

/// Line-scoped symbol slot.
pub fn line_symbol(line: u32) -> String {
    format!("L{line}")
}

/// Symbol slot for cross-file findings: a short hash of the sorted member
/// set. The whole membership is part of identity: a refactor that keeps
/// two of three members produces a new finding, not a misleading reopen.
pub fn member_set_symbol(members: &[String]) -> String {
    let mut sorted: Vec<&str> = members.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    for m in &sorted {
        hasher.update(m.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..12].to_string()
}

/// One entry in the bounded scan history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub at: DateTime<Utc>,
    pub overall: f64,
    pub objective: f64,
    pub strict: f64,
    pub verified_strict: f64,
    pub open: usize,
    pub resolved: usize,
    pub new: usize,
    pub reopened: usize,
}

/// A subjective dimension assessment imported from review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectiveAssessment {
    /// Score in [0, 100].
    pub score: f64,
    pub source: String,
    pub assessed_at: DateTime<Utc>,
    #[serde(default)]
    pub needs_review_refresh: bool,
}
