//! Persistent analysis state.
//!
//! `State` is the top-level container serialized to
//! `.codegauge/state.json`: every finding ever observed (never deleted,
//! only resolved or superseded), the four score channels, a bounded scan
//! history, subjective assessments, and integrity metadata. Maps are
//! `BTreeMap` so serialization has stable key order.

pub mod merge;
pub mod persistence;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::integrity::IntegrityRecord;
use crate::models::{Finding, FindingStatus, ScanHistoryEntry, SubjectiveAssessment};

/// Current schema version. Older states migrate; newer states refuse.
pub const STATE_VERSION: u32 = 3;

/// How many scans of history the state retains.
pub const SCAN_HISTORY_LIMIT: usize = 20;

/// Aggregate repository stats from the last scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub files: usize,
    pub loc: usize,
    pub dirs: usize,
    /// Counter per finding status, keyed by status name.
    #[serde(default)]
    pub by_status: BTreeMap<String, usize>,
}

/// The four parallel score channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreChannels {
    pub overall: f64,
    pub objective: f64,
    pub strict: f64,
    pub verified_strict: f64,
}

impl Default for ScoreChannels {
    fn default() -> Self {
        // An unscanned repository has nothing wrong with it yet.
        Self {
            overall: 100.0,
            objective: 100.0,
            strict: 100.0,
            verified_strict: 100.0,
        }
    }
}

/// A dismissed concern fingerprint, remembered so the concern does not
/// reappear while its source findings are unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcernDismissal {
    pub dismissed_at: DateTime<Utc>,
    #[serde(default)]
    pub source_finding_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub version: u32,
    pub findings: BTreeMap<String, Finding>,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub scores: ScoreChannels,
    #[serde(default)]
    pub scan_history: Vec<ScanHistoryEntry>,
    #[serde(default)]
    pub subjective_assessments: BTreeMap<String, SubjectiveAssessment>,
    #[serde(default)]
    pub subjective_integrity: IntegrityRecord,
    #[serde(default)]
    pub concern_dismissals: BTreeMap<String, ConcernDismissal>,
    /// Monotone scan counter, used by skip resurfacing.
    #[serde(default)]
    pub scan_count: u64,
}

impl State {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            ..Default::default()
        }
    }

    pub fn open_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .values()
            .filter(|f| f.status == FindingStatus::Open)
    }

    /// Recompute the per-status counters from the finding map.
    pub fn refresh_status_counts(&mut self) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for finding in self.findings.values() {
            *counts.entry(finding.status.to_string()).or_insert(0) += 1;
        }
        self.stats.by_status = counts;
    }

    /// Append a history entry, trimming to the bounded window.
    pub fn push_history(&mut self, entry: ScanHistoryEntry) {
        self.scan_history.push(entry);
        if self.scan_history.len() > SCAN_HISTORY_LIMIT {
            let excess = self.scan_history.len() - SCAN_HISTORY_LIMIT;
            self.scan_history.drain(..excess);
        }
    }
}

/// What changed in one scan, reported to the caller after merge + scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanDiff {
    pub new: Vec<String>,
    pub resolved: Vec<String>,
    pub reopened: Vec<String>,
    pub score_delta: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_current_version() {
        assert_eq!(State::new().version, STATE_VERSION);
    }

    #[test]
    fn test_default_scores_are_perfect() {
        let scores = ScoreChannels::default();
        assert_eq!(scores.overall, 100.0);
        assert_eq!(scores.verified_strict, 100.0);
    }

    #[test]
    fn test_history_trims_to_limit() {
        let mut state = State::new();
        for i in 0..25 {
            state.push_history(ScanHistoryEntry {
                at: Utc::now(),
                overall: f64::from(i),
                objective: 0.0,
                strict: 0.0,
                verified_strict: 0.0,
                open: 0,
                resolved: 0,
                new: 0,
                reopened: 0,
            });
        }
        assert_eq!(state.scan_history.len(), SCAN_HISTORY_LIMIT);
        // Oldest entries dropped first.
        assert_eq!(state.scan_history[0].overall, 5.0);
    }

    #[test]
    fn test_state_serde_round_trip() {
        let mut state = State::new();
        state.stats.files = 10;
        let json = serde_json::to_string_pretty(&state).unwrap();
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
