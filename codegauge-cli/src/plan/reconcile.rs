//! Plan reconciliation, run after every state merge.
//!
//! The finding population mutates under the plan; reconciliation keeps the
//! plan's id references honest without ever guessing user intent: vanished
//! findings are snapshotted into `superseded` with fuzzy remap candidates
//! the user may accept, skips resurface as flags rather than unskips, and
//! cluster membership shrinks rather than dissolving.
//!
//! Reconciliation is idempotent: running it twice against the same state
//! yields the same plan.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use codegauge_fast::similarity::word_set_jaccard;

use crate::plan::{Plan, SupersededEntry};
use crate::scoring::policy::REMAP_SIMILARITY;
use crate::state::State;

/// Superseded entries older than this are dropped.
pub const SUPERSEDED_TTL_DAYS: i64 = 90;

/// Clusters below this live membership are deleted (auto clusters only).
pub const MIN_CLUSTER_SIZE: usize = 2;

/// What one reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileResult {
    pub superseded: Vec<String>,
    pub pruned: Vec<String>,
    pub resurfaced: Vec<String>,
    pub clusters_deleted: Vec<String>,
}

/// Reconcile the plan against the current state.
pub fn reconcile(plan: &mut Plan, state: &State, now: DateTime<Utc>) -> ReconcileResult {
    let mut result = ReconcileResult::default();

    supersede_vanished(plan, state, now, &mut result);
    compute_remap_candidates(plan, state);
    prune_expired(plan, now, &mut result);
    resurface_stale_skips(plan, state, &mut result);
    cleanup_clusters(plan, state, &mut result);

    if !result.superseded.is_empty() || !result.pruned.is_empty() {
        info!(
            "reconcile: {} superseded, {} pruned, {} resurfaced",
            result.superseded.len(),
            result.pruned.len(),
            result.resurfaced.len()
        );
    }
    result
}

/// Ids referenced anywhere in the plan that are gone from state move to
/// `superseded` with a snapshot of what they were.
fn supersede_vanished(
    plan: &mut Plan,
    state: &State,
    now: DateTime<Utc>,
    result: &mut ReconcileResult,
) {
    let referenced: Vec<String> = plan
        .queue_order
        .iter()
        .chain(plan.skipped.keys())
        .chain(plan.clusters.values().flat_map(|c| c.finding_ids.iter()))
        .cloned()
        .collect();

    for id in referenced {
        if state.findings.contains_key(&id)
            || plan.superseded.contains_key(&id)
            || id.starts_with(crate::queue::SUBJECTIVE_PREFIX)
        {
            continue;
        }
        // Vanished: snapshot what we can still parse from the id.
        let mut parts = id.splitn(3, "::");
        let detector = parts.next().unwrap_or("").to_string();
        let file = parts.next().unwrap_or("").to_string();
        plan.superseded.insert(
            id.clone(),
            SupersededEntry {
                original_detector: detector,
                original_file: file,
                original_summary: String::new(),
                status: Default::default(),
                superseded_at: now,
                remapped_to: None,
                candidates: Vec::new(),
            },
        );
        result.superseded.push(id);
    }

    // Drop superseded ids from the live queue order; skips for superseded
    // findings are retired with their finding.
    let gone: std::collections::BTreeSet<String> = plan.superseded.keys().cloned().collect();
    plan.queue_order.retain(|id| !gone.contains(id));
    plan.skipped.retain(|id, _| !gone.contains(id));
}

/// Fuzzy candidates among current findings: same detector, same file,
/// word-set Jaccard of summaries at or above the remap threshold. Never
/// auto-applied: `remapped_to` is the user's call.
fn compute_remap_candidates(plan: &mut Plan, state: &State) {
    for (old_id, entry) in plan.superseded.iter_mut() {
        if entry.remapped_to.is_some() {
            continue;
        }
        let mut candidates: Vec<String> = state
            .findings
            .values()
            .filter(|f| {
                f.detector.name() == entry.original_detector && f.file == entry.original_file
            })
            .filter(|f| {
                entry.original_summary.is_empty()
                    || word_set_jaccard(&f.summary, &entry.original_summary) >= REMAP_SIMILARITY
            })
            .map(|f| f.id.clone())
            .filter(|id| id != old_id)
            .collect();
        candidates.sort();
        entry.candidates = candidates;
    }
}

/// Drop superseded entries past the TTL.
fn prune_expired(plan: &mut Plan, now: DateTime<Utc>, result: &mut ReconcileResult) {
    let ttl = chrono::Duration::days(SUPERSEDED_TTL_DAYS);
    let expired: Vec<String> = plan
        .superseded
        .iter()
        .filter(|(_, e)| now - e.superseded_at > ttl)
        .map(|(id, _)| id.clone())
        .collect();
    for id in expired {
        plan.superseded.remove(&id);
        result.pruned.push(id);
    }
}

/// Flag skips whose review window has elapsed. No automatic unskip.
fn resurface_stale_skips(plan: &mut Plan, state: &State, result: &mut ReconcileResult) {
    for (id, entry) in plan.skipped.iter_mut() {
        let Some(review_after) = entry.review_after else {
            continue;
        };
        if entry.resurface_due {
            continue;
        }
        if state.scan_count.saturating_sub(entry.skipped_at_scan) >= review_after {
            entry.resurface_due = true;
            result.resurfaced.push(id.clone());
            debug!("skip on {id} is due for review");
        }
    }
}

/// Shrink cluster membership to live or remapped ids; delete auto clusters
/// that fall below the minimum size. User-modified clusters are never
/// deleted, even empty.
fn cleanup_clusters(plan: &mut Plan, state: &State, result: &mut ReconcileResult) {
    let superseded = &plan.superseded;
    for cluster in plan.clusters.values_mut() {
        cluster.finding_ids = cluster
            .finding_ids
            .iter()
            .filter_map(|id| {
                if state.findings.contains_key(id) {
                    return Some(id.clone());
                }
                // Follow a user-accepted remap; drop otherwise.
                superseded
                    .get(id)
                    .and_then(|e| e.remapped_to.clone())
                    .filter(|new_id| state.findings.contains_key(new_id))
            })
            .collect();
        cluster.finding_ids.dedup();
    }

    let doomed: Vec<String> = plan
        .clusters
        .iter()
        .filter(|(_, c)| c.auto && !c.user_modified && c.finding_ids.len() < MIN_CLUSTER_SIZE)
        .map(|(name, _)| name.clone())
        .collect();
    for name in doomed {
        plan.clusters.remove(&name);
        result.clusters_deleted.push(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{finding_id, Confidence, Finding, FindingDetail, FindingStatus, Tier};
    use crate::plan::{Cluster, SkipKind};
    use crate::registry::DetectorKind;
    use crate::zones::Zone;

    fn live_finding(detector: DetectorKind, file: &str, symbol: &str, summary: &str) -> Finding {
        let now = Utc::now();
        Finding {
            id: finding_id(detector, file, symbol),
            detector,
            file: file.into(),
            tier: Tier::QuickFix,
            confidence: Confidence::High,
            status: FindingStatus::Open,
            summary: summary.into(),
            first_seen: now,
            last_seen: now,
            resolved_at: None,
            reopen_count: 0,
            suppressed: false,
            suppression_pattern: None,
            suppressed_at: None,
            resolution_attestation: None,
            zone: Zone::Production,
            lang: "python".into(),
            detail: FindingDetail::default(),
        }
    }

    fn state_with(findings: Vec<Finding>) -> State {
        let mut state = State::new();
        for f in findings {
            state.findings.insert(f.id.clone(), f);
        }
        state
    }

    #[test]
    fn test_vanished_id_moves_to_superseded() {
        let state = state_with(vec![]);
        let mut plan = Plan::new();
        plan.queue_order = vec!["smells::gone.py::f".into()];
        let result = reconcile(&mut plan, &state, Utc::now());
        assert_eq!(result.superseded, vec!["smells::gone.py::f".to_string()]);
        assert!(plan.queue_order.is_empty());
        let entry = &plan.superseded["smells::gone.py::f"];
        assert_eq!(entry.original_detector, "smells");
        assert_eq!(entry.original_file, "gone.py");
    }

    #[test]
    fn test_remap_candidates_same_detector_and_file() {
        let replacement = live_finding(DetectorKind::Smells, "a.py", "L9", "broad exception");
        let replacement_id = replacement.id.clone();
        let other = live_finding(DetectorKind::Smells, "b.py", "L9", "broad exception");
        let state = state_with(vec![replacement, other]);

        let mut plan = Plan::new();
        plan.superseded.insert(
            "smells::a.py::L3".into(),
            SupersededEntry {
                original_detector: "smells".into(),
                original_file: "a.py".into(),
                original_summary: "broad exception".into(),
                status: FindingStatus::Open,
                superseded_at: Utc::now(),
                remapped_to: None,
                candidates: vec![],
            },
        );
        reconcile(&mut plan, &state, Utc::now());
        assert_eq!(
            plan.superseded["smells::a.py::L3"].candidates,
            vec![replacement_id]
        );
    }

    #[test]
    fn test_ttl_prunes_old_entries() {
        let state = state_with(vec![]);
        let mut plan = Plan::new();
        plan.superseded.insert(
            "smells::old.py::f".into(),
            SupersededEntry {
                original_detector: "smells".into(),
                original_file: "old.py".into(),
                original_summary: String::new(),
                status: FindingStatus::Open,
                superseded_at: Utc::now() - chrono::Duration::days(91),
                remapped_to: None,
                candidates: vec![],
            },
        );
        let result = reconcile(&mut plan, &state, Utc::now());
        assert_eq!(result.pruned.len(), 1);
        assert!(plan.superseded.is_empty());
    }

    #[test]
    fn test_resurface_flags_without_unskip() {
        let mut state = state_with(vec![live_finding(
            DetectorKind::Smells,
            "a.py",
            "L1",
            "issue",
        )]);
        state.scan_count = 10;
        let mut plan = Plan::new();
        plan.skip(
            finding_id(DetectorKind::Smells, "a.py", "L1"),
            SkipKind::Temporary,
            None,
            Some(3),
            5,
        );
        let result = reconcile(&mut plan, &state, Utc::now());
        assert_eq!(result.resurfaced.len(), 1);
        let entry = &plan.skipped[&finding_id(DetectorKind::Smells, "a.py", "L1")];
        assert!(entry.resurface_due);
    }

    #[test]
    fn test_cluster_retains_reduced_membership() {
        let keep = live_finding(DetectorKind::Dupes, "x.py", "k1", "dup");
        let keep2 = live_finding(DetectorKind::Dupes, "y.py", "k2", "dup");
        let state = state_with(vec![keep.clone(), keep2.clone()]);
        let mut plan = Plan::new();
        plan.clusters.insert(
            "auto/dupes:x".into(),
            Cluster {
                finding_ids: vec![keep.id.clone(), keep2.id.clone(), "dupes::gone.py::z".into()],
                auto: true,
                ..Default::default()
            },
        );
        reconcile(&mut plan, &state, Utc::now());
        let cluster = &plan.clusters["auto/dupes:x"];
        assert_eq!(cluster.finding_ids, vec![keep.id, keep2.id]);
    }

    #[test]
    fn test_auto_cluster_below_min_size_deleted_but_user_kept() {
        let state = state_with(vec![]);
        let mut plan = Plan::new();
        plan.clusters.insert(
            "auto/dupes:x".into(),
            Cluster {
                finding_ids: vec!["dupes::gone.py::z".into()],
                auto: true,
                ..Default::default()
            },
        );
        plan.clusters.insert(
            "my-cleanup".into(),
            Cluster {
                finding_ids: vec!["dupes::gone.py::z".into()],
                auto: false,
                user_modified: true,
                ..Default::default()
            },
        );
        let result = reconcile(&mut plan, &state, Utc::now());
        assert_eq!(result.clusters_deleted, vec!["auto/dupes:x".to_string()]);
        assert!(plan.clusters.contains_key("my-cleanup"));
        assert!(plan.clusters["my-cleanup"].finding_ids.is_empty());
    }

    #[test]
    fn test_reconcile_idempotent() {
        let state = state_with(vec![live_finding(
            DetectorKind::Smells,
            "a.py",
            "L1",
            "issue",
        )]);
        let mut plan = Plan::new();
        plan.queue_order = vec![
            finding_id(DetectorKind::Smells, "a.py", "L1"),
            "smells::gone.py::f".into(),
        ];
        let now = Utc::now();
        reconcile(&mut plan, &state, now);
        let snapshot = plan.clone();
        reconcile(&mut plan, &state, now);
        assert_eq!(plan, snapshot);
    }
}
