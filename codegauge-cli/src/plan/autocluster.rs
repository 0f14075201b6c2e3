//! Deterministic auto-clustering, run after reconciliation.
//!
//! Two grouping passes over open findings:
//! 1. (detector, file-stem): several findings from one detector in one
//!    file family become `auto/{detector}:{stem}`.
//! 2. cross-file membership: findings living in the files of one import
//!    cycle or duplicate group become `auto/{detector}:{hash}` keyed by the
//!    owning finding's member-set hash.
//!
//! Naming and membership are pure functions of the input finding set:
//! re-running on identical state produces identical clusters. Clusters a
//! user has touched are never overwritten.

use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{Finding, FindingStatus};
use crate::plan::reconcile::MIN_CLUSTER_SIZE;
use crate::plan::{Cluster, Plan};
use crate::registry::DetectorKind;
use crate::state::State;

fn file_stem(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.rsplit_once('.').map_or(base, |(stem, _)| stem)
}

/// Compute the auto-cluster map for the current state.
fn compute_clusters(state: &State) -> BTreeMap<String, Cluster> {
    let open: Vec<&Finding> = state
        .findings
        .values()
        .filter(|f| f.status == FindingStatus::Open && !f.suppressed)
        .collect();

    let mut clusters: BTreeMap<String, Cluster> = BTreeMap::new();

    // Pass 1: (detector, file-stem) groups.
    let mut by_key: BTreeMap<(DetectorKind, &str), Vec<&Finding>> = BTreeMap::new();
    for finding in &open {
        by_key
            .entry((finding.detector, file_stem(&finding.file)))
            .or_default()
            .push(finding);
    }
    for ((detector, stem), members) in by_key {
        if members.len() < MIN_CLUSTER_SIZE {
            continue;
        }
        let mut ids: Vec<String> = members.iter().map(|f| f.id.clone()).collect();
        ids.sort();
        let key = format!("{}:{stem}", detector.name());
        clusters.insert(
            format!("auto/{key}"),
            Cluster {
                description: Some(format!(
                    "{} findings from {} in {stem}",
                    ids.len(),
                    detector.name()
                )),
                finding_ids: ids,
                auto: true,
                cluster_key: Some(key),
                action: Some(detector.meta().action),
                user_modified: false,
            },
        );
    }

    // Pass 2: findings co-located in a cycle's or duplicate group's files.
    for owner in &open {
        if owner.detail.members.is_empty() {
            continue;
        }
        // Duplicate members are "file:symbol"; cycles are bare files.
        let member_files: Vec<&str> = owner
            .detail
            .members
            .iter()
            .map(|m| m.split_once(':').map_or(m.as_str(), |(f, _)| f))
            .collect();
        let mut ids: Vec<String> = open
            .iter()
            .filter(|f| member_files.contains(&f.file.as_str()))
            .map(|f| f.id.clone())
            .collect();
        if !ids.contains(&owner.id) {
            ids.push(owner.id.clone());
        }
        ids.sort();
        ids.dedup();
        if ids.len() < MIN_CLUSTER_SIZE {
            continue;
        }
        // The owning finding's symbol slot is already the member-set hash.
        let hash = owner.id.rsplit("::").next().unwrap_or("");
        let key = format!("{}:{hash}", owner.detector.name());
        clusters.insert(
            format!("auto/{key}"),
            Cluster {
                description: Some(format!(
                    "findings across the {} group {hash}",
                    owner.detector.name()
                )),
                finding_ids: ids,
                auto: true,
                cluster_key: Some(key),
                action: Some(owner.detector.meta().action),
                user_modified: false,
            },
        );
    }

    clusters
}

/// Merge freshly computed auto-clusters into the plan. Existing clusters
/// with `user_modified` keep their membership; stale auto clusters (no
/// longer produced and not user-touched) are dropped.
pub fn autocluster(plan: &mut Plan, state: &State) -> usize {
    let fresh = compute_clusters(state);
    let fresh_names: Vec<&String> = fresh.keys().collect();

    plan.clusters.retain(|name, cluster| {
        !cluster.auto || cluster.user_modified || fresh_names.contains(&name)
    });

    let mut created = 0;
    for (name, cluster) in fresh {
        let user_owned = plan
            .clusters
            .get(&name)
            .is_some_and(|existing| existing.user_modified);
        if !user_owned && plan.clusters.insert(name, cluster).is_none() {
            created += 1;
        }
    }
    debug!("autocluster: {created} new clusters");
    created
}
