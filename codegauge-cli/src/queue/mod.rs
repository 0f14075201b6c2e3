//! Work queue: composite-key ranking over heterogeneous items.
//!
//! Three item families share one ordering. Each maps to a six-part key
//! compared lexicographically, with the item id as the final tiebreak so
//! the ordering is total and stable across runs:
//!
//! - cluster:    `(0, action_priority, 0, 0.0, -member_count, id)`
//! - mechanical: `(tier, 0, confidence_rank, -review_weight, -count, id)`
//! - subjective: `(4, 1, 0, score, 0, id)`
//!
//! Clusters always lead (first element 0); subjective items are forced to
//! tier 4 and sort after tier-4 mechanical items via the 0-vs-1 second
//! element.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Finding, FindingStatus};
use crate::plan::Plan;
use crate::registry::ActionKind;
use crate::scoring::HOLISTIC_MULTIPLIER;
use crate::state::State;

/// Id prefix for subjective queue items.
pub const SUBJECTIVE_PREFIX: &str = "subjective::";

/// One ranked queue entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueItem {
    Cluster {
        id: String,
        name: String,
        action: ActionKind,
        member_count: usize,
        description: Option<String>,
    },
    Mechanical {
        id: String,
        file: String,
        tier: u8,
        summary: String,
        reopen_count: u32,
        skipped: bool,
    },
    Subjective {
        id: String,
        dimension: String,
        score: f64,
    },
}

impl QueueItem {
    pub fn id(&self) -> &str {
        match self {
            QueueItem::Cluster { id, .. }
            | QueueItem::Mechanical { id, .. }
            | QueueItem::Subjective { id, .. } => id,
        }
    }

    pub fn effective_tier(&self) -> u8 {
        match self {
            QueueItem::Cluster { .. } => 0,
            QueueItem::Mechanical { tier, .. } => *tier,
            QueueItem::Subjective { .. } => 4,
        }
    }
}

/// Composite sort key. Floats use `total_cmp`, so the ordering is total.
#[derive(Debug, Clone, PartialEq)]
struct SortKey {
    a: u8,
    b: u8,
    c: u8,
    d: f64,
    e: i64,
    id: String,
}

impl Eq for SortKey {}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.a
            .cmp(&other.a)
            .then(self.b.cmp(&other.b))
            .then(self.c.cmp(&other.c))
            .then(self.d.total_cmp(&other.d))
            .then(self.e.cmp(&other.e))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn sort_key(item: &QueueItem, findings: &BTreeMap<String, Finding>) -> SortKey {
    match item {
        QueueItem::Cluster {
            id,
            action,
            member_count,
            ..
        } => SortKey {
            a: 0,
            b: action.priority(),
            c: 0,
            d: 0.0,
            e: -(*member_count as i64),
            id: id.clone(),
        },
        QueueItem::Mechanical { id, tier, .. } => {
            let (confidence_rank, review_weight, count) = findings
                .get(id)
                .map(|f| {
                    let meta = f.detector.meta();
                    let mut weight = f.detail.review_weight.unwrap_or(1.0);
                    if meta.holistic {
                        weight *= HOLISTIC_MULTIPLIER;
                    }
                    let count = f.detail.members.len().max(1) as i64;
                    (f.confidence.rank(), weight, count)
                })
                .unwrap_or((0, 1.0, 1));
            SortKey {
                a: *tier,
                b: 0,
                c: confidence_rank,
                d: -review_weight,
                e: -count,
                id: id.clone(),
            }
        }
        QueueItem::Subjective { id, score, .. } => SortKey {
            a: 4,
            b: 1,
            c: 0,
            d: *score,
            e: 0,
            id: id.clone(),
        },
    }
}

/// Status filter over findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Open,
    Resolved,
    All,
}

impl StatusFilter {
    fn matches(self, status: FindingStatus) -> bool {
        match self {
            StatusFilter::Open => status == FindingStatus::Open,
            StatusFilter::Resolved => status.is_resolved(),
            StatusFilter::All => true,
        }
    }
}

/// Queue construction options.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub tier: Option<u8>,
    /// Truncate to this many items after filtering. None = all.
    pub count: Option<usize>,
    /// Path-prefix scope filter.
    pub scope: Option<String>,
    pub status: StatusFilter,
    pub include_subjective: bool,
    /// Subjective dimensions scoring at or above this are not work.
    pub subjective_threshold: f64,
    /// Only findings reopened at least twice.
    pub chronic: bool,
    pub no_tier_fallback: bool,
    /// Emit one item per cluster and suppress its members.
    pub collapse_clusters: bool,
    /// Append plan-skipped items at the end instead of hiding them.
    pub include_skipped: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            tier: None,
            count: None,
            scope: None,
            status: StatusFilter::Open,
            include_subjective: true,
            subjective_threshold: 100.0,
            chronic: false,
            no_tier_fallback: false,
            collapse_clusters: false,
            include_skipped: false,
        }
    }
}

/// Built queue plus tier metadata.
#[derive(Debug, Clone, Serialize)]
pub struct QueueResult {
    pub items: Vec<QueueItem>,
    pub total: usize,
    pub tier_counts: BTreeMap<u8, usize>,
    pub requested_tier: Option<u8>,
    pub selected_tier: Option<u8>,
    pub fallback_reason: Option<String>,
    pub available_tiers: Vec<u8>,
}

fn scope_matches(path: &str, scope: Option<&str>) -> bool {
    match scope {
        None => true,
        Some(prefix) => path.starts_with(prefix),
    }
}

/// Requested tier empty: nearest non-empty tier, lower first.
fn choose_fallback_tier(requested: u8, counts: &BTreeMap<u8, usize>) -> Option<u8> {
    for distance in 1..=3u8 {
        for candidate in [requested.checked_sub(distance), requested.checked_add(distance)]
            .into_iter()
            .flatten()
        {
            if (1..=4).contains(&candidate)
                && counts.get(&candidate).copied().unwrap_or(0) > 0
            {
                return Some(candidate);
            }
        }
    }
    None
}

/// Build the ranked queue from state and plan.
pub fn build_queue(state: &State, plan: &Plan, options: &QueueOptions) -> QueueResult {
    let mut items: Vec<QueueItem> = Vec::new();
    let mut collapsed_members: std::collections::BTreeSet<&str> = Default::default();

    if options.collapse_clusters {
        for (name, cluster) in &plan.clusters {
            let live: Vec<&str> = cluster
                .finding_ids
                .iter()
                .filter(|id| state.findings.contains_key(*id))
                .map(String::as_str)
                .collect();
            if live.is_empty() {
                continue;
            }
            collapsed_members.extend(live.iter().copied());
            items.push(QueueItem::Cluster {
                id: format!("cluster::{name}"),
                name: name.clone(),
                action: cluster.action.unwrap_or(ActionKind::Refactor),
                member_count: live.len(),
                description: cluster.description.clone(),
            });
        }
    }

    for finding in state.findings.values() {
        if !options.status.matches(finding.status) {
            continue;
        }
        if finding.suppressed {
            continue;
        }
        if options.chronic && finding.reopen_count < 2 {
            continue;
        }
        if !scope_matches(&finding.file, options.scope.as_deref()) {
            continue;
        }
        if collapsed_members.contains(finding.id.as_str()) {
            continue;
        }
        let skipped = plan.skipped.contains_key(&finding.id);
        if skipped && !options.include_skipped {
            continue;
        }
        // A user priority override replaces the finding's tier in ranking.
        let tier = plan
            .overrides
            .get(&finding.id)
            .and_then(|o| o.priority)
            .map(|p| p.clamp(1, 4))
            .unwrap_or_else(|| finding.tier.ordinal());
        items.push(QueueItem::Mechanical {
            id: finding.id.clone(),
            file: finding.file.clone(),
            tier,
            summary: finding.summary.clone(),
            reopen_count: finding.reopen_count,
            skipped,
        });
    }

    if options.include_subjective
        && options.status != StatusFilter::Resolved
        && !options.chronic
    {
        for (dimension, assessment) in &state.subjective_assessments {
            if assessment.score >= options.subjective_threshold {
                continue;
            }
            items.push(QueueItem::Subjective {
                id: format!("{SUBJECTIVE_PREFIX}{dimension}"),
                dimension: dimension.clone(),
                score: assessment.score,
            });
        }
    }

    items.sort_by(|x, y| sort_key(x, &state.findings).cmp(&sort_key(y, &state.findings)));

    // Plan ordering: queue_order first, skipped items last.
    let items = apply_plan_order(items, plan, options);

    let mut tier_counts: BTreeMap<u8, usize> = BTreeMap::new();
    for item in &items {
        *tier_counts.entry(item.effective_tier()).or_insert(0) += 1;
    }

    let requested_tier = options.tier;
    let mut selected_tier = requested_tier;
    let mut fallback_reason = None;
    let mut filtered: Vec<QueueItem> = match requested_tier {
        None => items,
        Some(tier) => {
            let matching: Vec<QueueItem> = items
                .iter()
                .filter(|i| i.effective_tier() == tier)
                .cloned()
                .collect();
            if matching.is_empty() && !options.no_tier_fallback {
                match choose_fallback_tier(tier, &tier_counts) {
                    Some(chosen) => {
                        selected_tier = Some(chosen);
                        fallback_reason = Some(format!(
                            "requested T{tier} has 0 open; showing T{chosen} (nearest non-empty)"
                        ));
                        items
                            .iter()
                            .filter(|i| i.effective_tier() == chosen)
                            .cloned()
                            .collect()
                    }
                    None => {
                        fallback_reason = Some(format!("requested T{tier} has 0 open"));
                        matching
                    }
                }
            } else {
                matching
            }
        }
    };

    let total = filtered.len();
    if let Some(count) = options.count {
        filtered.truncate(count);
    }

    let available_tiers = tier_counts
        .iter()
        .filter(|(_, &n)| n > 0)
        .map(|(&t, _)| t)
        .collect();

    QueueResult {
        items: filtered,
        total,
        tier_counts,
        requested_tier,
        selected_tier,
        fallback_reason,
        available_tiers,
    }
}

/// Reorder per the living plan: explicitly ordered ids first, the rest in
/// mechanical order, plan-skipped items last (when included at all).
fn apply_plan_order(items: Vec<QueueItem>, plan: &Plan, options: &QueueOptions) -> Vec<QueueItem> {
    if plan.queue_order.is_empty() && plan.skipped.is_empty() {
        return items;
    }
    let mut by_id: BTreeMap<&str, usize> = BTreeMap::new();
    for (idx, item) in items.iter().enumerate() {
        by_id.insert(item.id(), idx);
    }

    let mut taken = vec![false; items.len()];
    let mut ordered: Vec<QueueItem> = Vec::with_capacity(items.len());
    for id in &plan.queue_order {
        if let Some(&idx) = by_id.get(id.as_str()) {
            if !taken[idx] && !plan.skipped.contains_key(id) {
                taken[idx] = true;
                ordered.push(items[idx].clone());
            }
        }
    }
    let mut skipped_tail: Vec<QueueItem> = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        if taken[idx] {
            continue;
        }
        if plan.skipped.contains_key(item.id()) {
            if options.include_skipped {
                skipped_tail.push(item.clone());
            }
            continue;
        }
        ordered.push(item.clone());
    }
    ordered.extend(skipped_tail);
    ordered
}
