//! Durable user workflow state (the "living plan").
//!
//! The plan references findings by id and never owns them; reconciliation
//! (after every scan) keeps those references honest as the finding
//! population mutates underneath.

pub mod autocluster;
pub mod reconcile;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::FindingStatus;
use crate::registry::ActionKind;
use crate::state::persistence::{tool_dir, write_json_atomic};

pub const PLAN_VERSION: u32 = 2;
pub const PLAN_FILE: &str = "plan.json";

/// Why an item is out of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    Temporary,
    Permanent,
    FalsePositive,
}

/// A user decision to skip a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEntry {
    pub kind: SkipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Scans after which the skip resurfaces for review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_after: Option<u64>,
    pub skipped_at_scan: u64,
    /// Set by reconciliation when `review_after` is reached. The skip is
    /// never auto-lifted.
    #[serde(default)]
    pub resurface_due: bool,
}

/// A named group of findings treated as one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub finding_ids: Vec<String>,
    /// Created by auto-clustering (name prefixed `auto/`).
    #[serde(default)]
    pub auto: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
    /// A user touched this cluster; cleanup never deletes it.
    #[serde(default)]
    pub user_modified: bool,
}

/// Per-item user annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Snapshot of a finding that vanished from state while the plan still
/// referenced it. Pruned after `reconcile::SUPERSEDED_TTL_DAYS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupersededEntry {
    pub original_detector: String,
    pub original_file: String,
    pub original_summary: String,
    /// Status at the time of supersession.
    pub status: FindingStatus,
    pub superseded_at: DateTime<Utc>,
    /// Only ever set by explicit user action, never by reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remapped_to: Option<String>,
    /// Fuzzy remap candidates computed by reconciliation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub version: u32,
    #[serde(default)]
    pub queue_order: Vec<String>,
    #[serde(default)]
    pub skipped: BTreeMap<String, SkipEntry>,
    #[serde(default)]
    pub clusters: BTreeMap<String, Cluster>,
    #[serde(default)]
    pub overrides: BTreeMap<String, ItemOverride>,
    #[serde(default)]
    pub superseded: BTreeMap<String, SupersededEntry>,
}

impl Plan {
    pub fn new() -> Self {
        Self {
            version: PLAN_VERSION,
            ..Default::default()
        }
    }

    pub fn path_for(repo_root: &Path) -> PathBuf {
        tool_dir(repo_root).join(PLAN_FILE)
    }

    /// Load the plan; a missing file is an empty plan.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = Self::path_for(repo_root);
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let plan: Plan = serde_json::from_str(&raw)?;
        Ok(plan)
    }

    pub fn save(&self, repo_root: &Path) -> Result<()> {
        std::fs::create_dir_all(tool_dir(repo_root))?;
        write_json_atomic(&Self::path_for(repo_root), self)
    }

    /// Record a skip decision for a finding.
    pub fn skip(
        &mut self,
        id: impl Into<String>,
        kind: SkipKind,
        reason: Option<String>,
        review_after: Option<u64>,
        current_scan: u64,
    ) {
        self.skipped.insert(
            id.into(),
            SkipEntry {
                kind,
                reason,
                created_at: Utc::now(),
                review_after,
                skipped_at_scan: current_scan,
                resurface_due: false,
            },
        );
    }
}
