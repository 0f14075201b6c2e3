//! Scan orchestration.
//!
//! One scan, start to finish: lock, load, discover, graph, phases, merge,
//! score, integrity, reconcile, auto-cluster, persist. All state mutation
//! happens after every phase has completed; a cancellation or fatal error
//! anywhere before the final save leaves the prior state untouched on
//! disk.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::detectors::base::{ScanContext, SCAN_TIMEOUT, TOOL_TIMEOUT};
use crate::detectors::{run_phases, standard_phases};
use crate::discovery::discover;
use crate::graph::ImportGraph;
use crate::integrity::{run_integrity_checks, IntegrityOutcome};
use crate::lang::detect_plugin;
use crate::models::ScanHistoryEntry;
use crate::plan::{autocluster::autocluster, reconcile::reconcile, Plan};
use crate::queue::{build_queue, QueueOptions};
use crate::scoring::compute::compute_scores;
use crate::state::merge::merge_findings;
use crate::state::persistence::{load_state, save_state, tool_dir, write_json_atomic, ScanLock};
use crate::state::{ScanDiff, State};

/// Everything a caller needs to report on a finished scan.
pub struct ScanOutcome {
    pub diff: ScanDiff,
    pub state: State,
    pub integrity: IntegrityOutcome,
    /// (phase, code) for phases that failed or timed out.
    pub phase_failures: Vec<(String, String)>,
}

/// Machine-readable snapshot regenerated each scan for agent consumers.
#[derive(Serialize)]
struct QuerySnapshot<'a> {
    overall: f64,
    objective: f64,
    strict: f64,
    verified_strict: f64,
    open: usize,
    files: usize,
    next: Vec<&'a str>,
}

/// Run a full scan of `root`.
pub fn run_scan(root: &Path, config: &Config, cancel: Option<&AtomicBool>) -> Result<ScanOutcome> {
    let _lock = ScanLock::acquire(root)?;
    let mut state = load_state(root)?;
    let mut plan = Plan::load(root)?;
    let plugin = detect_plugin(root);

    let (files, discovery_stats) = discover(root, config, plugin.as_ref())?;
    info!(
        "scanning {} files ({} loc) in {}",
        discovery_stats.files,
        discovery_stats.loc,
        root.display()
    );
    let graph = ImportGraph::build(&files, plugin.as_ref());

    let report = {
        let ctx = ScanContext {
            root,
            config,
            files: &files,
            graph: &graph,
            plugin: plugin.as_ref(),
            prior: Some(&state),
            cancel,
            started: Instant::now(),
            tool_timeout: TOOL_TIMEOUT,
            scan_timeout: SCAN_TIMEOUT,
        };
        run_phases(&ctx, &standard_phases())?
    };

    // All phases complete; from here the in-memory state mutates and is
    // persisted atomically at the end.
    let now = Utc::now();
    let previous_overall = state.scores.overall;
    let merge = merge_findings(&mut state, report.findings, &report.ran, config, now);

    let mut bundle = compute_scores(
        &state.findings,
        &report.potentials,
        &state.subjective_assessments,
    );
    let mut record = state.subjective_integrity.clone();
    let integrity = run_integrity_checks(
        &mut state.subjective_assessments,
        &mut record,
        &bundle,
        f64::from(config.target_strict_score),
        state.scan_count,
        true,
    );
    state.subjective_integrity = record;
    if !integrity.reset_dimensions.is_empty() {
        // Penalty changed the inputs; the published scores must agree.
        bundle = compute_scores(
            &state.findings,
            &report.potentials,
            &state.subjective_assessments,
        );
    }

    state.scores = bundle.channels();
    state.stats.files = discovery_stats.files;
    state.stats.loc = discovery_stats.loc;
    state.stats.dirs = discovery_stats.dirs;

    let diff = ScanDiff {
        new: merge.new.clone(),
        resolved: merge.resolved.clone(),
        reopened: merge.reopened.clone(),
        score_delta: bundle.overall - previous_overall,
    };
    state.push_history(ScanHistoryEntry {
        at: now,
        overall: bundle.overall,
        objective: bundle.objective,
        strict: bundle.strict,
        verified_strict: bundle.verified_strict,
        open: state.open_findings().count(),
        resolved: merge.resolved.len(),
        new: merge.new.len(),
        reopened: merge.reopened.len(),
    });

    reconcile(&mut plan, &state, now);
    autocluster(&mut plan, &state);
    crate::concerns::cleanup_stale_dismissals(&mut state);

    save_state(root, &state)?;
    plan.save(root)?;
    write_query_snapshot(root, &state, &plan)?;

    info!(
        "scan complete: overall {:.1} ({:+.1})",
        bundle.overall, diff.score_delta
    );
    Ok(ScanOutcome {
        diff,
        state,
        integrity,
        phase_failures: report.failures,
    })
}

fn write_query_snapshot(root: &Path, state: &State, plan: &Plan) -> Result<()> {
    let queue = build_queue(
        state,
        plan,
        &QueueOptions {
            count: Some(10),
            ..Default::default()
        },
    );
    let snapshot = QuerySnapshot {
        overall: state.scores.overall,
        objective: state.scores.objective,
        strict: state.scores.strict,
        verified_strict: state.scores.verified_strict,
        open: state.open_findings().count(),
        files: state.stats.files,
        next: queue.items.iter().map(|i| i.id()).collect(),
    };
    write_json_atomic(&tool_dir(root).join("query.json"), &snapshot)
}
