//! Thin command-line shell over the core.
//!
//! The heavy lifting lives in the library; this module parses arguments,
//! calls one core entry point per subcommand, and prints plain-text
//! summaries. Fatal errors surface with their remediation line and a
//! non-zero exit, never a stack trace.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use codegauge_cli::config::Config;
use codegauge_cli::models::{Attestation, FindingStatus};
use codegauge_cli::plan::{Plan, SkipKind};
use codegauge_cli::queue::{build_queue, QueueItem, QueueOptions, StatusFilter};
use codegauge_cli::scan::run_scan;
use codegauge_cli::state::merge::resolve_finding;
use codegauge_cli::state::persistence::{load_state, save_state};

#[derive(Parser)]
#[command(name = "codegauge", about = "Codebase-quality analyzer", version)]
pub struct Cli {
    /// Repository root to operate on.
    #[arg(long, global = true, default_value = ".")]
    pub path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan the repository and update state.
    Scan,
    /// Show current scores and counts.
    Status,
    /// Show the next items from the work queue.
    Next {
        #[arg(long)]
        tier: Option<u8>,
        #[arg(long, default_value_t = 5)]
        count: usize,
        /// Path-prefix scope filter.
        #[arg(long)]
        scope: Option<String>,
        /// Only findings reopened at least twice.
        #[arg(long)]
        chronic: bool,
        #[arg(long)]
        no_tier_fallback: bool,
    },
    /// Resolve a finding (fixed, wontfix, false-positive).
    Resolve {
        id: String,
        #[arg(long, value_parser = ["fixed", "wontfix", "false-positive"])]
        r#as: String,
        #[arg(long)]
        by: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Skip a finding in the plan.
    Skip {
        id: String,
        #[arg(long, default_value = "temporary", value_parser = ["temporary", "permanent", "false-positive"])]
        kind: String,
        #[arg(long)]
        reason: Option<String>,
        /// Resurface for review after this many scans.
        #[arg(long)]
        review_after: Option<u64>,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scan => {
            let config = Config::load(&cli.path)?;
            let outcome = run_scan(&cli.path, &config, None)?;
            let scores = &outcome.state.scores;
            println!(
                "overall {:.1} ({:+.1})  objective {:.1}  strict {:.1}  verified-strict {:.1}",
                scores.overall,
                outcome.diff.score_delta,
                scores.objective,
                scores.strict,
                scores.verified_strict
            );
            println!(
                "{} new, {} resolved, {} reopened",
                outcome.diff.new.len(),
                outcome.diff.resolved.len(),
                outcome.diff.reopened.len()
            );
            for (phase, code) in &outcome.phase_failures {
                println!("warning: phase {phase} did not complete ({code})");
            }
            Ok(())
        }
        Command::Status => {
            let state = load_state(&cli.path)?;
            println!(
                "overall {:.1}  objective {:.1}  strict {:.1}  verified-strict {:.1}",
                state.scores.overall,
                state.scores.objective,
                state.scores.strict,
                state.scores.verified_strict
            );
            for (status, count) in &state.stats.by_status {
                println!("{status}: {count}");
            }
            Ok(())
        }
        Command::Next {
            tier,
            count,
            scope,
            chronic,
            no_tier_fallback,
        } => {
            let state = load_state(&cli.path)?;
            let plan = Plan::load(&cli.path)?;
            let options = QueueOptions {
                tier,
                count: Some(count),
                scope,
                chronic,
                no_tier_fallback,
                status: StatusFilter::Open,
                ..Default::default()
            };
            let result = build_queue(&state, &plan, &options);
            if let Some(reason) = &result.fallback_reason {
                println!("note: {reason}");
            }
            for item in &result.items {
                match item {
                    QueueItem::Cluster {
                        name, member_count, ..
                    } => println!("[cluster] {name} ({member_count} findings)"),
                    QueueItem::Mechanical {
                        id, tier, summary, ..
                    } => println!("[T{tier}] {id}: {summary}"),
                    QueueItem::Subjective {
                        dimension, score, ..
                    } => println!("[review] {dimension} at {score:.0}"),
                }
            }
            println!("{} of {} shown", result.items.len(), result.total);
            Ok(())
        }
        Command::Resolve { id, r#as, by, reason } => {
            let mut state = load_state(&cli.path)?;
            let status = match r#as.as_str() {
                "fixed" => FindingStatus::Fixed,
                "wontfix" => FindingStatus::Wontfix,
                _ => FindingStatus::FalsePositive,
            };
            let attestation = match (by, reason) {
                (Some(by), Some(reason)) => Some(Attestation {
                    by,
                    reason,
                    at: Utc::now(),
                    kind: None,
                }),
                _ => None,
            };
            resolve_finding(&mut state, &id, status, attestation, Utc::now())
                .map_err(|e| anyhow::anyhow!(e))?;
            save_state(&cli.path, &state)?;
            println!("{id} -> {status}");
            Ok(())
        }
        Command::Skip {
            id,
            kind,
            reason,
            review_after,
        } => {
            let state = load_state(&cli.path)?;
            let mut plan = Plan::load(&cli.path)?;
            let kind = match kind.as_str() {
                "permanent" => SkipKind::Permanent,
                "false-positive" => SkipKind::FalsePositive,
                _ => SkipKind::Temporary,
            };
            plan.skip(&id, kind, reason, review_after, state.scan_count);
            plan.save(&cli.path)?;
            println!("skipped {id}");
            Ok(())
        }
    }
}
