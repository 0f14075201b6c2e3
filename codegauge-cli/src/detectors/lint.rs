//! External-linter phase.
//!
//! Invokes the language's linter binary and adapts its stdout into
//! findings. The adapter is a pure function over the output bytes and
//! tolerates lines it does not understand: linters grow new fields and
//! formats faster than we ship.
//!
//! A missing binary is not an error: the phase reports the detector as
//! skipped, which keeps it out of the ran-set so prior lint findings are
//! never auto-resolved by a scan that could not lint. A timeout zeroes the
//! phase the same way.

use anyhow::Result;
use regex::Regex;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::errors::codes;
use crate::models::{line_symbol, normalize_path, Confidence, FindingDetail, RawFinding};
use crate::registry::DetectorKind;
use crate::zones::{zone_policy, ZonePolicy};

/// `path:line:col: CODE message`: the common linter text format.
fn diagnostic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<path>[^:]+):(?P<line>\d+):(?:\d+:?)?\s*(?P<code>[A-Z][A-Z0-9]*)?\s*(?P<msg>.+)$")
            .unwrap()
    })
}

/// Outcome of invoking the external tool.
pub enum ToolOutcome {
    Output(String),
    Missing,
    TimedOut,
}

/// Run the tool with a wall-clock bound. The child is killed on timeout.
pub fn run_tool(program: &str, args: &[&str], cwd: &std::path::Path, timeout: Duration) -> ToolOutcome {
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ToolOutcome::Missing,
        Err(e) => {
            warn!("failed to spawn {program}: {e}");
            return ToolOutcome::Missing;
        }
    };

    let stdout = child.stdout.take();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut out) = stdout {
            use std::io::Read;
            let _ = out.read_to_string(&mut buffer);
        }
        let _ = tx.send(buffer);
    });

    match rx.recv_timeout(timeout) {
        Ok(output) => {
            let _ = child.wait();
            ToolOutcome::Output(output)
        }
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
            ToolOutcome::TimedOut
        }
    }
}

/// Adapt linter stdout into raw findings. Unrecognized lines are skipped;
/// diagnostics for files outside the scanned set are dropped later by the
/// zone/path filter.
pub fn parse_lint_output(output: &str, root: &std::path::Path) -> Vec<RawFinding> {
    let root_str = normalize_path(&root.to_string_lossy());
    let mut findings = Vec::new();
    for line in output.lines() {
        let Some(caps) = diagnostic_re().captures(line.trim()) else {
            continue;
        };
        let Ok(line_no) = caps["line"].parse::<u32>() else {
            continue;
        };
        let mut path = normalize_path(&caps["path"]);
        if let Some(stripped) = path.strip_prefix(&format!("{root_str}/")) {
            path = stripped.to_string();
        }
        let code = caps.name("code").map(|m| m.as_str().to_string());
        let message = caps["msg"].trim().to_string();
        if message.is_empty() {
            continue;
        }
        let mut detail = FindingDetail {
            line: Some(line_no),
            ..Default::default()
        };
        if let Some(code) = &code {
            detail.extra.insert("rule".into(), code.clone().into());
        }
        let summary = match code {
            Some(code) => format!("{code}: {message}"),
            None => message,
        };
        findings.push(
            RawFinding::new(DetectorKind::Lint, &path, &line_symbol(line_no), summary)
                .with_confidence(Confidence::High)
                .with_detail(detail),
        );
    }
    findings
}

pub struct LintPhase;

impl Phase for LintPhase {
    fn name(&self) -> &'static str {
        "lint"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[DetectorKind::Lint]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let Some(tool) = ctx.plugin.lint_tool() else {
            return Ok(PhaseOutput {
                skipped: vec![DetectorKind::Lint],
                ..Default::default()
            });
        };

        let eligible = ctx.eligible_files(DetectorKind::Lint);
        let outcome = run_tool(tool, &["check", "."], ctx.root, ctx.tool_timeout);
        let output = match outcome {
            ToolOutcome::Output(output) => output,
            ToolOutcome::Missing => {
                warn!("{}:{tool} linter not installed; phase skipped", codes::TOOL_MISSING);
                return Ok(PhaseOutput {
                    skipped: vec![DetectorKind::Lint],
                    ..Default::default()
                });
            }
            ToolOutcome::TimedOut => {
                warn!("{}:{tool} linter exceeded timeout; phase skipped", codes::PHASE_TIMEOUT);
                return Ok(PhaseOutput {
                    skipped: vec![DetectorKind::Lint],
                    ..Default::default()
                });
            }
        };

        let known: std::collections::BTreeMap<&str, _> = ctx
            .files
            .iter()
            .map(|f| (f.path.as_str(), (f.zone, f.lang.clone())))
            .collect();
        let findings = parse_lint_output(&output, ctx.root)
            .into_iter()
            .filter_map(|mut f| {
                let (zone, lang) = known.get(f.file.as_str())?.clone();
                f.zone = zone;
                f.lang = lang;
                (zone_policy(f.detector, zone) != ZonePolicy::Skip).then_some(f)
            })
            .collect();

        Ok(PhaseOutput {
            findings,
            ..PhaseOutput::default()
        }
        .with_potential(DetectorKind::Lint, eligible.len() as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_diagnostics() {
        let output = "src/app.py:10:5: F401 'os' imported but unused\nsrc/app.py:20:1: E501 line too long\n";
        let findings = parse_lint_output(output, std::path::Path::new("/repo"));
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].id, "lint::src/app.py::L10");
        assert!(findings[0].summary.starts_with("F401"));
    }

    #[test]
    fn test_parse_strips_root_prefix() {
        let output = "/repo/src/app.py:3:1: E302 expected 2 blank lines\n";
        let findings = parse_lint_output(output, std::path::Path::new("/repo"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].file, "src/app.py");
    }

    #[test]
    fn test_parse_skips_garbage_lines() {
        let output = "Found 3 errors.\nwarning: something unstructured\n";
        assert!(parse_lint_output(output, std::path::Path::new("/repo")).is_empty());
    }

    #[test]
    fn test_parse_without_code() {
        let output = "src/app.py:7:1: unexpected indentation\n";
        let findings = parse_lint_output(output, std::path::Path::new("/repo"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].summary, "unexpected indentation");
    }

    #[test]
    fn test_missing_tool_reports_outcome() {
        let outcome = run_tool(
            "definitely-not-a-real-binary-name",
            &[],
            std::path::Path::new("."),
            Duration::from_secs(1),
        );
        assert!(matches!(outcome, ToolOutcome::Missing));
    }
}
