//! Security pattern phase.
//!
//! Line-scoped regex sweep for the classic footguns: hardcoded secrets,
//! shell injection, unsafe deserialization, weak hashing, SQL built by
//! string interpolation. Findings use the `L{line}` symbol form so the same
//! hit keeps the same id while surrounding code shifts within the file only
//! when its line moves: the accepted tradeoff for line-scoped defects.

use anyhow::Result;
use rayon::prelude::*;
use regex::Regex;
use std::sync::OnceLock;

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::discovery::SourceFile;
use crate::models::{line_symbol, Confidence, FindingDetail, RawFinding, Tier};
use crate::registry::DetectorKind;

struct SecurityPattern {
    rule_id: &'static str,
    pattern: &'static str,
    summary: &'static str,
    confidence: Confidence,
}

const PATTERNS: &[SecurityPattern] = &[
    SecurityPattern {
        rule_id: "hardcoded_secret",
        pattern: r#"(?i)(password|secret|api_key|apikey|token)\s*=\s*["'][^"']{8,}["']"#,
        summary: "possible hardcoded credential",
        confidence: Confidence::Medium,
    },
    SecurityPattern {
        rule_id: "shell_injection",
        pattern: r#"(?:os\.system|subprocess\.(?:call|run|Popen))\s*\([^)]*(?:\+|%|\bformat\b|f["'])"#,
        summary: "shell command built from dynamic input",
        confidence: Confidence::Medium,
    },
    SecurityPattern {
        rule_id: "unsafe_deserialize",
        pattern: r"(?:pickle\.loads?|yaml\.load)\s*\(",
        summary: "unsafe deserialization",
        confidence: Confidence::High,
    },
    SecurityPattern {
        rule_id: "weak_hash",
        pattern: r"(?:hashlib\.(?:md5|sha1)|crypto\.createHash\(['\x22](?:md5|sha1)['\x22]\))",
        summary: "weak hash algorithm",
        confidence: Confidence::High,
    },
    SecurityPattern {
        rule_id: "sql_interpolation",
        pattern: r#"(?i)(?:execute|query)\s*\(\s*(?:f["']|["'][^"']*["']\s*%|["'][^"']*["']\s*\+)"#,
        summary: "SQL statement built by string interpolation",
        confidence: Confidence::Medium,
    },
    SecurityPattern {
        rule_id: "eval_call",
        pattern: r"\beval\s*\(",
        summary: "eval() on dynamic input",
        confidence: Confidence::Medium,
    },
];

fn compiled_patterns() -> &'static Vec<(Regex, &'static SecurityPattern)> {
    static COMPILED: OnceLock<Vec<(Regex, &'static SecurityPattern)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|p| (Regex::new(p.pattern).unwrap(), p))
            .collect()
    })
}

pub struct SecurityPhase;

impl SecurityPhase {
    fn check_file(ctx: &ScanContext, file: &SourceFile) -> Vec<RawFinding> {
        let mut findings = Vec::new();
        for (idx, line) in file.content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') || trimmed.starts_with("//") {
                continue;
            }
            let line_no = (idx + 1) as u32;
            for (regex, pattern) in compiled_patterns() {
                if regex.is_match(line) {
                    let mut detail = FindingDetail {
                        line: Some(line_no),
                        ..Default::default()
                    };
                    detail
                        .extra
                        .insert("rule".into(), pattern.rule_id.into());
                    let mut finding = RawFinding::new(
                        DetectorKind::Security,
                        &file.path,
                        &line_symbol(line_no),
                        format!("{} at line {line_no}", pattern.summary),
                    )
                    .with_tier(Tier::Judgment)
                    .with_confidence(pattern.confidence)
                    .with_detail(detail);
                    finding.zone = file.zone;
                    finding.lang = file.lang.clone();
                    findings.push(finding);
                }
            }
        }
        findings
            .into_iter()
            .filter_map(|f| ctx.apply_zone_policy(f))
            .collect()
    }
}

impl Phase for SecurityPhase {
    fn name(&self) -> &'static str {
        "security"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[DetectorKind::Security]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let eligible = ctx.eligible_files(DetectorKind::Security);
        let findings: Vec<RawFinding> = ctx
            .files
            .par_iter()
            .flat_map_iter(|file| Self::check_file(ctx, file))
            .collect();
        Ok(PhaseOutput {
            findings,
            ..PhaseOutput::default()
        }
        .with_potential(DetectorKind::Security, eligible.len() as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::ImportGraph;
    use crate::lang::python::PythonPlugin;
    use crate::zones::Zone;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn run_on_zone(content: &str, zone: Zone) -> Vec<RawFinding> {
        let files = vec![SourceFile {
            path: "a.py".into(),
            abs_path: "a.py".into(),
            zone,
            lang: "python".into(),
            content: Arc::new(content.into()),
            loc: content.lines().count() as u32,
        }];
        let config = Config::default();
        let plugin = PythonPlugin::new();
        let graph = ImportGraph::build(&files, &plugin);
        let ctx = ScanContext {
            root: std::path::Path::new("."),
            config: &config,
            files: &files,
            graph: &graph,
            plugin: &plugin,
            prior: None,
            cancel: None,
            started: Instant::now(),
            tool_timeout: Duration::from_secs(120),
            scan_timeout: Duration::from_secs(1200),
        };
        SecurityPhase.run(&ctx).unwrap().findings
    }

    fn run_on(content: &str) -> Vec<RawFinding> {
        run_on_zone(content, Zone::Production)
    }

    #[test]
    fn test_hardcoded_secret() {
        let findings = run_on("password = \"hunter2hunter2\"\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].id, "security::a.py::L1");
    }

    #[test]
    fn test_unsafe_deserialize_high_confidence() {
        let findings = run_on("import pickle\ndata = pickle.loads(blob)\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, Confidence::High);
    }

    #[test]
    fn test_comment_lines_skipped() {
        assert!(run_on("# password = \"hunter2hunter2\"\n").is_empty());
    }

    #[test]
    fn test_test_zone_skips_security() {
        let findings = run_on_zone("password = \"hunter2hunter2\"\n", Zone::Test);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_weak_hash() {
        let findings = run_on("digest = hashlib.md5(data).hexdigest()\n");
        assert_eq!(findings.len(), 1);
    }
}
