//! Code smell phase.
//!
//! Line-level smells the lightweight parsers can see without an AST:
//! overly broad exception handling, mutable default arguments, leftover
//! debug output, deep nesting, and monster functions. Each smell carries a
//! `smell_id` in its detail so the concern synthesizer can spot the same
//! smell recurring across files.

use anyhow::Result;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::discovery::SourceFile;
use crate::models::{line_symbol, Confidence, FindingDetail, RawFinding, Tier};
use crate::registry::DetectorKind;

/// Function length past which it is a monster regardless of complexity.
const MONSTER_FUNCTION_LOC: u32 = 120;
/// Nesting depth that flags on its own.
const DEEP_NESTING: u32 = 5;
/// Parameter count past which a signature needs a config object.
const LONG_PARAMS: u32 = 6;

struct LineSmell {
    smell_id: &'static str,
    pattern: &'static str,
    summary: &'static str,
    confidence: Confidence,
}

const LINE_SMELLS: &[LineSmell] = &[
    LineSmell {
        smell_id: "broad_except",
        pattern: r"except\s*(Exception\s*)?:",
        summary: "broad exception handler",
        confidence: Confidence::High,
    },
    LineSmell {
        smell_id: "mutable_default",
        pattern: r"def\s+\w+\([^)]*=\s*(\[\]|\{\})",
        summary: "mutable default argument",
        confidence: Confidence::High,
    },
    LineSmell {
        smell_id: "debug_print",
        pattern: r"^\s*(print\(|console\.(log|debug)\()",
        summary: "leftover debug output",
        confidence: Confidence::Medium,
    },
    LineSmell {
        smell_id: "bare_todo",
        pattern: r"#\s*(TODO|FIXME|XXX)\b|//\s*(TODO|FIXME|XXX)\b",
        summary: "unresolved TODO marker",
        confidence: Confidence::Low,
    },
];

fn compiled_smells() -> &'static Vec<(Regex, &'static LineSmell)> {
    static COMPILED: OnceLock<Vec<(Regex, &'static LineSmell)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        LINE_SMELLS
            .iter()
            .map(|s| (Regex::new(s.pattern).unwrap(), s))
            .collect()
    })
}

pub struct SmellsPhase;

impl SmellsPhase {
    fn check_file(ctx: &ScanContext, file: &SourceFile) -> Vec<RawFinding> {
        let mut findings = Vec::new();

        for (idx, line) in file.content.lines().enumerate() {
            let line_no = (idx + 1) as u32;
            for (regex, smell) in compiled_smells() {
                if regex.is_match(line) {
                    let mut detail = FindingDetail {
                        line: Some(line_no),
                        smell_id: Some(smell.smell_id.to_string()),
                        ..Default::default()
                    };
                    detail
                        .extra
                        .insert("snippet".into(), line.trim().to_string().into());
                    findings.push(
                        RawFinding::new(
                            DetectorKind::Smells,
                            &file.path,
                            &line_symbol(line_no),
                            format!("{} at line {line_no}", smell.summary),
                        )
                        .with_confidence(smell.confidence)
                        .with_detail(detail),
                    );
                }
            }
        }

        for function in ctx.plugin.extract_functions(file) {
            if function.loc() >= MONSTER_FUNCTION_LOC {
                findings.push(
                    RawFinding::new(
                        DetectorKind::Smells,
                        &file.path,
                        &function.name,
                        format!("{}() spans {} lines", function.name, function.loc()),
                    )
                    .with_tier(Tier::Judgment)
                    .with_detail(FindingDetail {
                        loc: Some(function.loc()),
                        symbol: Some(function.name.clone()),
                        line: Some(function.line_start),
                        smell_id: Some("monster_function".into()),
                        ..Default::default()
                    }),
                );
            } else if function.params >= LONG_PARAMS {
                findings.push(
                    RawFinding::new(
                        DetectorKind::Smells,
                        &file.path,
                        &function.name,
                        format!("{}() takes {} parameters", function.name, function.params),
                    )
                    .with_tier(Tier::Judgment)
                    .with_detail(FindingDetail {
                        symbol: Some(function.name.clone()),
                        line: Some(function.line_start),
                        smell_id: Some("long_params".into()),
                        extra: BTreeMap::from([(
                            "max_params".to_string(),
                            function.params.into(),
                        )]),
                        ..Default::default()
                    }),
                );
            } else if function.max_nesting >= DEEP_NESTING {
                findings.push(
                    RawFinding::new(
                        DetectorKind::Smells,
                        &file.path,
                        &function.name,
                        format!(
                            "{}() nests {} levels deep",
                            function.name, function.max_nesting
                        ),
                    )
                    .with_tier(Tier::Judgment)
                    .with_detail(FindingDetail {
                        symbol: Some(function.name.clone()),
                        line: Some(function.line_start),
                        smell_id: Some("deep_nesting".into()),
                        extra: BTreeMap::from([(
                            "max_nesting".to_string(),
                            function.max_nesting.into(),
                        )]),
                        ..Default::default()
                    }),
                );
            }
        }

        findings
            .into_iter()
            .map(|mut f| {
                f.zone = file.zone;
                f.lang = file.lang.clone();
                f
            })
            .filter_map(|f| ctx.apply_zone_policy(f))
            .collect()
    }
}

impl Phase for SmellsPhase {
    fn name(&self) -> &'static str {
        "smells"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[DetectorKind::Smells]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let eligible = ctx.eligible_files(DetectorKind::Smells);
        let findings: Vec<RawFinding> = ctx
            .files
            .par_iter()
            .flat_map_iter(|file| Self::check_file(ctx, file))
            .collect();
        Ok(PhaseOutput {
            findings,
            ..PhaseOutput::default()
        }
        .with_potential(DetectorKind::Smells, eligible.len() as u32))
    }
}
