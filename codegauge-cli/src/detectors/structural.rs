//! Structural phase: large files, complex functions, god classes.
//!
//! Per-file work is independent, so files are processed in parallel; the
//! engine re-sorts findings by id afterwards.

use anyhow::Result;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::discovery::SourceFile;
use crate::models::{FindingDetail, RawFinding};
use crate::registry::DetectorKind;

/// Method count past which a class is doing too much.
const GOD_CLASS_METHODS: usize = 20;
/// Class body length that flags regardless of method count.
const GOD_CLASS_LOC: u32 = 400;

pub struct StructuralPhase;

impl StructuralPhase {
    fn large_threshold(ctx: &ScanContext) -> u32 {
        if ctx.config.large_files_threshold > 0 {
            ctx.config.large_files_threshold
        } else {
            let lang_override = ctx
                .config
                .languages
                .get(ctx.plugin.name())
                .and_then(|o| o.large_threshold);
            lang_override.unwrap_or_else(|| ctx.plugin.large_threshold())
        }
    }

    fn complexity_threshold(ctx: &ScanContext) -> u32 {
        ctx.config
            .languages
            .get(ctx.plugin.name())
            .and_then(|o| o.complexity_threshold)
            .unwrap_or_else(|| ctx.plugin.complexity_threshold())
    }

    fn check_file(
        ctx: &ScanContext,
        file: &SourceFile,
        large_threshold: u32,
        complexity_threshold: u32,
    ) -> Vec<RawFinding> {
        let mut findings = Vec::new();
        let functions = ctx.plugin.extract_functions(file);

        if file.loc > large_threshold {
            // File-scoped: empty symbol slot is the canonical form.
            let max_params = functions.iter().map(|f| f.params).max().unwrap_or(0);
            let max_nesting = functions.iter().map(|f| f.max_nesting).max().unwrap_or(0);
            let mut detail = FindingDetail {
                loc: Some(file.loc),
                // Weight cap scales with how far past the threshold the file is.
                loc_weight: Some((f64::from(file.loc) / f64::from(large_threshold)).min(3.0)),
                ..Default::default()
            };
            detail
                .extra
                .insert("function_count".into(), functions.len().into());
            detail.extra.insert("max_params".into(), max_params.into());
            detail
                .extra
                .insert("max_nesting".into(), max_nesting.into());
            findings.push(
                RawFinding::new(
                    DetectorKind::Large,
                    &file.path,
                    "",
                    format!("{} non-blank lines (threshold {})", file.loc, large_threshold),
                )
                .with_detail(detail),
            );
        }

        for function in &functions {
            if function.complexity > complexity_threshold {
                findings.push(
                    RawFinding::new(
                        DetectorKind::Complexity,
                        &file.path,
                        &function.name,
                        format!(
                            "{}() has complexity {} (threshold {})",
                            function.name, function.complexity, complexity_threshold
                        ),
                    )
                    .with_detail(FindingDetail {
                        complexity: Some(function.complexity),
                        symbol: Some(function.name.clone()),
                        line: Some(function.line_start),
                        loc: Some(function.loc()),
                        ..Default::default()
                    }),
                );
            }
        }

        for class in ctx.plugin.extract_classes(file) {
            let class_loc = class.line_end.saturating_sub(class.line_start) + 1;
            if class.methods.len() >= GOD_CLASS_METHODS || class_loc >= GOD_CLASS_LOC {
                let mut detail = FindingDetail {
                    symbol: Some(class.name.clone()),
                    line: Some(class.line_start),
                    loc: Some(class_loc),
                    ..Default::default()
                };
                detail
                    .extra
                    .insert("method_count".into(), class.methods.len().into());
                findings.push(
                    RawFinding::new(
                        DetectorKind::GodClass,
                        &file.path,
                        &class.name,
                        format!(
                            "class {} has {} methods across {} lines",
                            class.name,
                            class.methods.len(),
                            class_loc
                        ),
                    )
                    .with_detail(detail),
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

impl Phase for StructuralPhase {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[
            DetectorKind::Large,
            DetectorKind::Complexity,
            DetectorKind::GodClass,
        ]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let large_threshold = Self::large_threshold(ctx);
        let complexity_threshold = Self::complexity_threshold(ctx);

        let large_files = ctx.eligible_files(DetectorKind::Large);
        let complexity_files = ctx.eligible_files(DetectorKind::Complexity);
        let god_files = ctx.eligible_files(DetectorKind::GodClass);

        let findings: Vec<RawFinding> = ctx
            .files
            .par_iter()
            .flat_map_iter(|file| Self::check_file(ctx, file, large_threshold, complexity_threshold))
            .collect();

        debug!("structural phase: {} findings", findings.len());
        Ok(PhaseOutput {
            findings,
            potentials: BTreeMap::from([
                (DetectorKind::Large, large_files.len() as u32),
                (DetectorKind::Complexity, complexity_files.len() as u32),
                (DetectorKind::GodClass, god_files.len() as u32),
            ]),
            skipped: vec![],
        })
    }
}
