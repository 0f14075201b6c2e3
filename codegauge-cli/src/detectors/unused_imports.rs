//! Unused-import phase.
//!
//! Flags imported names that never appear again in the file. The check is
//! textual: a name used only inside a string literal will false-negative,
//! which is the safe direction for an auto-fixable detector.

use anyhow::Result;
use rayon::prelude::*;
use regex::Regex;
use std::sync::OnceLock;

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::discovery::SourceFile;
use crate::models::{FindingDetail, RawFinding};
use crate::registry::DetectorKind;

fn python_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:import\s+([\w.]+)(?:\s+as\s+(\w+))?|from\s+[.\w]+\s+import\s+(.+))")
            .unwrap()
    })
}

fn ts_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^import\s+(?:\{([^}]+)\}|(\w+))\s+from\s+['"]"#).unwrap()
    })
}

/// Imported binding: the name that enters scope, and the line it came from.
struct ImportedName {
    name: String,
    line: u32,
}

fn imported_names(file: &SourceFile) -> Vec<ImportedName> {
    let mut names = Vec::new();
    for (idx, line) in file.content.lines().enumerate() {
        let line_no = (idx + 1) as u32;
        let trimmed = line.trim_start();
        if file.lang == "python" {
            if let Some(caps) = python_import_re().captures(trimmed) {
                if let Some(alias) = caps.get(2) {
                    names.push(ImportedName {
                        name: alias.as_str().to_string(),
                        line: line_no,
                    });
                } else if let Some(module) = caps.get(1) {
                    // `import a.b.c` binds the top-level package name.
                    let top = module.as_str().split('.').next().unwrap_or("");
                    names.push(ImportedName {
                        name: top.to_string(),
                        line: line_no,
                    });
                } else if let Some(list) = caps.get(3) {
                    for part in list.as_str().split(',') {
                        let part = part.trim().trim_end_matches(')').trim_start_matches('(');
                        if part.is_empty() || part == "*" {
                            continue;
                        }
                        let bound = part
                            .split_once(" as ")
                            .map(|(_, alias)| alias)
                            .unwrap_or(part)
                            .trim();
                        if !bound.is_empty() {
                            names.push(ImportedName {
                                name: bound.to_string(),
                                line: line_no,
                            });
                        }
                    }
                }
            }
        } else if let Some(caps) = ts_import_re().captures(trimmed) {
            if let Some(list) = caps.get(1) {
                for part in list.as_str().split(',') {
                    let bound = part
                        .trim()
                        .split_once(" as ")
                        .map(|(_, alias)| alias)
                        .unwrap_or(part.trim())
                        .trim();
                    if !bound.is_empty() {
                        names.push(ImportedName {
                            name: bound.to_string(),
                            line: line_no,
                        });
                    }
                }
            } else if let Some(default) = caps.get(2) {
                names.push(ImportedName {
                    name: default.as_str().to_string(),
                    line: line_no,
                });
            }
        }
    }
    names
}

fn name_used_after_import(file: &SourceFile, name: &str, import_line: u32) -> bool {
    let boundary = Regex::new(&format!(r"\b{}\b", regex::escape(name))).unwrap();
    file.content
        .lines()
        .enumerate()
        .filter(|(idx, _)| (*idx + 1) as u32 != import_line)
        .any(|(_, line)| boundary.is_match(line))
}

pub struct UnusedImportsPhase;

impl UnusedImportsPhase {
    fn check_file(ctx: &ScanContext, file: &SourceFile) -> Vec<RawFinding> {
        imported_names(file)
            .into_iter()
            .filter(|import| !name_used_after_import(file, &import.name, import.line))
            .map(|import| {
                let mut finding = RawFinding::new(
                    DetectorKind::UnusedImports,
                    &file.path,
                    &import.name,
                    format!("import '{}' is never used", import.name),
                )
                .with_detail(FindingDetail {
                    symbol: Some(import.name),
                    line: Some(import.line),
                    ..Default::default()
                });
                finding.zone = file.zone;
                finding.lang = file.lang.clone();
                finding
            })
            .filter_map(|f| ctx.apply_zone_policy(f))
            .collect()
    }
}

impl Phase for UnusedImportsPhase {
    fn name(&self) -> &'static str {
        "unused_imports"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[DetectorKind::UnusedImports]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let eligible = ctx.eligible_files(DetectorKind::UnusedImports);
        let findings: Vec<RawFinding> = ctx
            .files
            .par_iter()
            .flat_map_iter(|file| Self::check_file(ctx, file))
            .collect();
        Ok(PhaseOutput {
            findings,
            ..PhaseOutput::default()
        }
        .with_potential(DetectorKind::UnusedImports, eligible.len() as u32))
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

    fn run_on(content: &str) -> Vec<RawFinding> {
        let files = vec![SourceFile {
            path: "a.py".into(),
            abs_path: "a.py".into(),
            zone: Zone::Production,
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
        UnusedImportsPhase.run(&ctx).unwrap().findings
    }

    #[test]
    fn test_unused_import_flagged() {
        let findings = run_on("import os\nimport sys\n\nprint(sys.argv)\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].id, "unused_imports::a.py::os");
    }

    #[test]
    fn test_used_import_not_flagged() {
        assert!(run_on("import os\n\nos.getcwd()\n").is_empty());
    }

    #[test]
    fn test_from_import_list() {
        let findings = run_on("from os.path import join, split\n\njoin('a', 'b')\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detail.symbol.as_deref(), Some("split"));
    }

    #[test]
    fn test_aliased_import_checks_alias() {
        let findings = run_on("import numpy as np\n\nx = np.zeros(3)\n");
        assert!(findings.is_empty());
    }
}
