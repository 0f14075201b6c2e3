//! Duplicate-code phase.
//!
//! Near-duplicate functions are found by shingling normalized bodies and
//! clustering similar pairs with union-find: N similar functions produce
//! one cluster finding, not N^2/2 pairwise entries. Boilerplate duplication
//! is the cheaper cousin: identical normalized blocks (identifiers and
//! literals masked) repeated across several files.
//!
//! Cluster identity hashes the full sorted member set, like cycles.

use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};

use codegauge_fast::similarity::{line_shingles, similar_pairs};

use crate::detectors::base::{Phase, PhaseOutput, ScanContext};
use crate::discovery::SourceFile;
use crate::models::{member_set_symbol, Confidence, FindingDetail, RawFinding};
use crate::registry::DetectorKind;
use crate::zones::{zone_policy, ZonePolicy};

/// Shingle-set similarity at or above this clusters two functions.
const DUPLICATE_SIMILARITY: f64 = 0.85;
/// Shingle window in normalized lines.
const SHINGLE_WINDOW: usize = 3;
/// Functions shorter than this are scaffolding, not duplication targets.
const MIN_DUPE_LOC: u32 = 8;
/// A masked block must recur in at least this many files for boilerplate.
const BOILERPLATE_MIN_FILES: usize = 3;
/// Boilerplate block height in lines.
const BOILERPLATE_WINDOW: usize = 5;

struct FunctionBlock {
    file: String,
    name: String,
    text: String,
}

/// Union-find clustering over pairwise matches; clusters of size >= 2.
fn build_clusters(pairs: &[(usize, usize, f64)], n: usize) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut Vec<usize>, mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for &(i, j, _) in pairs {
        let ri = find(&mut parent, i);
        let rj = find(&mut parent, j);
        if ri != rj {
            parent[ri] = rj;
        }
    }

    let mut clusters: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for i in 0..n {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }
    let mut result: Vec<Vec<usize>> = clusters
        .into_values()
        .filter(|c| c.len() >= 2)
        .collect();
    result.sort_by_key(|c| c[0]);
    result
}

/// Mask identifiers, strings, and numbers so boilerplate matches across
/// renamed copies.
fn mask_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.trim().chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                out.push('S');
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == c {
                        break;
                    }
                }
            }
            c if c.is_ascii_digit() => {
                out.push('N');
                while chars.peek().is_some_and(|n| n.is_ascii_digit() || *n == '.') {
                    chars.next();
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while chars
                    .peek()
                    .is_some_and(|n| n.is_alphanumeric() || *n == '_')
                {
                    word.push(chars.next().unwrap());
                }
                if is_keyword(&word) {
                    out.push_str(&word);
                } else {
                    out.push('I');
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn is_keyword(word: &str) -> bool {
    const KEYWORDS: &[&str] = &[
        "def", "class", "return", "if", "elif", "else", "for", "while", "try", "except",
        "finally", "with", "as", "pass", "raise", "import", "from", "in", "and", "or", "not",
        "lambda", "function", "const", "let", "var", "export", "default", "new", "switch",
        "case", "break", "continue", "throw", "catch", "async", "await", "interface", "type",
    ];
    KEYWORDS.contains(&word)
}

pub struct DupesPhase;

impl DupesPhase {
    fn function_blocks(ctx: &ScanContext, eligible: &[&SourceFile]) -> Vec<FunctionBlock> {
        let mut blocks = Vec::new();
        for file in eligible {
            let lines: Vec<&str> = file.content.lines().collect();
            for function in ctx.plugin.extract_functions(file) {
                if function.loc() < MIN_DUPE_LOC {
                    continue;
                }
                // Body only: the signature line would make renamed copies
                // of the same body look different.
                let start = function.line_start as usize;
                let end = (function.line_end as usize).min(lines.len());
                if start >= end {
                    continue;
                }
                blocks.push(FunctionBlock {
                    file: file.path.clone(),
                    name: function.name,
                    text: lines[start..end].join("\n"),
                });
            }
        }
        blocks
    }

    fn dupe_findings(ctx: &ScanContext) -> (Vec<RawFinding>, u32) {
        let eligible = ctx.eligible_files(DetectorKind::Dupes);
        let blocks = Self::function_blocks(ctx, &eligible);
        let shingle_sets: Vec<_> = blocks
            .iter()
            .map(|b| line_shingles(&b.text, SHINGLE_WINDOW))
            .collect();
        let pairs = similar_pairs(&shingle_sets, DUPLICATE_SIMILARITY);

        let zones: FxHashMap<&str, _> = ctx
            .files
            .iter()
            .map(|f| (f.path.as_str(), (f.zone, f.lang.clone())))
            .collect();

        let mut findings = Vec::new();
        for cluster in build_clusters(&pairs, blocks.len()) {
            let mut members: Vec<String> = cluster
                .iter()
                .map(|&i| format!("{}:{}", blocks[i].file, blocks[i].name))
                .collect();
            members.sort();
            // Skip clusters living entirely inside one file pair in a
            // skipped zone; representative decides zone policy.
            let representative_file = blocks[cluster[0]].file.clone();
            let symbol = member_set_symbol(&members);
            let best_similarity = pairs
                .iter()
                .filter(|(i, j, _)| cluster.contains(i) && cluster.contains(j))
                .map(|(_, _, s)| *s)
                .fold(0.0f64, f64::max);
            let (zone, lang) = zones
                .get(representative_file.as_str())
                .cloned()
                .unwrap_or_default();
            let mut finding = RawFinding::new(
                DetectorKind::Dupes,
                &representative_file,
                &symbol,
                format!("{} near-identical functions", members.len()),
            )
            .with_confidence(Confidence::Medium)
            .with_detail(FindingDetail {
                members,
                similarity: Some(best_similarity),
                cluster_id: Some(symbol.clone()),
                ..Default::default()
            });
            finding.zone = zone;
            finding.lang = lang;
            findings.push(finding);
        }
        (findings, blocks.len() as u32)
    }

    fn boilerplate_findings(ctx: &ScanContext) -> (Vec<RawFinding>, u32) {
        let eligible = ctx.eligible_files(DetectorKind::BoilerplateDuplication);

        // Masked block hash -> set of files containing it.
        let mut block_files: FxHashMap<u64, FxHashSet<&str>> = FxHashMap::default();
        for file in &eligible {
            let masked: Vec<String> = file
                .content
                .lines()
                .map(mask_line)
                .filter(|l| !l.is_empty())
                .collect();
            if masked.len() < BOILERPLATE_WINDOW {
                continue;
            }
            for window in masked.windows(BOILERPLATE_WINDOW) {
                let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
                for line in window {
                    for byte in line.as_bytes() {
                        hash ^= u64::from(*byte);
                        hash = hash.wrapping_mul(0x100_0000_01b3);
                    }
                }
                block_files.entry(hash).or_default().insert(&file.path);
            }
        }

        // One finding per file that shares boilerplate with enough others.
        let mut flagged: FxHashMap<&str, usize> = FxHashMap::default();
        for files in block_files.values() {
            if files.len() < BOILERPLATE_MIN_FILES {
                continue;
            }
            for file in files {
                let entry = flagged.entry(file).or_insert(0);
                *entry = (*entry).max(files.len());
            }
        }

        let zones: FxHashMap<&str, _> = ctx
            .files
            .iter()
            .map(|f| (f.path.as_str(), (f.zone, f.lang.clone())))
            .collect();
        let mut findings = Vec::new();
        let mut paths: Vec<_> = flagged.into_iter().collect();
        paths.sort();
        for (path, sharing) in paths {
            let (zone, lang) = zones.get(path).cloned().unwrap_or_default();
            let mut detail = FindingDetail::default();
            detail.extra.insert("sharing_files".into(), sharing.into());
            let mut finding = RawFinding::new(
                DetectorKind::BoilerplateDuplication,
                path,
                "",
                format!("boilerplate block repeated across {sharing} files"),
            )
            .with_confidence(Confidence::Low)
            .with_detail(detail);
            finding.zone = zone;
            finding.lang = lang;
            findings.push(finding);
        }
        (findings, eligible.len() as u32)
    }
}

impl Phase for DupesPhase {
    fn name(&self) -> &'static str {
        "dupes"
    }

    fn detectors(&self) -> &'static [DetectorKind] {
        &[DetectorKind::Dupes, DetectorKind::BoilerplateDuplication]
    }

    fn run(&self, ctx: &ScanContext) -> Result<PhaseOutput> {
        let (dupes, dupe_checks) = Self::dupe_findings(ctx);
        let (boilerplate, boilerplate_checks) = Self::boilerplate_findings(ctx);

        let mut findings = dupes;
        findings.extend(boilerplate);
        let findings = findings
            .into_iter()
            .filter(|f| zone_policy(f.detector, f.zone) != ZonePolicy::Skip)
            .collect();

        Ok(PhaseOutput {
            findings,
            ..PhaseOutput::default()
        }
        .with_potential(DetectorKind::Dupes, dupe_checks)
        .with_potential(DetectorKind::BoilerplateDuplication, boilerplate_checks))
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

    fn src(path: &str, content: &str) -> SourceFile {
        SourceFile {
            path: path.into(),
            abs_path: path.into(),
            zone: Zone::Production,
            lang: "python".into(),
            content: Arc::new(content.into()),
            loc: content.lines().count() as u32,
        }
    }

    fn run_on(files: Vec<SourceFile>) -> PhaseOutput {
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
        DupesPhase.run(&ctx).unwrap()
    }

    fn body(name: &str) -> String {
        format!(
            "def {name}(a, b):\n    total = 0\n    for x in a:\n        if x > b:\n            total += x\n        else:\n            total -= x\n    result = total * 2\n    return result\n"
        )
    }

    #[test]
    fn test_duplicate_functions_cluster_once() {
        let files = vec![
            src("x.py", &body("calc_x")),
            src("y.py", &body("calc_y")),
            src("z.py", "def other():\n    return 1\n"),
        ];
        let output = run_on(files);
        let dupes: Vec<_> = output
            .findings
            .iter()
            .filter(|f| f.detector == DetectorKind::Dupes)
            .collect();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].detail.members.len(), 2);
    }

    #[test]
    fn test_cluster_id_stable_across_runs() {
        let files = || {
            vec![
                src("x.py", &body("calc_x")),
                src("y.py", &body("calc_y")),
            ]
        };
        let a = run_on(files());
        let b = run_on(files());
        let id_a = &a.findings.iter().find(|f| f.detector == DetectorKind::Dupes).unwrap().id;
        let id_b = &b.findings.iter().find(|f| f.detector == DetectorKind::Dupes).unwrap().id;
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn test_mask_line_merges_renamed_copies() {
        assert_eq!(
            mask_line("total = count + 1"),
            mask_line("summed = items + 2")
        );
        assert_ne!(mask_line("return x"), mask_line("raise x"));
    }

    #[test]
    fn test_build_clusters_union_find() {
        let pairs = vec![(0, 1, 0.9), (1, 2, 0.9), (4, 5, 0.9)];
        let clusters = build_clusters(&pairs, 6);
        assert_eq!(clusters.len(), 2);
        let sizes: Vec<usize> = clusters.iter().map(Vec::len).collect();
        assert!(sizes.contains(&3));
        assert!(sizes.contains(&2));
    }
}
