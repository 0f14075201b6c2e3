//! Source discovery.
//!
//! Walks the repository (gitignore-aware), applies config `exclude` globs,
//! classifies each surviving file into a zone, and reads contents up front
//! so detector phases never touch the filesystem. Reads are parallel;
//! the resulting file list is sorted by path for deterministic downstream
//! iteration.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::lang::LanguagePlugin;
use crate::models::normalize_path;
use crate::zones::{Zone, ZoneClassifier};

/// One discovered source file with its classification snapshot.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Repository-relative, forward-slash normalized.
    pub path: String,
    pub abs_path: PathBuf,
    pub zone: Zone,
    pub lang: String,
    pub content: Arc<String>,
    pub loc: u32,
}

impl SourceFile {
    pub fn stem(&self) -> &str {
        let base = self.path.rsplit('/').next().unwrap_or(&self.path);
        base.rsplit_once('.').map_or(base, |(s, _)| s)
    }
}

/// Aggregate stats recorded into state after each scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub files: usize,
    pub loc: usize,
    pub dirs: usize,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("skipping invalid exclude glob '{pattern}': {e}"),
        }
    }
    Ok(builder.build()?)
}

/// Walk `root` and return the plugin's source files, zone-classified, with
/// contents loaded. `exclude` patterns remove files from the scan entirely.
pub fn discover(
    root: &Path,
    config: &Config,
    plugin: &dyn LanguagePlugin,
) -> Result<(Vec<SourceFile>, DiscoveryStats)> {
    let excludes = build_globset(&config.exclude)?;
    let classifier = ZoneClassifier::new(config.zone_override_rules(), plugin.zone_rules());
    let extensions = plugin.extensions();

    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| entry.file_name() != ".codegauge")
        .build();

    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut dirs = 0usize;
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            dirs += 1;
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !extensions.contains(&ext) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        let rel_str = normalize_path(&rel.to_string_lossy());
        if excludes.is_match(&rel_str) {
            debug!("excluded from scan: {rel_str}");
            continue;
        }
        candidates.push(path.to_path_buf());
    }

    let mut files: Vec<SourceFile> = candidates
        .par_iter()
        .filter_map(|abs_path| {
            let content = std::fs::read_to_string(abs_path).ok()?;
            let rel = abs_path.strip_prefix(root).unwrap_or(abs_path);
            let path = normalize_path(&rel.to_string_lossy());
            let loc = content.lines().filter(|l| !l.trim().is_empty()).count() as u32;
            Some(SourceFile {
                zone: classifier.classify(&path),
                lang: plugin.name().to_string(),
                path,
                abs_path: abs_path.clone(),
                content: Arc::new(content),
                loc,
            })
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));

    let stats = DiscoveryStats {
        files: files.len(),
        loc: files.iter().map(|f| f.loc as usize).sum(),
        dirs,
    };
    Ok((files, stats))
}
