//! Project configuration.
//!
//! Loaded from `.codegauge/config.toml` in the scanned repository. The
//! loader is lenient about unknown top-level keys: forward schema drift
//! produces a warning, not a failure: but hard-fails on TOML that does not
//! parse at all.

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::errors::FatalError;
use crate::zones::{Zone, ZoneRule};

/// Recognized configuration, all keys optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Strict-score target; also the integrity guard's anchoring band center.
    pub target_strict_score: u32,
    /// Age in days before a file review is stale.
    pub review_max_age_days: u32,
    /// Age in days before the holistic review is stale.
    pub holistic_max_age_days: u32,
    /// Glob patterns removed from the scan entirely.
    pub exclude: Vec<String>,
    /// Glob patterns whose findings are suppressed (kept in state, unscored).
    pub ignore: Vec<String>,
    /// Path/pattern -> zone, checked before plugin and default rules.
    pub zone_overrides: BTreeMap<String, Zone>,
    /// Override of the language plugin's large-file threshold. 0 = plugin default.
    pub large_files_threshold: u32,
    /// Per-detector cap on new findings per scan.
    pub finding_noise_budget: usize,
    /// Global cap across detectors; 0 = unlimited.
    pub finding_noise_global_budget: usize,
    /// Per-language overrides.
    pub languages: BTreeMap<String, LangOverrides>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_strict_score: 95,
            review_max_age_days: 30,
            holistic_max_age_days: 30,
            exclude: Vec::new(),
            ignore: Vec::new(),
            zone_overrides: BTreeMap::new(),
            large_files_threshold: 0,
            finding_noise_budget: 10,
            finding_noise_global_budget: 0,
            languages: BTreeMap::new(),
        }
    }
}

/// Per-language threshold overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LangOverrides {
    pub large_threshold: Option<u32>,
    pub complexity_threshold: Option<u32>,
}

impl Config {
    /// Load from `.codegauge/config.toml` under `repo_root`. A missing file
    /// yields defaults; an unparseable file is fatal.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(".codegauge").join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Self::parse(&raw).map_err(|detail| {
            FatalError::ConfigParse {
                path: path.clone(),
                detail,
            }
            .into()
        })
    }

    /// Parse config text, warning on unrecognized top-level keys.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let table: toml::Table = raw.parse().map_err(|e: toml::de::Error| e.to_string())?;

        const KNOWN: &[&str] = &[
            "target_strict_score",
            "review_max_age_days",
            "holistic_max_age_days",
            "exclude",
            "ignore",
            "zone_overrides",
            "large_files_threshold",
            "finding_noise_budget",
            "finding_noise_global_budget",
            "languages",
        ];
        let mut recognized = toml::Table::new();
        for (key, value) in table {
            if KNOWN.contains(&key.as_str()) {
                recognized.insert(key, value);
            } else {
                warn!("ignoring unknown config key '{key}'");
            }
        }
        recognized.try_into().map_err(|e: toml::de::Error| e.to_string())
    }

    /// User zone overrides as ordered rules (BTreeMap keeps them stable).
    pub fn zone_override_rules(&self) -> Vec<ZoneRule> {
        self.zone_overrides
            .iter()
            .map(|(pattern, zone)| ZoneRule::new(pattern.clone(), *zone))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target_strict_score, 95);
        assert_eq!(config.review_max_age_days, 30);
        assert_eq!(config.finding_noise_budget, 10);
        assert_eq!(config.finding_noise_global_budget, 0);
    }

    #[test]
    fn test_parse_recognized_keys() {
        let config = Config::parse(
            r#"
            target_strict_score = 90
            exclude = ["generated/**"]
            ignore = ["legacy/**"]

            [zone_overrides]
            "/fixtures/" = "test"

            [languages.python]
            large_threshold = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.target_strict_score, 90);
        assert_eq!(config.exclude, vec!["generated/**"]);
        assert_eq!(config.zone_overrides.get("/fixtures/"), Some(&Zone::Test));
        assert_eq!(
            config.languages.get("python").unwrap().large_threshold,
            Some(600)
        );
    }

    #[test]
    fn test_parse_ignores_unknown_keys() {
        let config = Config::parse("future_option = true\ntarget_strict_score = 80\n").unwrap();
        assert_eq!(config.target_strict_score, 80);
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(Config::parse("not [ valid").is_err());
    }
}
