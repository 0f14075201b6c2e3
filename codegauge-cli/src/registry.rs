//! Compile-time detector registry.
//!
//! Every detector the pipeline can run is a variant of `DetectorKind`, with
//! its metadata in a single const table: scoring dimension, queue action,
//! tool binding, noise budget, and the structural / judgment flags. Lookup
//! is O(1) and infallible for known kinds; an unknown detector name in a
//! persisted state file is a hard error: state never contains orphan
//! findings.

use serde::{Deserialize, Serialize};

use crate::models::Tier;

/// Mechanical scoring dimension. Each detector maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    FileHealth,
    CodeQuality,
    Duplication,
    TestHealth,
    Security,
}

impl Dimension {
    /// Configured weight in the mechanical pool.
    pub fn weight(self) -> f64 {
        match self {
            Dimension::FileHealth => 2.0,
            Dimension::CodeQuality => 1.0,
            Dimension::Duplication => 1.0,
            Dimension::TestHealth => 1.0,
            Dimension::Security => 1.0,
        }
    }

    pub fn all() -> [Dimension; 5] {
        [
            Dimension::FileHealth,
            Dimension::CodeQuality,
            Dimension::Duplication,
            Dimension::TestHealth,
            Dimension::Security,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::FileHealth => "file_health",
            Dimension::CodeQuality => "code_quality",
            Dimension::Duplication => "duplication",
            Dimension::TestHealth => "test_health",
            Dimension::Security => "security",
        }
    }
}

/// What acting on a finding of this detector looks like. Drives cluster
/// action priority in the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AutoFix,
    Reorganize,
    Refactor,
    ManualFix,
    DebtReview,
}

impl ActionKind {
    /// Queue priority: lower sorts first.
    pub fn priority(self) -> u8 {
        match self {
            ActionKind::AutoFix => 0,
            ActionKind::Reorganize => 1,
            ActionKind::Refactor => 2,
            ActionKind::ManualFix => 3,
            ActionKind::DebtReview => 4,
        }
    }
}

/// Identity of a detector. Serialized by registry name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Oversized files.
    Large,
    /// Cyclomatic complexity over the language threshold.
    Complexity,
    /// Classes with too many methods / responsibilities.
    GodClass,
    /// AST-level smells (broad except, mutable default, deep nesting...).
    Smells,
    /// Imports never referenced.
    UnusedImports,
    /// External linter adapter findings.
    Lint,
    /// Security pattern hits (line-scoped).
    Security,
    /// Architectural coupling violations.
    Coupling,
    /// Import cycles (one finding per SCC of size >= 2).
    Cycles,
    /// Files nothing imports and no entry pattern claims.
    Orphaned,
    /// Near-duplicate code blocks (cross-file clusters).
    Dupes,
    /// Repeated boilerplate scaffolding.
    BoilerplateDuplication,
    /// Source files with no corresponding test.
    TestCoverage,
    /// Mechanical findings aging without a subjective review pass.
    ReviewCoverage,
    /// Repo-wide findings imported from holistic review.
    Holistic,
}

/// Static metadata for one detector.
pub struct DetectorMeta {
    pub name: &'static str,
    pub label: &'static str,
    pub dimension: Dimension,
    pub action: ActionKind,
    pub default_tier: Tier,
    /// Fixer names runnable against findings of this detector.
    pub fixers: &'static [&'static str],
    /// External tool this detector is bound to, if any. When the tool is
    /// missing the phase is skipped and prior findings are NOT auto-resolved.
    pub tool: Option<&'static str>,
    /// Structural detectors feed per-file signals to the concern synthesizer.
    pub structural: bool,
    /// Judgment detectors produce findings a human should weigh, not just fix.
    pub needs_judgment: bool,
    /// File-based detectors get per-file weight caps in scoring.
    pub file_based: bool,
    /// Repo-wide findings: uncapped, display-multiplied in the queue.
    pub holistic: bool,
    /// Default per-scan cap on new findings before the noise budget kicks in.
    pub noise_budget: usize,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 15] = [
        DetectorKind::Large,
        DetectorKind::Complexity,
        DetectorKind::GodClass,
        DetectorKind::Smells,
        DetectorKind::UnusedImports,
        DetectorKind::Lint,
        DetectorKind::Security,
        DetectorKind::Coupling,
        DetectorKind::Cycles,
        DetectorKind::Orphaned,
        DetectorKind::Dupes,
        DetectorKind::BoilerplateDuplication,
        DetectorKind::TestCoverage,
        DetectorKind::ReviewCoverage,
        DetectorKind::Holistic,
    ];

    /// Registry metadata. Single-sourced; every other table derives from this.
    pub const fn meta(self) -> &'static DetectorMeta {
        match self {
            DetectorKind::Large => &DetectorMeta {
                name: "large",
                label: "Large files",
                dimension: Dimension::FileHealth,
                action: ActionKind::Reorganize,
                default_tier: Tier::MajorRefactor,
                fixers: &[],
                tool: None,
                structural: true,
                needs_judgment: true,
                file_based: true,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Complexity => &DetectorMeta {
                name: "complexity",
                label: "Complexity",
                dimension: Dimension::FileHealth,
                action: ActionKind::Refactor,
                default_tier: Tier::Judgment,
                fixers: &[],
                tool: None,
                structural: true,
                needs_judgment: true,
                file_based: true,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::GodClass => &DetectorMeta {
                name: "god_class",
                label: "God classes",
                dimension: Dimension::FileHealth,
                action: ActionKind::Refactor,
                default_tier: Tier::MajorRefactor,
                fixers: &[],
                tool: None,
                structural: true,
                needs_judgment: true,
                file_based: true,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Smells => &DetectorMeta {
                name: "smells",
                label: "Code smells",
                dimension: Dimension::CodeQuality,
                action: ActionKind::ManualFix,
                default_tier: Tier::QuickFix,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: false,
                file_based: true,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::UnusedImports => &DetectorMeta {
                name: "unused_imports",
                label: "Unused imports",
                dimension: Dimension::CodeQuality,
                action: ActionKind::AutoFix,
                default_tier: Tier::AutoFix,
                fixers: &["strip_unused_imports"],
                tool: None,
                structural: false,
                needs_judgment: false,
                file_based: true,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Lint => &DetectorMeta {
                name: "lint",
                label: "Linter",
                dimension: Dimension::CodeQuality,
                action: ActionKind::AutoFix,
                default_tier: Tier::QuickFix,
                fixers: &["lint_autofix"],
                tool: Some("lint"),
                structural: false,
                needs_judgment: false,
                file_based: true,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Security => &DetectorMeta {
                name: "security",
                label: "Security patterns",
                dimension: Dimension::Security,
                action: ActionKind::ManualFix,
                default_tier: Tier::Judgment,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: false,
                file_based: true,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Coupling => &DetectorMeta {
                name: "coupling",
                label: "Coupling violations",
                dimension: Dimension::CodeQuality,
                action: ActionKind::Reorganize,
                default_tier: Tier::Judgment,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: true,
                file_based: false,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Cycles => &DetectorMeta {
                name: "cycles",
                label: "Import cycles",
                dimension: Dimension::CodeQuality,
                action: ActionKind::Refactor,
                default_tier: Tier::MajorRefactor,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: true,
                file_based: false,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Orphaned => &DetectorMeta {
                name: "orphaned",
                label: "Orphaned files",
                dimension: Dimension::CodeQuality,
                action: ActionKind::Reorganize,
                default_tier: Tier::QuickFix,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: true,
                file_based: false,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Dupes => &DetectorMeta {
                name: "dupes",
                label: "Duplicate code",
                dimension: Dimension::Duplication,
                action: ActionKind::Refactor,
                default_tier: Tier::Judgment,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: true,
                file_based: false,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::BoilerplateDuplication => &DetectorMeta {
                name: "boilerplate_duplication",
                label: "Boilerplate duplication",
                dimension: Dimension::Duplication,
                action: ActionKind::Refactor,
                default_tier: Tier::Judgment,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: true,
                file_based: false,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::TestCoverage => &DetectorMeta {
                name: "test_coverage",
                label: "Test coverage",
                dimension: Dimension::TestHealth,
                action: ActionKind::ManualFix,
                default_tier: Tier::Judgment,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: false,
                file_based: true,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::ReviewCoverage => &DetectorMeta {
                name: "review_coverage",
                label: "Review freshness",
                dimension: Dimension::CodeQuality,
                action: ActionKind::DebtReview,
                default_tier: Tier::Judgment,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: true,
                file_based: false,
                holistic: false,
                noise_budget: 10,
            },
            DetectorKind::Holistic => &DetectorMeta {
                name: "holistic",
                label: "Holistic review",
                dimension: Dimension::CodeQuality,
                action: ActionKind::DebtReview,
                default_tier: Tier::MajorRefactor,
                fixers: &[],
                tool: None,
                structural: false,
                needs_judgment: true,
                file_based: false,
                holistic: true,
                noise_budget: 10,
            },
        }
    }

    pub fn name(self) -> &'static str {
        self.meta().name
    }

    pub fn dimension(self) -> Dimension {
        self.meta().dimension
    }

    /// Parse a registry name. `None` means the name is unknown: callers in
    /// the state-load path treat that as fatal.
    pub fn parse(name: &str) -> Option<DetectorKind> {
        DetectorKind::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Detectors whose findings a human should weigh before acting.
    pub fn judgment_detectors() -> impl Iterator<Item = DetectorKind> {
        DetectorKind::ALL.into_iter().filter(|k| k.meta().needs_judgment)
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl DetectorKind {
    pub fn default_tier(self) -> Tier {
        self.meta().default_tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_every_kind() {
        for kind in DetectorKind::ALL {
            assert_eq!(DetectorKind::parse(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(DetectorKind::parse("no_such_detector"), None);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = DetectorKind::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), DetectorKind::ALL.len());
    }

    #[test]
    fn test_serde_uses_registry_name() {
        let json = serde_json::to_string(&DetectorKind::GodClass).unwrap();
        assert_eq!(json, "\"god_class\"");
        let back: DetectorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DetectorKind::GodClass);
    }

    #[test]
    fn test_dimension_weights() {
        assert_eq!(Dimension::FileHealth.weight(), 2.0);
        for dim in [
            Dimension::CodeQuality,
            Dimension::Duplication,
            Dimension::TestHealth,
            Dimension::Security,
        ] {
            assert_eq!(dim.weight(), 1.0);
        }
    }

    #[test]
    fn test_action_priorities_ordered() {
        assert!(ActionKind::AutoFix.priority() < ActionKind::Reorganize.priority());
        assert!(ActionKind::ManualFix.priority() < ActionKind::DebtReview.priority());
    }
}
