//! Zone classification.
//!
//! Every scanned file lands in exactly one zone, and each (detector, zone)
//! pair has a policy: run normally, downgrade the finding one tier, or skip
//! the detector for that file. Generated and Vendor zones are additionally
//! excluded from scoring outright.
//!
//! Resolution order, first match wins:
//! 1. user `zone_overrides` from config
//! 2. language-plugin rules
//! 3. built-in defaults
//! 4. fallback: Production
//!
//! Patterns are neither globs nor regexes: five literal forms, tried in
//! this order per pattern: `/dir/` path substring, `.ext` filename suffix,
//! `prefix_` basename prefix, `_suffix` basename ends-with before the
//! extension, `name.ext` exact basename.

use serde::{Deserialize, Serialize};

use crate::registry::DetectorKind;

/// File classification. Closed set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    #[default]
    Production,
    Test,
    Config,
    Generated,
    Script,
    Vendor,
}

impl Zone {
    /// Zones whose findings never count toward scoring.
    pub fn excluded_from_scoring(self) -> bool {
        matches!(self, Zone::Generated | Zone::Vendor)
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Zone::Production => "production",
            Zone::Test => "test",
            Zone::Config => "config",
            Zone::Generated => "generated",
            Zone::Script => "script",
            Zone::Vendor => "vendor",
        };
        write!(f, "{s}")
    }
}

/// What a detector does with files in a given zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonePolicy {
    Normal,
    /// Emit the finding one tier lower.
    Downgrade,
    Skip,
}

/// One classification rule: a literal pattern mapping to a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRule {
    pub pattern: String,
    pub zone: Zone,
}

impl ZoneRule {
    pub fn new(pattern: impl Into<String>, zone: Zone) -> Self {
        Self {
            pattern: pattern.into(),
            zone,
        }
    }
}

/// Match one literal pattern against a repository-relative path.
///
/// The five forms are tried in spec order; the first applicable form
/// decides. Total: never panics, any pattern/path pair yields a bool.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);

    // "/dir/": substring on the full path (also match a leading segment).
    if pattern.starts_with('/') && pattern.ends_with('/') && pattern.len() > 1 {
        let full = format!("/{path}");
        return full.contains(pattern);
    }
    // ".ext": filename suffix.
    if pattern.starts_with('.') {
        return basename.ends_with(pattern);
    }
    // "prefix_": basename prefix.
    if pattern.ends_with('_') {
        return basename.starts_with(pattern);
    }
    // "_suffix": basename ends with this before the extension.
    if pattern.starts_with('_') {
        let stem = basename.rsplit_once('.').map_or(basename, |(s, _)| s);
        return stem.ends_with(pattern);
    }
    // "name.ext": exact basename.
    basename == pattern
}

/// Built-in default rules, applied after user overrides and plugin rules.
fn default_rules() -> &'static [ZoneRule] {
    use std::sync::OnceLock;
    static RULES: OnceLock<Vec<ZoneRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            // Vendored / third-party code first: it shadows everything else.
            ZoneRule::new("/vendor/", Zone::Vendor),
            ZoneRule::new("/node_modules/", Zone::Vendor),
            ZoneRule::new("/third_party/", Zone::Vendor),
            ZoneRule::new("/bower_components/", Zone::Vendor),
            ZoneRule::new("/generated/", Zone::Generated),
            ZoneRule::new("/__generated__/", Zone::Generated),
            ZoneRule::new("_pb2", Zone::Generated),
            ZoneRule::new(".min.js", Zone::Generated),
            ZoneRule::new(".min.css", Zone::Generated),
            ZoneRule::new("/tests/", Zone::Test),
            ZoneRule::new("/test/", Zone::Test),
            ZoneRule::new("/__tests__/", Zone::Test),
            ZoneRule::new("test_", Zone::Test),
            ZoneRule::new("_test", Zone::Test),
            ZoneRule::new("_spec", Zone::Test),
            ZoneRule::new("conftest.py", Zone::Test),
            ZoneRule::new("/scripts/", Zone::Script),
            ZoneRule::new("/bin/", Zone::Script),
            ZoneRule::new(".toml", Zone::Config),
            ZoneRule::new(".yaml", Zone::Config),
            ZoneRule::new(".yml", Zone::Config),
            ZoneRule::new(".ini", Zone::Config),
            ZoneRule::new(".cfg", Zone::Config),
            ZoneRule::new(".json", Zone::Config),
        ]
    })
}

/// Deterministic, total classifier over ordered rule layers.
pub struct ZoneClassifier {
    user_overrides: Vec<ZoneRule>,
    plugin_rules: Vec<ZoneRule>,
}

impl ZoneClassifier {
    pub fn new(user_overrides: Vec<ZoneRule>, plugin_rules: Vec<ZoneRule>) -> Self {
        Self {
            user_overrides,
            plugin_rules,
        }
    }

    /// Classify a repository-relative, forward-slash path.
    pub fn classify(&self, path: &str) -> Zone {
        for rule in &self.user_overrides {
            if pattern_matches(&rule.pattern, path) {
                return rule.zone;
            }
        }
        for rule in self.plugin_rules.iter().chain(default_rules()) {
            if pattern_matches(&rule.pattern, path) {
                return rule.zone;
            }
        }
        Zone::Production
    }
}

/// Policy for a detector in a zone.
///
/// Grounded in per-zone skip sets: test code tolerates duplication and
/// security-pattern noise, config files are not subject to structure
/// analysis, scripts may be orphaned by design. Generated and Vendor skip
/// every detector.
pub fn zone_policy(detector: DetectorKind, zone: Zone) -> ZonePolicy {
    use DetectorKind::*;
    match zone {
        Zone::Generated | Zone::Vendor => ZonePolicy::Skip,
        Zone::Production => ZonePolicy::Normal,
        Zone::Test => match detector {
            BoilerplateDuplication | Dupes | Orphaned | Coupling | TestCoverage | Security => {
                ZonePolicy::Skip
            }
            Large | Complexity => ZonePolicy::Downgrade,
            _ => ZonePolicy::Normal,
        },
        Zone::Config => match detector {
            BoilerplateDuplication | Smells | GodClass | Dupes | Orphaned | Coupling
            | TestCoverage | Security | Complexity => ZonePolicy::Skip,
            _ => ZonePolicy::Normal,
        },
        Zone::Script => match detector {
            Coupling | Orphaned => ZonePolicy::Skip,
            Large | Complexity => ZonePolicy::Downgrade,
            _ => ZonePolicy::Normal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_dir_substring() {
        assert!(pattern_matches("/tests/", "src/tests/test_app.py"));
        assert!(pattern_matches("/tests/", "tests/test_app.py"));
        assert!(!pattern_matches("/tests/", "src/main.py"));
    }

    #[test]
    fn test_pattern_ext_suffix() {
        assert!(pattern_matches(".min.js", "dist/app.min.js"));
        assert!(!pattern_matches(".min.js", "src/app.js"));
    }

    #[test]
    fn test_pattern_basename_prefix() {
        assert!(pattern_matches("test_", "pkg/test_scanner.py"));
        assert!(!pattern_matches("test_", "pkg/scanner_test.py"));
    }

    #[test]
    fn test_pattern_stem_suffix() {
        assert!(pattern_matches("_test", "pkg/scanner_test.go"));
        assert!(pattern_matches("_spec", "src/app_spec.ts"));
        assert!(!pattern_matches("_test", "pkg/test_scanner.go"));
    }

    #[test]
    fn test_pattern_exact_basename() {
        assert!(pattern_matches("conftest.py", "deep/dir/conftest.py"));
        assert!(!pattern_matches("conftest.py", "deep/dir/myconftest.py"));
    }

    #[test]
    fn test_classifier_layer_order() {
        // User override wins over the default test rule.
        let classifier = ZoneClassifier::new(
            vec![ZoneRule::new("/tests/", Zone::Production)],
            vec![],
        );
        assert_eq!(classifier.classify("src/tests/util.py"), Zone::Production);
    }

    #[test]
    fn test_classifier_defaults_and_fallback() {
        let classifier = ZoneClassifier::new(vec![], vec![]);
        assert_eq!(classifier.classify("vendor/lib.js"), Zone::Vendor);
        assert_eq!(classifier.classify("tests/test_x.py"), Zone::Test);
        assert_eq!(classifier.classify("scripts/deploy.py"), Zone::Script);
        assert_eq!(classifier.classify("settings.toml"), Zone::Config);
        assert_eq!(classifier.classify("src/core/engine.py"), Zone::Production);
    }

    #[test]
    fn test_zone_policy_generated_skips_everything() {
        for kind in DetectorKind::ALL {
            assert_eq!(zone_policy(kind, Zone::Generated), ZonePolicy::Skip);
            assert_eq!(zone_policy(kind, Zone::Vendor), ZonePolicy::Skip);
        }
    }

    #[test]
    fn test_zone_policy_test_zone() {
        assert_eq!(
            zone_policy(DetectorKind::Security, Zone::Test),
            ZonePolicy::Skip
        );
        assert_eq!(
            zone_policy(DetectorKind::Large, Zone::Test),
            ZonePolicy::Downgrade
        );
        assert_eq!(
            zone_policy(DetectorKind::Smells, Zone::Test),
            ZonePolicy::Normal
        );
    }
}
