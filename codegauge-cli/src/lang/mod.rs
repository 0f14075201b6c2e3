//! Language plugin contract.
//!
//! The core is language-agnostic: everything it needs from a language lives
//! behind `LanguagePlugin`. Plugins here use lightweight regex/line-scan
//! extraction rather than full AST parsing: good enough for structural
//! metrics, orders of magnitude cheaper, and with no native parser
//! dependencies.

pub mod python;
pub mod typescript;

use rustc_hash::FxHashMap;

use crate::discovery::SourceFile;
use crate::graph::ImportEdge;
use crate::zones::ZoneRule;

/// A function extracted by the plugin's lightweight parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub params: u32,
    pub complexity: u32,
    pub max_nesting: u32,
}

impl FunctionInfo {
    pub fn loc(&self) -> u32 {
        self.line_end.saturating_sub(self.line_start) + 1
    }
}

/// A class extracted by the plugin's lightweight parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub methods: Vec<String>,
}

/// A runnable fixer the plugin knows how to invoke for a fixer name
/// declared in the detector registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixerConfig {
    pub name: &'static str,
    /// Argv to run from the repository root.
    pub command: &'static [&'static str],
}

/// What the core consumes from a language.
///
/// Defaults keep test stubs small: a plugin only has to provide a name,
/// its extensions, and an import resolver to participate in a scan.
pub trait LanguagePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// File extensions (without dot) this plugin claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Marker files whose presence selects this plugin for a repository.
    fn detect_markers(&self) -> &'static [&'static str] {
        &[]
    }

    /// Zone rules checked after user overrides, before defaults.
    fn zone_rules(&self) -> Vec<ZoneRule> {
        Vec::new()
    }

    /// Large-file threshold in non-blank lines.
    fn large_threshold(&self) -> u32 {
        500
    }

    /// Cyclomatic complexity threshold per function.
    fn complexity_threshold(&self) -> u32 {
        10
    }

    /// Patterns (zone-classifier literal forms) naming entry-point files
    /// that are exempt from orphan detection.
    fn entry_patterns(&self) -> &'static [&'static str] {
        &[]
    }

    /// External linter binary this language binds to, if any.
    fn lint_tool(&self) -> Option<&'static str> {
        None
    }

    /// Resolve a file's imports to repository-relative paths. `index` maps
    /// every scanned path to its node id; plugins use it to test candidate
    /// resolutions for existence.
    fn resolve_imports(&self, file: &SourceFile, index: &FxHashMap<String, u32>)
        -> Vec<ImportEdge>;

    /// Lightweight function extraction. Optional: an empty result disables
    /// complexity, god-class, and duplicate detection for this language.
    fn extract_functions(&self, _file: &SourceFile) -> Vec<FunctionInfo> {
        Vec::new()
    }

    /// Lightweight class extraction.
    fn extract_classes(&self, _file: &SourceFile) -> Vec<ClassInfo> {
        Vec::new()
    }

    /// Fixers this language can run, looked up by registry fixer name.
    fn fixers(&self) -> &'static [FixerConfig] {
        &[]
    }

    /// Resolve a registry fixer name to something runnable.
    fn fixer(&self, name: &str) -> Option<FixerConfig> {
        self.fixers().iter().copied().find(|f| f.name == name)
    }
}

/// Pick a plugin for the repository by marker files, defaulting to Python.
pub fn detect_plugin(root: &std::path::Path) -> Box<dyn LanguagePlugin> {
    let ts = typescript::TypeScriptPlugin::new();
    for marker in ts.detect_markers() {
        if root.join(marker).exists() {
            return Box::new(ts);
        }
    }
    Box::new(python::PythonPlugin::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_info_loc() {
        let f = FunctionInfo {
            name: "f".into(),
            line_start: 10,
            line_end: 14,
            params: 0,
            complexity: 1,
            max_nesting: 0,
        };
        assert_eq!(f.loc(), 5);
    }
}
