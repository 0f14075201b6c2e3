//! Python language plugin.
//!
//! Import resolution understands `import a.b` and `from a.b import c`
//! (including relative `from . import x` forms), mapping dotted modules to
//! `a/b.py` or `a/b/__init__.py` within the scanned file set. Imports under
//! `if TYPE_CHECKING:` and imports nested inside function bodies are tagged
//! deferred: they cannot participate in import-time cycles.

use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

use crate::discovery::SourceFile;
use crate::graph::ImportEdge;
use crate::lang::{ClassInfo, FunctionInfo, LanguagePlugin};
use crate::zones::{Zone, ZoneRule};

pub struct PythonPlugin;

impl PythonPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)(?:from\s+([.\w]+)\s+import|import\s+([\w.]+))").unwrap()
    })
}

fn def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*)(?:async\s+)?def\s+(\w+)\s*\(([^)]*)").unwrap())
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^class\s+(\w+)").unwrap())
}

/// Map a dotted module to a scanned file, trying `mod.py` then
/// `mod/__init__.py`, walking up from the importer's package for relative
/// and sibling imports.
fn resolve_module(
    module: &str,
    importer: &str,
    index: &FxHashMap<String, u32>,
) -> Option<String> {
    let importer_dir = importer.rsplit_once('/').map(|(d, _)| d).unwrap_or("");

    // Relative import: strip leading dots, each extra dot walks up one level.
    let (module, mut base) = if let Some(stripped) = module.strip_prefix('.') {
        let ups = stripped.chars().take_while(|&c| c == '.').count();
        let mut dir = importer_dir;
        for _ in 0..ups {
            dir = dir.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        }
        (stripped.trim_start_matches('.'), dir.to_string())
    } else {
        (module, String::new())
    };

    let rel = module.replace('.', "/");
    loop {
        let prefix = if base.is_empty() {
            String::new()
        } else {
            format!("{base}/")
        };
        let candidates = if rel.is_empty() {
            vec![format!("{prefix}__init__.py")]
        } else {
            vec![
                format!("{prefix}{rel}.py"),
                format!("{prefix}{rel}/__init__.py"),
            ]
        };
        for candidate in candidates {
            if index.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        // Absolute imports may still be rooted at the importer's package.
        if base.is_empty() {
            if importer_dir.is_empty() {
                return None;
            }
            base = importer_dir.to_string();
        } else {
            return None;
        }
    }
}

fn indent_width(s: &str) -> u32 {
    s.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn count_params(sig: &str) -> u32 {
    let mut depth = 0u32;
    let mut count = 0u32;
    let mut has_content = false;
    for c in sig.chars() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => count += 1,
            c if !c.is_whitespace() => has_content = true,
            _ => {}
        }
    }
    if !has_content {
        return 0;
    }
    let total = count + 1;
    // `self` / `cls` do not count as real parameters.
    let first = sig.split(',').next().unwrap_or("").trim();
    if first == "self" || first == "cls" {
        total - 1
    } else {
        total
    }
}

const BRANCH_STARTERS: &[&str] = &["if ", "elif ", "for ", "while ", "except", "case "];
const BRANCH_INFIXES: &[&str] = &[" and ", " or "];

fn line_complexity(line: &str) -> u32 {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return 0;
    }
    let starters = BRANCH_STARTERS
        .iter()
        .filter(|kw| trimmed.starts_with(*kw))
        .count();
    let infixes = BRANCH_INFIXES
        .iter()
        .filter(|kw| trimmed.contains(*kw))
        .count();
    (starters + infixes) as u32
}

impl LanguagePlugin for PythonPlugin {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn detect_markers(&self) -> &'static [&'static str] {
        &["pyproject.toml", "setup.py", "requirements.txt"]
    }

    fn zone_rules(&self) -> Vec<ZoneRule> {
        vec![
            ZoneRule::new("/migrations/", Zone::Generated),
            ZoneRule::new("setup.py", Zone::Script),
            ZoneRule::new("conftest.py", Zone::Test),
        ]
    }

    fn large_threshold(&self) -> u32 {
        500
    }

    fn complexity_threshold(&self) -> u32 {
        10
    }

    fn entry_patterns(&self) -> &'static [&'static str] {
        &["__main__.py", "__init__.py", "main.py", "cli.py", "manage.py", "setup.py"]
    }

    fn lint_tool(&self) -> Option<&'static str> {
        Some("ruff")
    }

    fn fixers(&self) -> &'static [crate::lang::FixerConfig] {
        &[
            crate::lang::FixerConfig {
                name: "strip_unused_imports",
                command: &["ruff", "check", "--fix", "--select", "F401", "."],
            },
            crate::lang::FixerConfig {
                name: "lint_autofix",
                command: &["ruff", "check", "--fix", "."],
            },
        ]
    }

    fn resolve_imports(
        &self,
        file: &SourceFile,
        index: &FxHashMap<String, u32>,
    ) -> Vec<ImportEdge> {
        let mut edges = Vec::new();
        let mut type_checking_indent: Option<u32> = None;

        for line in file.content.lines() {
            let indent = indent_width(line);
            let trimmed = line.trim_start();

            if let Some(block_indent) = type_checking_indent {
                if !trimmed.is_empty() && indent <= block_indent {
                    type_checking_indent = None;
                }
            }
            if trimmed.starts_with("if TYPE_CHECKING") {
                type_checking_indent = Some(indent);
                continue;
            }

            let Some(caps) = import_re().captures(line) else {
                continue;
            };
            let module = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or("");
            if module.is_empty() {
                continue;
            }
            // Indented imports are function-local: lazy by construction.
            let deferred = type_checking_indent.is_some() || indent > 0;
            if let Some(target) = resolve_module(module, &file.path, index) {
                if target != file.path {
                    edges.push(ImportEdge { target, deferred });
                }
            }
        }
        edges
    }

    fn extract_functions(&self, file: &SourceFile) -> Vec<FunctionInfo> {
        let lines: Vec<&str> = file.content.lines().collect();
        let mut functions = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = def_re().captures(line) else {
                continue;
            };
            let base_indent = indent_width(&caps[1]);
            let name = caps[2].to_string();
            let params = count_params(&caps[3]);

            // Body runs until the next non-blank line at or below base indent.
            let mut end = i;
            let mut complexity = 1u32;
            let mut max_nesting = 0u32;
            for (j, body_line) in lines.iter().enumerate().skip(i + 1) {
                let trimmed = body_line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let indent = indent_width(body_line);
                if indent <= base_indent {
                    break;
                }
                end = j;
                complexity += line_complexity(body_line);
                let depth = (indent - base_indent) / 4;
                max_nesting = max_nesting.max(depth.saturating_sub(1));
            }

            functions.push(FunctionInfo {
                name,
                line_start: (i + 1) as u32,
                line_end: (end + 1) as u32,
                params,
                complexity,
                max_nesting,
            });
        }
        functions
    }

    fn extract_classes(&self, file: &SourceFile) -> Vec<ClassInfo> {
        let lines: Vec<&str> = file.content.lines().collect();
        let mut classes = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = class_re().captures(line) else {
                continue;
            };
            let name = caps[1].to_string();
            let mut end = i;
            let mut methods = Vec::new();
            for (j, body_line) in lines.iter().enumerate().skip(i + 1) {
                let trimmed = body_line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if indent_width(body_line) == 0 {
                    break;
                }
                end = j;
                if let Some(m) = def_re().captures(body_line) {
                    if indent_width(&m[1]) == 4 {
                        methods.push(m[2].to_string());
                    }
                }
            }
            classes.push(ClassInfo {
                name,
                line_start: (i + 1) as u32,
                line_end: (end + 1) as u32,
                methods,
            });
        }
        classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::Zone;
    use std::sync::Arc;

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

    fn index_of(paths: &[&str]) -> FxHashMap<String, u32> {
        paths
            .iter()
            .enumerate()
            .map(|(i, p)| (p.to_string(), i as u32))
            .collect()
    }

    #[test]
    fn test_resolve_absolute_and_package_imports() {
        let plugin = PythonPlugin::new();
        let index = index_of(&["pkg/a.py", "pkg/b.py", "pkg/sub/__init__.py"]);
        let file = src("pkg/a.py", "import pkg.b\nfrom pkg.sub import thing\n");
        let edges = plugin.resolve_imports(&file, &index);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].target, "pkg/b.py");
        assert_eq!(edges[1].target, "pkg/sub/__init__.py");
        assert!(!edges[0].deferred);
    }

    #[test]
    fn test_resolve_relative_import() {
        let plugin = PythonPlugin::new();
        let index = index_of(&["pkg/a.py", "pkg/b.py"]);
        let file = src("pkg/a.py", "from . import b\nfrom .b import thing\n");
        let edges = plugin.resolve_imports(&file, &index);
        // `from . import b` resolves the package; `.b` resolves the module.
        assert!(edges.iter().any(|e| e.target == "pkg/b.py"));
    }

    #[test]
    fn test_type_checking_imports_deferred() {
        let plugin = PythonPlugin::new();
        let index = index_of(&["a.py", "b.py"]);
        let file = src(
            "a.py",
            "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    import b\n",
        );
        let edges = plugin.resolve_imports(&file, &index);
        assert_eq!(edges.len(), 1);
        assert!(edges[0].deferred);
    }

    #[test]
    fn test_function_local_import_deferred() {
        let plugin = PythonPlugin::new();
        let index = index_of(&["a.py", "b.py"]);
        let file = src("a.py", "def f():\n    import b\n");
        let edges = plugin.resolve_imports(&file, &index);
        assert_eq!(edges.len(), 1);
        assert!(edges[0].deferred);
    }

    #[test]
    fn test_extract_functions_metrics() {
        let plugin = PythonPlugin::new();
        let file = src(
            "a.py",
            "def f(a, b, c):\n    if a:\n        for x in b:\n            pass\n    return c\n",
        );
        let funcs = plugin.extract_functions(&file);
        assert_eq!(funcs.len(), 1);
        let f = &funcs[0];
        assert_eq!(f.name, "f");
        assert_eq!(f.params, 3);
        assert_eq!(f.line_start, 1);
        assert_eq!(f.line_end, 5);
        assert_eq!(f.complexity, 3); // base + if + for
        assert_eq!(f.max_nesting, 2);
    }

    #[test]
    fn test_count_params_skips_self() {
        assert_eq!(count_params("self, a, b"), 2);
        assert_eq!(count_params(""), 0);
        assert_eq!(count_params("a, b=[1, 2], c"), 3);
    }

    #[test]
    fn test_extract_classes_with_methods() {
        let plugin = PythonPlugin::new();
        let file = src(
            "a.py",
            "class Widget:\n    def render(self):\n        pass\n\n    def hide(self):\n        pass\n",
        );
        let classes = plugin.extract_classes(&file);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Widget");
        assert_eq!(classes[0].methods, vec!["render", "hide"]);
    }
}
