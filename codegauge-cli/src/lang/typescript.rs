//! TypeScript / JavaScript language plugin.
//!
//! Import resolution covers `import ... from '...'`, `export ... from`,
//! `require('...')`, and dynamic `import('...')`. Type-only imports and
//! dynamic imports are deferred: erased or lazy at runtime, so they cannot
//! form import-time cycles. Relative specifiers resolve against the scanned
//! file set with the usual extension and `/index` fallbacks.

use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

use crate::discovery::SourceFile;
use crate::graph::ImportEdge;
use crate::lang::{ClassInfo, FunctionInfo, LanguagePlugin};
use crate::zones::{Zone, ZoneRule};

pub struct TypeScriptPlugin;

impl TypeScriptPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TypeScriptPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?:import|export)\s+(type\s+)?(?:[\w*{},\s$]+\s+from\s+)?['"]([^'"]+)['"]|require\(\s*['"]([^'"]+)['"]\s*\)|import\(\s*['"]([^'"]+)['"]\s*\)"#,
        )
        .unwrap()
    })
}

fn function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\s*)(?:export\s+)?(?:async\s+)?function\s+(\w+)\s*\(([^)]*)|^(\s*)(?:export\s+)?const\s+(\w+)\s*=\s*(?:async\s+)?\(([^)]*)\)\s*(?::[^=]+)?=>",
        )
        .unwrap()
    })
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:export\s+)?(?:abstract\s+)?class\s+(\w+)").unwrap())
}

fn method_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s{2,4}(?:async\s+)?(?:public\s+|private\s+|protected\s+)?(\w+)\s*\([^)]*\)\s*[:{]",
        )
        .unwrap()
    })
}

/// Resolve a relative specifier against the scanned file set.
fn resolve_specifier(
    spec: &str,
    importer: &str,
    index: &FxHashMap<String, u32>,
) -> Option<String> {
    if !spec.starts_with('.') {
        return None; // bare specifier: external package
    }
    let importer_dir = importer.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
    let mut segments: Vec<&str> = if importer_dir.is_empty() {
        Vec::new()
    } else {
        importer_dir.split('/').collect()
    };
    for part in spec.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");

    const EXTS: &[&str] = &["ts", "tsx", "js", "jsx"];
    if index.contains_key(&joined) {
        return Some(joined);
    }
    for ext in EXTS {
        let candidate = format!("{joined}.{ext}");
        if index.contains_key(&candidate) {
            return Some(candidate);
        }
    }
    for ext in EXTS {
        let candidate = format!("{joined}/index.{ext}");
        if index.contains_key(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn brace_depth_delta(line: &str) -> i32 {
    let mut delta = 0;
    for c in line.chars() {
        match c {
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

const BRANCH_TOKENS: &[&str] = &["if (", "if(", "for (", "for(", "while (", "while(", "case ", "catch", " && ", " || ", " ? "];

fn line_complexity(line: &str) -> u32 {
    let trimmed = line.trim_start();
    if trimmed.starts_with("//") || trimmed.starts_with('*') {
        return 0;
    }
    BRANCH_TOKENS.iter().filter(|t| trimmed.contains(*t)).count() as u32
}

fn count_params(sig: &str) -> u32 {
    let mut depth = 0u32;
    let mut count = 0u32;
    let mut has_content = false;
    for c in sig.chars() {
        match c {
            '[' | '(' | '{' | '<' => depth += 1,
            ']' | ')' | '}' | '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => count += 1,
            c if !c.is_whitespace() => has_content = true,
            _ => {}
        }
    }
    if has_content {
        count + 1
    } else {
        0
    }
}

impl LanguagePlugin for TypeScriptPlugin {
    fn name(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx"]
    }

    fn detect_markers(&self) -> &'static [&'static str] {
        &["tsconfig.json", "package.json"]
    }

    fn zone_rules(&self) -> Vec<ZoneRule> {
        vec![
            ZoneRule::new("/dist/", Zone::Generated),
            ZoneRule::new("/build/", Zone::Generated),
            ZoneRule::new(".d.ts", Zone::Generated),
            ZoneRule::new(".spec.ts", Zone::Test),
            ZoneRule::new(".spec.tsx", Zone::Test),
            ZoneRule::new(".test.ts", Zone::Test),
            ZoneRule::new(".test.tsx", Zone::Test),
            ZoneRule::new(".spec.js", Zone::Test),
            ZoneRule::new(".test.js", Zone::Test),
        ]
    }

    fn large_threshold(&self) -> u32 {
        400
    }

    fn complexity_threshold(&self) -> u32 {
        12
    }

    fn entry_patterns(&self) -> &'static [&'static str] {
        &["index.ts", "index.tsx", "index.js", "main.ts", "main.tsx", "app.ts", "cli.ts"]
    }

    fn lint_tool(&self) -> Option<&'static str> {
        Some("eslint")
    }

    fn fixers(&self) -> &'static [crate::lang::FixerConfig] {
        &[
            crate::lang::FixerConfig {
                name: "strip_unused_imports",
                command: &["eslint", "--fix", "--rule", "no-unused-vars: error", "."],
            },
            crate::lang::FixerConfig {
                name: "lint_autofix",
                command: &["eslint", "--fix", "."],
            },
        ]
    }

    fn resolve_imports(
        &self,
        file: &SourceFile,
        index: &FxHashMap<String, u32>,
    ) -> Vec<ImportEdge> {
        let mut edges = Vec::new();
        for line in file.content.lines() {
            for caps in import_re().captures_iter(line) {
                let type_only = caps.get(1).is_some();
                let static_spec = caps.get(2);
                let require_spec = caps.get(3);
                let dynamic_spec = caps.get(4);
                let (spec, deferred) = match (static_spec, require_spec, dynamic_spec) {
                    (Some(s), _, _) => (s.as_str(), type_only),
                    (_, Some(s), _) => (s.as_str(), false),
                    (_, _, Some(s)) => (s.as_str(), true),
                    _ => continue,
                };
                if let Some(target) = resolve_specifier(spec, &file.path, index) {
                    if target != file.path {
                        edges.push(ImportEdge { target, deferred });
                    }
                }
            }
        }
        edges
    }

    fn extract_functions(&self, file: &SourceFile) -> Vec<FunctionInfo> {
        let lines: Vec<&str> = file.content.lines().collect();
        let mut functions = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let Some(caps) = function_re().captures(line) else {
                continue;
            };
            let (name, params_src) = if let Some(name) = caps.get(2) {
                (name.as_str(), caps.get(3).map_or("", |m| m.as_str()))
            } else if let Some(name) = caps.get(5) {
                (name.as_str(), caps.get(6).map_or("", |m| m.as_str()))
            } else {
                continue;
            };

            // Body runs until the brace depth closes back to zero.
            let mut depth = brace_depth_delta(line);
            let mut end = i;
            let mut complexity = 1u32;
            let mut max_nesting = 0u32;
            if depth > 0 {
                for (j, body_line) in lines.iter().enumerate().skip(i + 1) {
                    complexity += line_complexity(body_line);
                    max_nesting = max_nesting.max(depth.max(0) as u32);
                    depth += brace_depth_delta(body_line);
                    end = j;
                    if depth <= 0 {
                        break;
                    }
                }
            }

            functions.push(FunctionInfo {
                name: name.to_string(),
                line_start: (i + 1) as u32,
                line_end: (end + 1) as u32,
                params: count_params(params_src),
                complexity,
                max_nesting: max_nesting.saturating_sub(1),
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
            let mut depth = brace_depth_delta(line);
            let mut end = i;
            let mut methods = Vec::new();
            if depth > 0 {
                for (j, body_line) in lines.iter().enumerate().skip(i + 1) {
                    if depth == 1 {
                        if let Some(m) = method_re().captures(body_line) {
                            let method = m[1].to_string();
                            if method != "constructor" && method != "if" && method != "for" {
                                methods.push(method);
                            }
                        }
                    }
                    depth += brace_depth_delta(body_line);
                    end = j;
                    if depth <= 0 {
                        break;
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
