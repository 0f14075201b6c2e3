//! Import graph over scanned files.
//!
//! Built once per scan from the language plugin's import resolver and
//! immutable for the scan's duration. Nodes are interned file paths; edges
//! come in two flavors: regular imports and deferred imports (type-only,
//! dynamic, `TYPE_CHECKING`-guarded). Deferred edges are excluded from
//! cycle detection: they cannot cause import-time cycles: but still count
//! toward coupling metrics.

use rustc_hash::FxHashMap;
use tracing::debug;

use codegauge_fast::graph_algo::{self, Adjacency};

use crate::discovery::SourceFile;
use crate::lang::LanguagePlugin;

/// One resolved import edge, produced by the language plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdge {
    /// Repository-relative target path.
    pub target: String,
    /// Guarded by a lazy construct; excluded from cycle detection.
    pub deferred: bool,
}

/// Directed multigraph with file-path nodes.
pub struct ImportGraph {
    paths: Vec<String>,
    index: FxHashMap<String, u32>,
    /// Non-deferred edges only: the cycle universe.
    strict_edges: Vec<(u32, u32)>,
    /// All edges including deferred: the coupling universe.
    all_edges: Vec<(u32, u32)>,
    adjacency: Adjacency,
    fan_in: Vec<u32>,
    fan_out: Vec<u32>,
}

impl ImportGraph {
    /// Resolve every file's imports through the plugin and build the graph.
    pub fn build(files: &[SourceFile], plugin: &dyn LanguagePlugin) -> Self {
        let paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        let index: FxHashMap<String, u32> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i as u32))
            .collect();

        let mut strict_edges = Vec::new();
        let mut all_edges = Vec::new();
        for file in files {
            let src = index[&file.path];
            for edge in plugin.resolve_imports(file, &index) {
                let Some(&dst) = index.get(&edge.target) else {
                    continue;
                };
                all_edges.push((src, dst));
                if !edge.deferred {
                    strict_edges.push((src, dst));
                }
            }
        }

        let n = paths.len();
        // Edges were validated against the intern table above; the kernels
        // cannot fail on in-bounds input.
        let adjacency = graph_algo::build_adjacency(&all_edges, n)
            .unwrap_or(Adjacency {
                imports: vec![Vec::new(); n],
                importers: vec![Vec::new(); n],
            });
        let (fan_in, fan_out) =
            graph_algo::degree_tables(&all_edges, n).unwrap_or((vec![0; n], vec![0; n]));

        debug!(
            "import graph: {} nodes, {} edges ({} deferred)",
            n,
            all_edges.len(),
            all_edges.len() - strict_edges.len()
        );

        Self {
            paths,
            index,
            strict_edges,
            all_edges,
            adjacency,
            fan_in,
            fan_out,
        }
    }

    pub fn node_count(&self) -> usize {
        self.paths.len()
    }

    pub fn edge_count(&self) -> usize {
        self.all_edges.len()
    }

    fn id_of(&self, path: &str) -> Option<u32> {
        self.index.get(path).copied()
    }

    /// Files `path` imports (deduplicated, deferred included).
    pub fn imports_of(&self, path: &str) -> Vec<&str> {
        self.id_of(path)
            .map(|id| {
                self.adjacency.imports[id as usize]
                    .iter()
                    .map(|&t| self.paths[t as usize].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Files importing `path` (deduplicated, deferred included).
    pub fn importers_of(&self, path: &str) -> Vec<&str> {
        self.id_of(path)
            .map(|id| {
                self.adjacency.importers[id as usize]
                    .iter()
                    .map(|&t| self.paths[t as usize].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn fan_in(&self, path: &str) -> u32 {
        self.id_of(path).map_or(0, |id| self.fan_in[id as usize])
    }

    pub fn fan_out(&self, path: &str) -> u32 {
        self.id_of(path).map_or(0, |id| self.fan_out[id as usize])
    }

    /// Strongly connected components of size >= 2 over non-deferred edges,
    /// as sorted path lists.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let sccs = graph_algo::find_cycles(&self.strict_edges, self.paths.len(), 2)
            .unwrap_or_default();
        let mut cycles: Vec<Vec<String>> = sccs
            .into_iter()
            .map(|scc| {
                let mut members: Vec<String> = scc
                    .into_iter()
                    .map(|id| self.paths[id as usize].clone())
                    .collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// A file is orphaned iff nothing imports it and no entry pattern
    /// claims it. Entry patterns come from the language plugin.
    pub fn is_orphaned(&self, file: &SourceFile, entry_patterns: &[&str]) -> bool {
        if self.fan_in(&file.path) > 0 {
            return false;
        }
        !entry_patterns
            .iter()
            .any(|p| crate::zones::pattern_matches(p, &file.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::SourceFile;
    use crate::zones::Zone;
    use std::sync::Arc;

    struct StubPlugin {
        edges: Vec<(String, String, bool)>,
    }

    impl LanguagePlugin for StubPlugin {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn extensions(&self) -> &'static [&'static str] {
            &["py"]
        }
        fn resolve_imports(
            &self,
            file: &SourceFile,
            _index: &FxHashMap<String, u32>,
        ) -> Vec<ImportEdge> {
            self.edges
                .iter()
                .filter(|(src, _, _)| *src == file.path)
                .map(|(_, dst, deferred)| ImportEdge {
                    target: dst.clone(),
                    deferred: *deferred,
                })
                .collect()
        }
    }

    fn file(path: &str) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            abs_path: path.into(),
            zone: Zone::Production,
            lang: "stub".into(),
            content: Arc::new(String::new()),
            loc: 0,
        }
    }

    fn edge(src: &str, dst: &str, deferred: bool) -> (String, String, bool) {
        (src.to_string(), dst.to_string(), deferred)
    }

    #[test]
    fn test_cycles_ignore_deferred_edges() {
        let files = vec![file("a.py"), file("b.py")];
        let plugin = StubPlugin {
            edges: vec![edge("a.py", "b.py", false), edge("b.py", "a.py", true)],
        };
        let graph = ImportGraph::build(&files, &plugin);
        assert!(graph.cycles().is_empty());
        // but the deferred edge still counts for coupling
        assert_eq!(graph.fan_in("a.py"), 1);
    }

    #[test]
    fn test_cycles_sorted_membership() {
        let files = vec![file("c.py"), file("a.py"), file("b.py")];
        let plugin = StubPlugin {
            edges: vec![
                edge("c.py", "a.py", false),
                edge("a.py", "b.py", false),
                edge("b.py", "c.py", false),
            ],
        };
        let graph = ImportGraph::build(&files, &plugin);
        let cycles = graph.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a.py", "b.py", "c.py"]);
    }

    #[test]
    fn test_orphan_requires_no_importers_and_no_entry_match() {
        let files = vec![file("main.py"), file("used.py"), file("dead.py")];
        let plugin = StubPlugin {
            edges: vec![edge("main.py", "used.py", false)],
        };
        let graph = ImportGraph::build(&files, &plugin);
        let entries = ["main.py"];
        assert!(!graph.is_orphaned(&files[0], &entries)); // entry point
        assert!(!graph.is_orphaned(&files[1], &entries)); // imported
        assert!(graph.is_orphaned(&files[2], &entries));
    }

    #[test]
    fn test_fan_queries() {
        let files = vec![file("a.py"), file("b.py"), file("c.py")];
        let plugin = StubPlugin {
            edges: vec![
                edge("a.py", "c.py", false),
                edge("b.py", "c.py", false),
                edge("a.py", "b.py", false),
            ],
        };
        let graph = ImportGraph::build(&files, &plugin);
        assert_eq!(graph.fan_in("c.py"), 2);
        assert_eq!(graph.fan_out("a.py"), 2);
        assert_eq!(graph.imports_of("a.py"), vec!["b.py", "c.py"]);
        assert_eq!(graph.importers_of("c.py"), vec!["a.py", "b.py"]);
    }
}
