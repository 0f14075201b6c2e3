//! Graph algorithms over edge lists.
//!
//! The import graph is handed to these functions as a `(u32, u32)` edge list
//! plus a node count; node ids are positions in the caller's interned path
//! table. Keeping the API at this level means the analyzer can build the
//! graph once per scan and query it from parallel phases without sharing
//! anything heavier than slices.
//!
//! SCC detection uses petgraph's `tarjan_scc`, which maintains an explicit
//! stack rather than recursing. Import graphs of 10k+ files are routine and
//! would overflow the call stack with a recursive Tarjan.

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use rustc_hash::FxHashMap;

use crate::errors::GraphError;

/// Validate that all edges reference valid node indices.
fn validate_edges(edges: &[(u32, u32)], num_nodes: u32) -> Result<(), GraphError> {
    for &(src, dst) in edges {
        if src >= num_nodes {
            return Err(GraphError::NodeOutOfBounds(src, num_nodes));
        }
        if dst >= num_nodes {
            return Err(GraphError::NodeOutOfBounds(dst, num_nodes));
        }
    }
    Ok(())
}

/// Find all strongly connected components.
///
/// Returns one `Vec<u32>` per SCC. Components of size >= 2 are import
/// cycles. The edge list may contain duplicates (multigraph); they do not
/// affect the result.
pub fn find_sccs(edges: &[(u32, u32)], num_nodes: usize) -> Result<Vec<Vec<u32>>, GraphError> {
    if num_nodes == 0 {
        return Ok(vec![]);
    }
    validate_edges(edges, num_nodes as u32)?;

    let mut graph: DiGraph<(), ()> = DiGraph::new();
    let node_indices: Vec<_> = (0..num_nodes).map(|_| graph.add_node(())).collect();
    for &(src, dst) in edges {
        graph.add_edge(node_indices[src as usize], node_indices[dst as usize], ());
    }

    let sccs = tarjan_scc(&graph);
    Ok(sccs
        .into_iter()
        .map(|scc| scc.into_iter().map(|idx| idx.index() as u32).collect())
        .collect())
}

/// Find cycles: SCCs with at least `min_size` members.
pub fn find_cycles(
    edges: &[(u32, u32)],
    num_nodes: usize,
    min_size: usize,
) -> Result<Vec<Vec<u32>>, GraphError> {
    Ok(find_sccs(edges, num_nodes)?
        .into_iter()
        .filter(|scc| scc.len() >= min_size)
        .collect())
}

/// Per-node in/out degree, counting duplicate edges once each.
///
/// Returns `(fan_in, fan_out)` vectors indexed by node id.
pub fn degree_tables(
    edges: &[(u32, u32)],
    num_nodes: usize,
) -> Result<(Vec<u32>, Vec<u32>), GraphError> {
    validate_edges(edges, num_nodes as u32)?;
    let mut fan_in = vec![0u32; num_nodes];
    let mut fan_out = vec![0u32; num_nodes];
    for &(src, dst) in edges {
        fan_out[src as usize] += 1;
        fan_in[dst as usize] += 1;
    }
    Ok((fan_in, fan_out))
}

/// Adjacency lists in both directions, deduplicated per endpoint pair.
pub struct Adjacency {
    pub imports: Vec<Vec<u32>>,
    pub importers: Vec<Vec<u32>>,
}

/// Build deduplicated adjacency lists from an edge list.
pub fn build_adjacency(edges: &[(u32, u32)], num_nodes: usize) -> Result<Adjacency, GraphError> {
    validate_edges(edges, num_nodes as u32)?;
    let mut imports: Vec<Vec<u32>> = vec![Vec::new(); num_nodes];
    let mut importers: Vec<Vec<u32>> = vec![Vec::new(); num_nodes];
    let mut seen: FxHashMap<(u32, u32), ()> = FxHashMap::default();
    for &(src, dst) in edges {
        if seen.insert((src, dst), ()).is_none() {
            imports[src as usize].push(dst);
            importers[dst as usize].push(src);
        }
    }
    for list in imports.iter_mut().chain(importers.iter_mut()) {
        list.sort_unstable();
    }
    Ok(Adjacency { imports, importers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_sccs_simple_cycle() {
        // a -> b -> c -> a, plus d -> a outside the cycle
        let edges = vec![(0, 1), (1, 2), (2, 0), (3, 0)];
        let sccs = find_sccs(&edges, 4).unwrap();
        let cycle: Vec<_> = sccs.into_iter().filter(|s| s.len() > 1).collect();
        assert_eq!(cycle.len(), 1);
        assert_eq!(cycle[0].len(), 3);
    }

    #[test]
    fn test_find_cycles_none_in_dag() {
        let edges = vec![(0, 1), (1, 2)];
        assert!(find_cycles(&edges, 3, 2).unwrap().is_empty());
    }

    #[test]
    fn test_find_sccs_empty_graph() {
        assert!(find_sccs(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_edge_out_of_bounds() {
        let err = find_sccs(&[(0, 5)], 3).unwrap_err();
        assert_eq!(err, GraphError::NodeOutOfBounds(5, 3));
    }

    #[test]
    fn test_degree_tables() {
        let edges = vec![(0, 1), (0, 2), (1, 2)];
        let (fan_in, fan_out) = degree_tables(&edges, 3).unwrap();
        assert_eq!(fan_out, vec![2, 1, 0]);
        assert_eq!(fan_in, vec![0, 1, 2]);
    }

    #[test]
    fn test_build_adjacency_dedups_multi_edges() {
        let edges = vec![(0, 1), (0, 1), (1, 0)];
        let adj = build_adjacency(&edges, 2).unwrap();
        assert_eq!(adj.imports[0], vec![1]);
        assert_eq!(adj.importers[1], vec![0]);
    }

    #[test]
    fn test_large_graph_no_stack_overflow() {
        // A single 20k-node cycle: recursive Tarjan would blow the stack here.
        let n = 20_000u32;
        let edges: Vec<(u32, u32)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        let cycles = find_cycles(&edges, n as usize, 2).unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), n as usize);
    }
}
