//! Directed dependency graph.
//!
//! An edge `source -> target` means `target` reads `source`'s output, so
//! `source` has to run first. Adjacency is kept in both directions so that
//! the executor can walk successors and the extractor can walk predecessors
//! without rebuilding anything.
//!
//! Self references (`A1` reading `$A1`) are recorded on the side instead of
//! as a loop edge, so they never take part in ordering.

use std::collections::{BTreeMap, BTreeSet};

use super::cell::Grid;
use super::cell_ref::CellRef;
use super::deps::CellSyntax;

#[derive(Clone, Debug, Default)]
struct Adjacency<V> {
    into: Vec<V>,
    out_of: Vec<V>,
}

/// A directed graph with deduplicated edges and deterministic iteration order.
#[derive(Clone, Debug)]
pub struct DependencyGraph<V: Ord + Clone> {
    nodes: BTreeMap<V, Adjacency<V>>,
    self_references: BTreeSet<V>,
    edge_count: usize,
}

impl<V: Ord + Clone> Default for DependencyGraph<V> {
    fn default() -> Self {
        DependencyGraph {
            nodes: BTreeMap::new(),
            self_references: BTreeSet::new(),
            edge_count: 0,
        }
    }
}

impl<V: Ord + Clone> DependencyGraph<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vertex with no edges. No-op if it already exists.
    pub fn add_vertex(&mut self, vertex: V) {
        self.nodes.entry(vertex).or_insert_with(|| Adjacency {
            into: Vec::new(),
            out_of: Vec::new(),
        });
    }

    /// Insert both endpoints and the edge `source -> target`.
    ///
    /// Repeated calls with the same pair leave a single edge. When source and
    /// target are equal the vertex is flagged as a self reference instead.
    pub fn add_edge(&mut self, source: V, target: V) {
        self.add_vertex(source.clone());
        if source == target {
            self.self_references.insert(source);
            return;
        }
        self.add_vertex(target.clone());

        let out_of = &mut self.nodes.get_mut(&source).expect("source inserted").out_of;
        if out_of.contains(&target) {
            return;
        }
        out_of.push(target.clone());
        self.nodes
            .get_mut(&target)
            .expect("target inserted")
            .into
            .push(source);
        self.edge_count += 1;
    }

    /// Vertices `target` depends on (its direct producers).
    pub fn edges_into(&self, target: &V) -> &[V] {
        self.nodes
            .get(target)
            .map(|adj| adj.into.as_slice())
            .unwrap_or(&[])
    }

    /// Vertices depending directly on `source` (its direct consumers).
    pub fn edges_out_of(&self, source: &V) -> &[V] {
        self.nodes
            .get(source)
            .map(|adj| adj.out_of.as_slice())
            .unwrap_or(&[])
    }

    /// All vertices in sorted order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> + '_ {
        self.nodes.keys()
    }

    /// All edges as `(source, target)` pairs, grouped by source.
    pub fn edges(&self) -> impl Iterator<Item = (&V, &V)> + '_ {
        self.nodes
            .iter()
            .flat_map(|(source, adj)| adj.out_of.iter().map(move |target| (source, target)))
    }

    /// Vertices whose text refers to themselves.
    pub fn self_references(&self) -> impl Iterator<Item = &V> + '_ {
        self.self_references.iter()
    }

    /// Vertices with no incoming edge.
    pub fn roots(&self) -> Vec<V> {
        self.nodes
            .iter()
            .filter(|(_, adj)| adj.into.is_empty())
            .map(|(v, _)| v.clone())
            .collect()
    }

    pub fn contains(&self, vertex: &V) -> bool {
        self.nodes.contains_key(vertex)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

/// The dependency graph of a whole grid plus its file-producer cells.
#[derive(Clone, Debug, Default)]
pub struct SheetGraph {
    pub graph: DependencyGraph<CellRef>,
    /// `FILES(...)` cells in row-major order. They are not marked in the
    /// graph and only appear there if something references them.
    pub file_producers: Vec<CellRef>,
}

impl SheetGraph {
    /// Scan every cell: a reference to `R` inside cell `C` adds `R -> C`.
    pub fn from_grid(grid: &Grid, syntax: &CellSyntax) -> Self {
        let mut graph = DependencyGraph::new();
        let mut file_producers = Vec::new();

        for (cell_ref, text) in grid.cells() {
            for dep in syntax.references(text) {
                graph.add_edge(dep, cell_ref);
            }
            if syntax.is_file_producer(text) {
                file_producers.push(cell_ref);
            }
        }

        SheetGraph {
            graph,
            file_producers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut g = DependencyGraph::new();
        g.add_edge(1, 2);
        g.add_edge(1, 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edges_out_of(&1), &[2]);
        assert_eq!(g.edges_into(&2), &[1]);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_self_edge_is_flagged_not_stored() {
        let mut g = DependencyGraph::new();
        g.add_edge(7, 7);
        assert!(g.contains(&7));
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.self_references().copied().collect::<Vec<_>>(), vec![7]);
        assert!(g.edges_out_of(&7).is_empty());
    }

    #[test]
    fn test_unknown_vertex_has_no_edges() {
        let g: DependencyGraph<u32> = DependencyGraph::new();
        assert!(g.edges_into(&3).is_empty());
        assert!(g.edges_out_of(&3).is_empty());
        assert!(g.is_empty());
    }

    #[test]
    fn test_roots() {
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b");
        g.add_edge("c", "b");
        g.add_vertex("d");
        assert_eq!(g.roots(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_from_grid_edges_point_at_consumers() {
        let grid = Grid::from([["FILES(*.rs)", "echo hi"], ["wc $A1", "cat $A2 $A2"]]);
        let sheet = SheetGraph::from_grid(&grid, &CellSyntax::new());

        let a1 = CellRef::new(0, 0);
        let a2 = CellRef::new(0, 1);
        let b2 = CellRef::new(1, 1);

        assert_eq!(sheet.graph.edges_out_of(&a1), &[a2]);
        assert_eq!(sheet.graph.edges_out_of(&a2), &[b2]);
        assert_eq!(sheet.graph.edges_into(&b2), &[a2]);
        assert_eq!(sheet.file_producers, vec![a1]);
    }

    #[test]
    fn test_from_grid_skips_isolated_cells() {
        let grid = Grid::from([["echo 1", "echo 2"], ["echo 3", "echo $A1"]]);
        let sheet = SheetGraph::from_grid(&grid, &CellSyntax::new());
        let vertices: Vec<_> = sheet.graph.vertices().copied().collect();
        assert_eq!(vertices, vec![CellRef::new(0, 0), CellRef::new(1, 1)]);
    }
}
