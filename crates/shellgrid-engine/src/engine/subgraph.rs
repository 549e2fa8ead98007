//! Extract the part of the sheet graph that a build has to run.
//!
//! Starting from the dirty cells, the walk first goes downstream to find
//! every cell whose output is now stale, then upstream from those so that
//! each stale command has its inputs produced in the same build. Only edges
//! between collected vertices are copied.
//!
//! Independent computations in a sheet rarely share an ancestor, so the
//! result is often a forest. When it has more than one root, a synthetic
//! [`Vertex::Root`] is added above all of them to give the walk a single
//! entry point.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use super::cell_ref::CellRef;
use super::graph::DependencyGraph;

/// A vertex of an extracted subgraph.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Vertex {
    /// Synthetic entry point. Never executed and never has an output.
    Root,
    Cell(CellRef),
}

impl Vertex {
    pub fn cell(&self) -> Option<CellRef> {
        match self {
            Vertex::Root => None,
            Vertex::Cell(cell) => Some(*cell),
        }
    }
}

impl From<CellRef> for Vertex {
    fn from(cell: CellRef) -> Self {
        Vertex::Cell(cell)
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Root => write!(f, "<root>"),
            Vertex::Cell(cell) => write!(f, "{}", cell),
        }
    }
}

/// Build the subgraph that refreshes `dirty`. An empty dirty set gives an
/// empty subgraph.
pub fn extract_subgraph(graph: &DependencyGraph<CellRef>, dirty: &[CellRef]) -> DependencyGraph<Vertex> {
    let mut subgraph = DependencyGraph::new();
    if dirty.is_empty() {
        return subgraph;
    }

    let affected = walk(dirty.iter().copied(), |cell| graph.edges_out_of(cell));
    let required = walk(affected.into_iter(), |cell| graph.edges_into(cell));

    for cell in &required {
        subgraph.add_vertex(Vertex::Cell(*cell));
        for consumer in graph.edges_out_of(cell) {
            if required.contains(consumer) {
                subgraph.add_edge(Vertex::Cell(*cell), Vertex::Cell(*consumer));
            }
        }
    }

    let roots = subgraph.roots();
    if roots.len() > 1 {
        for root in roots {
            subgraph.add_edge(Vertex::Root, root);
        }
    }

    subgraph
}

/// Breadth-first closure of `start` under `next`.
fn walk<'g, I, F>(start: I, next: F) -> BTreeSet<CellRef>
where
    I: Iterator<Item = CellRef>,
    F: Fn(&CellRef) -> &'g [CellRef],
{
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<CellRef> = VecDeque::new();
    for cell in start {
        if seen.insert(cell) {
            queue.push_back(cell);
        }
    }
    while let Some(cell) = queue.pop_front() {
        for neighbour in next(&cell) {
            if seen.insert(*neighbour) {
                queue.push_back(*neighbour);
            }
        }
    }
    seen
}
