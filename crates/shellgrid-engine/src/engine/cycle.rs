//! Circular dependency detection.
//!
//! A grid with a cycle can never be scheduled (A1 reads B1, B1 reads C1,
//! C1 reads A1), so every cycle is reported before anything runs. This uses
//! a depth-first search with three colours: a grey vertex met again closes a
//! cycle, and the path stack holds its members.

use std::collections::HashMap;
use std::fmt;

use super::graph::DependencyGraph;

/// One problem that makes the graph unschedulable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleReport<V> {
    /// A closed walk through two or more vertices, in edge order.
    Cycle(Vec<V>),
    /// A vertex that references itself.
    SelfReference(V),
}

impl<V: fmt::Display> fmt::Display for CycleReport<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleReport::Cycle(path) => {
                write!(f, "Cycle: ")?;
                for (i, v) in path.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
            CycleReport::SelfReference(v) => write!(f, "Self reference: {}", v),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Report every cycle and self reference in the graph. An empty result means
/// the graph can be scheduled. The graph is not modified.
pub fn detect_cycles<V>(graph: &DependencyGraph<V>) -> Vec<CycleReport<V>>
where
    V: Ord + Clone + std::hash::Hash,
{
    let mut marks: HashMap<V, Mark> = HashMap::new();
    let mut reports = Vec::new();

    for vertex in graph.vertices() {
        if !marks.contains_key(vertex) {
            detect_cycle_dfs(vertex, graph, &mut marks, &mut reports);
        }
    }

    for vertex in graph.self_references() {
        reports.push(CycleReport::SelfReference(vertex.clone()));
    }

    reports
}

/// Depth-first search from `start` with an explicit stack, so reference
/// chains of any length fit on a worker thread. Each frame holds a vertex on
/// the current path and the index of its next outgoing edge.
fn detect_cycle_dfs<'g, V>(
    start: &'g V,
    graph: &'g DependencyGraph<V>,
    marks: &mut HashMap<V, Mark>,
    reports: &mut Vec<CycleReport<V>>,
) where
    V: Ord + Clone + std::hash::Hash,
{
    let mut stack: Vec<(&'g V, usize)> = vec![(start, 0)];
    marks.insert(start.clone(), Mark::Visiting);

    while let Some(frame) = stack.last_mut() {
        let (current, edge) = *frame;
        frame.1 += 1;

        let Some(next) = graph.edges_out_of(current).get(edge) else {
            marks.insert(current.clone(), Mark::Done);
            stack.pop();
            continue;
        };

        match marks.get(next).copied() {
            None => {
                marks.insert(next.clone(), Mark::Visiting);
                stack.push((next, 0));
            }
            Some(Mark::Visiting) => {
                if let Some(at) = stack.iter().position(|(v, _)| *v == next) {
                    let path = stack[at..].iter().map(|(v, _)| (*v).clone()).collect();
                    reports.push(CycleReport::Cycle(path));
                }
            }
            Some(Mark::Done) => {}
        }
    }
}
