//! Dependency engine API.
//!
//! This module turns grid text into a schedulable graph:
//!
//! - [`Grid`], [`CellKind`] - Raw cell storage and what a cell's text means
//! - [`CellRef`] - Cell reference parsing (A1 notation ↔ row/col indices)
//! - [`CellSyntax`] - `$A1` reference scanning and the `FILES(...)` marker
//! - [`DependencyGraph`], [`SheetGraph`] - Producer → consumer edges
//! - [`detect_cycles`] - Cycle and self-reference reports
//! - [`extract_subgraph`] - The part of the graph a build must run

mod cell;
mod cell_ref;
mod cycle;
mod deps;
mod graph;
mod subgraph;

pub use cell::{CellKind, Grid};
pub use cell_ref::CellRef;
pub use cycle::{CycleReport, detect_cycles};
pub use deps::CellSyntax;
pub use graph::{DependencyGraph, SheetGraph};
pub use subgraph::{Vertex, extract_subgraph};
