//! shellgrid_engine - Cell references, dependency graphs and build planning.

pub mod engine;
