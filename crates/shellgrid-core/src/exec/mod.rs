//! Running cells: the command runner seam and the concurrent executor.

mod executor;
mod runner;

pub use executor::{DEFAULT_MAX_PARALLEL, ExecutionReport, Executor};
pub use runner::{CommandOutput, CommandRunner, ShellRunner};
