//! shellgrid-core - Sheet state, change tracking, execution and storage.

pub mod build;
pub mod change;
pub mod error;
pub mod exec;
pub mod sheet;
pub mod storage;

pub use build::{BuildCoordinator, BuildOutcome, BuildTrigger, EditHandle};
pub use change::{ChangeTracker, Clock, FileSystem, OsFileSystem, SystemClock};
pub use error::{BuildFailures, CellFailure, CoreError, CycleErrors, FailureKind, Result};
pub use exec::{CommandOutput, CommandRunner, ExecutionReport, Executor, ShellRunner};
pub use sheet::{CellChange, Sheet};
pub use storage::{CsvStore, GridStore};

pub use shellgrid_engine::engine::{CellRef, Grid};
