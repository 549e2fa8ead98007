//! Error types for shellgrid core.

use std::fmt;

use shellgrid_engine::engine::{CellRef, CycleReport};
use thiserror::Error;

/// Errors that can occur while loading, validating or building a sheet
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error at line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error("{0}")]
    Cycles(CycleErrors),

    #[error("{0}")]
    Build(BuildFailures),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Every cycle and self reference found in a sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleErrors(pub Vec<CycleReport<CellRef>>);

impl fmt::Display for CycleErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, report) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", report)?;
        }
        Ok(())
    }
}

/// Why a single cell produced no output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    #[error("failed to launch: {0}")]
    Launch(String),

    #[error("{}", exit_message(.code, .stderr))]
    Exit { code: Option<i32>, stderr: String },

    #[error("skipped because {dependency} failed")]
    Skipped { dependency: CellRef },

    #[error("cancelled")]
    Cancelled,

    #[error("panicked: {0}")]
    Panicked(String),
}

fn exit_message(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        status
    } else {
        format!("{}: {}", status, stderr)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{cell}: {kind}")]
pub struct CellFailure {
    pub cell: CellRef,
    pub kind: FailureKind,
}

/// All per-cell failures of one build, in cell order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailures(pub Vec<CellFailure>);

impl BuildFailures {
    /// Cells whose own command failed, as opposed to being skipped or cancelled.
    pub fn failed_cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.0
            .iter()
            .filter(|f| {
                matches!(
                    f.kind,
                    FailureKind::Launch(_) | FailureKind::Exit { .. } | FailureKind::Panicked(_)
                )
            })
            .map(|f| f.cell)
    }
}

impl fmt::Display for BuildFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_failure_message() {
        let failure = CellFailure {
            cell: CellRef::new(1, 2),
            kind: FailureKind::Exit {
                code: Some(2),
                stderr: "boom\n".to_string(),
            },
        };
        assert_eq!(failure.to_string(), "B3: exited with status 2: boom");
    }

    #[test]
    fn test_aggregated_failures_one_per_line() {
        let failures = BuildFailures(vec![
            CellFailure {
                cell: CellRef::new(0, 0),
                kind: FailureKind::Exit {
                    code: Some(1),
                    stderr: String::new(),
                },
            },
            CellFailure {
                cell: CellRef::new(0, 1),
                kind: FailureKind::Skipped {
                    dependency: CellRef::new(0, 0),
                },
            },
        ]);
        assert_eq!(
            CoreError::Build(failures.clone()).to_string(),
            "A1: exited with status 1\nA2: skipped because A1 failed"
        );
        assert_eq!(failures.failed_cells().collect::<Vec<_>>(), vec![CellRef::new(0, 0)]);
    }

    #[test]
    fn test_cycle_errors_display() {
        let errors = CycleErrors(vec![
            CycleReport::Cycle(vec![CellRef::new(0, 0), CellRef::new(0, 1)]),
            CycleReport::SelfReference(CellRef::new(2, 2)),
        ]);
        assert_eq!(errors.to_string(), "Cycle: A1, A2\nSelf reference: C3");
    }
}
