//! Concurrent execution of an extracted subgraph.
//!
//! Scheduling is readiness counting: every vertex waits for its remaining
//! predecessors, and becomes ready when the count reaches zero. Ready cells
//! are spawned on a `JoinSet` and a semaphore bounds how many commands run at
//! once. Precedence is the only ordering between cells.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use shellgrid_engine::engine::{CellKind, CellRef, CellSyntax, DependencyGraph, Grid, Vertex};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::runner::CommandRunner;
use crate::change::FileSystem;
use crate::error::{BuildFailures, CellFailure, CoreError, FailureKind, Result};

pub const DEFAULT_MAX_PARALLEL: usize = 8;

/// Everything one execution produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Output of every cell that completed
    pub outputs: HashMap<CellRef, String>,
    /// Failed, skipped and cancelled cells, sorted by cell
    pub failures: Vec<CellFailure>,
    /// True if a shutdown interrupted the run
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Outputs, or every failure aggregated into one error.
    pub fn into_result(self) -> Result<HashMap<CellRef, String>> {
        if self.failures.is_empty() {
            Ok(self.outputs)
        } else {
            Err(CoreError::Build(BuildFailures(self.failures)))
        }
    }
}

/// Runs subgraphs against a grid snapshot.
#[derive(Clone)]
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    syntax: CellSyntax,
    max_parallel: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Executor {
    pub fn new(runner: Arc<dyn CommandRunner>, fs: Arc<dyn FileSystem>) -> Self {
        Executor {
            runner,
            fs,
            syntax: CellSyntax::new(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            shutdown: None,
        }
    }

    pub fn with_syntax(mut self, syntax: CellSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Cap on concurrently running commands. Zero is treated as one.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Abort outstanding work once `true` is sent on this channel.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Execute every vertex of `subgraph` in dependency order.
    ///
    /// Cells read their text from `grid`. A failed cell does not stop the
    /// run: its dependents are skipped and independent branches carry on.
    pub async fn run(&self, subgraph: &DependencyGraph<Vertex>, grid: &Grid) -> ExecutionReport {
        let outputs: Arc<DashMap<CellRef, String>> = Arc::new(DashMap::new());
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut failures: Vec<CellFailure> = Vec::new();

        let mut pending: HashMap<Vertex, usize> = subgraph
            .vertices()
            .map(|v| (*v, subgraph.edges_into(v).len()))
            .collect();
        // First failed ancestor of each vertex that can no longer run.
        let mut blocked: HashMap<Vertex, CellRef> = HashMap::new();
        let mut ready: VecDeque<Vertex> = subgraph
            .vertices()
            .filter(|v| pending.get(*v) == Some(&0))
            .copied()
            .collect();
        let mut set: JoinSet<(Vertex, std::result::Result<(), FailureKind>)> = JoinSet::new();
        let mut shutdown = self.shutdown.clone();
        let mut cancelled = false;

        info!(vertices = subgraph.len(), "executing subgraph");

        loop {
            while let Some(vertex) = ready.pop_front() {
                if let Some(dependency) = blocked.get(&vertex).copied() {
                    if let Some(cell) = vertex.cell() {
                        debug!(cell = %cell, dependency = %dependency, "skipping cell");
                        failures.push(CellFailure {
                            cell,
                            kind: FailureKind::Skipped { dependency },
                        });
                    }
                    release(
                        subgraph,
                        vertex,
                        Some(dependency),
                        &mut pending,
                        &mut blocked,
                        &mut ready,
                    );
                    continue;
                }

                let Some(cell) = vertex.cell() else {
                    release(subgraph, vertex, None, &mut pending, &mut blocked, &mut ready);
                    continue;
                };

                let job = CellJob {
                    cell,
                    text: grid.get(&cell).unwrap_or_default().to_string(),
                    runner: Arc::clone(&self.runner),
                    fs: Arc::clone(&self.fs),
                    syntax: self.syntax.clone(),
                    outputs: Arc::clone(&outputs),
                };
                let semaphore = Arc::clone(&semaphore);
                set.spawn(async move {
                    let result = AssertUnwindSafe(async move {
                        let Ok(_permit) = semaphore.acquire_owned().await else {
                            return Err(FailureKind::Cancelled);
                        };
                        job.execute().await
                    })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(FailureKind::Panicked(panic_message(panic))));
                    (vertex, result)
                });
            }

            if set.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = set.join_next() => joined,
                _ = shutdown_requested(&mut shutdown) => {
                    warn!("shutdown requested, cancelling running cells");
                    cancelled = true;
                    set.abort_all();
                    // Tasks that finished before the abort still report.
                    while let Some(joined) = set.join_next().await {
                        if let Ok((vertex, result)) = joined {
                            record(vertex, result, &mut failures);
                        }
                    }
                    break;
                }
            };

            let Some(joined) = joined else { break };
            let (vertex, result) = match joined {
                Ok(done) => done,
                // Panics are caught inside the task, so only aborts land here.
                Err(err) => {
                    warn!(error = %err, "cell task ended unexpectedly");
                    continue;
                }
            };
            let failed = record(vertex, result, &mut failures);
            release(subgraph, vertex, failed, &mut pending, &mut blocked, &mut ready);
        }

        if cancelled {
            // Everything that had not completed, including work never reached.
            for vertex in subgraph.vertices() {
                let Some(cell) = vertex.cell() else { continue };
                let done = outputs.contains_key(&cell) || failures.iter().any(|f| f.cell == cell);
                if !done {
                    failures.push(CellFailure {
                        cell,
                        kind: FailureKind::Cancelled,
                    });
                }
            }
        }

        failures.sort_by_key(|f| f.cell);
        let outputs: HashMap<CellRef, String> = Arc::try_unwrap(outputs)
            .map(|map| map.into_iter().collect())
            .unwrap_or_else(|shared| {
                shared
                    .iter()
                    .map(|entry| (*entry.key(), entry.value().clone()))
                    .collect()
            });

        info!(
            outputs = outputs.len(),
            failures = failures.len(),
            cancelled,
            "subgraph finished"
        );
        ExecutionReport {
            outputs,
            failures,
            cancelled,
        }
    }
}

/// Log a finished task and keep its failure. Returns the failed cell.
fn record(
    vertex: Vertex,
    result: std::result::Result<(), FailureKind>,
    failures: &mut Vec<CellFailure>,
) -> Option<CellRef> {
    match (vertex.cell(), result) {
        (Some(cell), Ok(())) => {
            debug!(cell = %cell, "cell finished");
            None
        }
        (Some(cell), Err(kind)) => {
            warn!(cell = %cell, error = %kind, "cell failed");
            failures.push(CellFailure { cell, kind });
            Some(cell)
        }
        (None, _) => None,
    }
}

/// Mark `vertex` finished and queue successors whose last predecessor it was.
/// `failed` is the root-cause cell if `vertex` produced no output.
fn release(
    subgraph: &DependencyGraph<Vertex>,
    vertex: Vertex,
    failed: Option<CellRef>,
    pending: &mut HashMap<Vertex, usize>,
    blocked: &mut HashMap<Vertex, CellRef>,
    ready: &mut VecDeque<Vertex>,
) {
    for next in subgraph.edges_out_of(&vertex) {
        if let Some(cause) = failed {
            blocked.entry(*next).or_insert(cause);
        }
        if let Some(count) = pending.get_mut(next) {
            *count -= 1;
            if *count == 0 {
                ready.push_back(*next);
            }
        }
    }
}

/// Resolves once shutdown is signalled. Never resolves without a channel.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: nobody can ask for shutdown any more.
            return std::future::pending().await;
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One cell's work, owned so it can move into a task.
struct CellJob {
    cell: CellRef,
    text: String,
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    syntax: CellSyntax,
    outputs: Arc<DashMap<CellRef, String>>,
}

impl CellJob {
    async fn execute(self) -> std::result::Result<(), FailureKind> {
        let output = match self.syntax.kind(&self.text) {
            CellKind::FileProducer { pattern } => {
                let paths = self.fs.glob(pattern);
                paths
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            _ if self.text.trim().is_empty() => String::new(),
            _ => self.run_command().await?,
        };
        self.outputs.insert(self.cell, output);
        Ok(())
    }

    async fn run_command(&self) -> std::result::Result<String, FailureKind> {
        let env: HashMap<String, String> = self
            .syntax
            .references(&self.text)
            .into_iter()
            .map(|dep| {
                let value = self
                    .outputs
                    .get(&dep)
                    .map(|entry| entry.value().clone())
                    .unwrap_or_default();
                (dep.to_string(), value)
            })
            .collect();

        let output = self
            .runner
            .run(&self.cell, &self.text, &env)
            .await
            .map_err(|err| FailureKind::Launch(err.to_string()))?;

        if output.success() {
            Ok(output.stdout)
        } else {
            Err(FailureKind::Exit {
                code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }
}
