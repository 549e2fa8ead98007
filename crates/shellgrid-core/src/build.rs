//! Single-flight build coordination.
//!
//! A build checks the sheet for cycles, asks the change tracker which file
//! producers changed since the last build, extracts the subgraph below them
//! and executes it on a snapshot of the grid. At most one build runs at a
//! time; a request that arrives while one is running is dropped, not queued.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use shellgrid_engine::engine::{CellRef, Grid, extract_subgraph};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::change::{ChangeTracker, Clock, SystemClock};
use crate::error::Result;
use crate::exec::Executor;
use crate::sheet::{CellChange, Sheet};

/// What asked for a build. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTrigger {
    Tick,
    Edit,
    Manual,
}

impl fmt::Display for BuildTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildTrigger::Tick => "tick",
            BuildTrigger::Edit => "edit",
            BuildTrigger::Manual => "manual",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Another build was in flight
    Skipped,
    /// No file producer changed
    UpToDate,
    /// The subgraph ran and every cell succeeded
    Ran { outputs: HashMap<CellRef, String> },
}

/// Owns the sheet and serializes builds over it.
pub struct BuildCoordinator {
    sheet: Arc<RwLock<Sheet>>,
    executor: Executor,
    tracker: ChangeTracker,
    clock: Arc<dyn Clock>,
    last_build: Mutex<DateTime<Utc>>,
    in_flight: tokio::sync::Mutex<()>,
    notify: Arc<Notify>,
}

impl BuildCoordinator {
    /// A coordinator whose last build time is now.
    pub fn new(sheet: Sheet, executor: Executor, tracker: ChangeTracker) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        BuildCoordinator {
            sheet: Arc::new(RwLock::new(sheet)),
            executor,
            tracker,
            last_build: Mutex::new(clock.now()),
            clock,
            in_flight: tokio::sync::Mutex::new(()),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_last_build(self, at: DateTime<Utc>) -> Self {
        *recover(&self.last_build) = at;
        self
    }

    pub fn last_build(&self) -> DateTime<Utc> {
        *recover(&self.last_build)
    }

    pub fn is_building(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub fn sheet(&self) -> Arc<RwLock<Sheet>> {
        Arc::clone(&self.sheet)
    }

    /// Signalled whenever the sheet is edited through an [`EditHandle`].
    pub fn notify_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    pub fn edit_handle(&self) -> EditHandle {
        EditHandle {
            sheet: Arc::clone(&self.sheet),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Rebuild whatever depends on file producers changed since the last build.
    pub async fn try_run_build(&self, trigger: BuildTrigger) -> Result<BuildOutcome> {
        self.build(trigger, false).await
    }

    /// Rebuild below every file producer, changed or not.
    pub async fn force_build(&self) -> Result<BuildOutcome> {
        self.build(BuildTrigger::Manual, true).await
    }

    async fn build(&self, trigger: BuildTrigger, everything: bool) -> Result<BuildOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!(trigger = %trigger, "build already running, skipping");
            return Ok(BuildOutcome::Skipped);
        };

        let since = self.last_build();
        let (dirty, subgraph, grid): (Vec<CellRef>, _, Grid) = {
            let sheet = self.sheet.read().await;
            sheet.validate()?;
            let dirty = if everything {
                sheet.file_producers().to_vec()
            } else {
                self.tracker.dirty_file_producers(&sheet, since)
            };
            if dirty.is_empty() {
                debug!(trigger = %trigger, "nothing changed since {}", since);
                return Ok(BuildOutcome::UpToDate);
            }
            let subgraph = extract_subgraph(sheet.graph(), &dirty);
            (dirty, subgraph, sheet.grid().clone())
        };

        info!(
            trigger = %trigger,
            dirty = ?dirty.iter().map(ToString::to_string).collect::<Vec<_>>(),
            cells = subgraph.len(),
            "starting build"
        );
        let report = self.executor.run(&subgraph, &grid).await;

        // Failed cells still consume the change, so a broken command is not
        // retried on every tick.
        let finished = self.clock.now();
        *recover(&self.last_build) = finished;

        if report.is_success() {
            info!(outputs = report.outputs.len(), "build finished");
        } else {
            warn!(failures = report.failures.len(), "build finished with failures");
        }
        let outputs = report.into_result()?;
        Ok(BuildOutcome::Ran { outputs })
    }
}

/// Mutates the sheet from outside the build loop and wakes the loop up.
#[derive(Clone)]
pub struct EditHandle {
    sheet: Arc<RwLock<Sheet>>,
    notify: Arc<Notify>,
}

impl EditHandle {
    pub async fn replace_grid(&self, grid: Grid) {
        self.sheet.write().await.replace_grid(grid);
        self.notify.notify_one();
    }

    pub async fn apply_changes(&self, changes: &[CellChange]) {
        self.sheet.write().await.apply_changes(changes);
        self.notify.notify_one();
    }
}

fn recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("build state mutex poisoned, recovering");
        poisoned.into_inner()
    })
}
