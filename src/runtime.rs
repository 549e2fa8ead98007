//! Wiring and the long-running build loop.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use shellgrid_core::{
    BuildCoordinator, BuildOutcome, BuildTrigger, ChangeTracker, CoreError, CsvStore, Executor,
    FileSystem, GridStore, OsFileSystem, ShellRunner, Sheet,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Log to stderr so stdout only carries cell output.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("shellgrid=debug,shellgrid_core=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("shellgrid=info,shellgrid_core=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub struct App {
    store: CsvStore,
    coordinator: Arc<BuildCoordinator>,
    shutdown: watch::Sender<bool>,
    tick: Duration,
}

impl App {
    /// Load the grid and set up a coordinator for it.
    pub fn open(config: &Config, data_file: PathBuf) -> anyhow::Result<Self> {
        let store = CsvStore::new(data_file);
        let grid = store
            .load()
            .with_context(|| format!("failed to load {}", store.path().display()))?;
        // A new grid counts as built now, so only later file changes run it.
        let last_build = store.modified()?.unwrap_or_else(Utc::now);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
        let executor = Executor::new(Arc::new(ShellRunner::with_shell(&config.shell)), fs.clone())
            .with_max_parallel(config.max_parallel)
            .with_shutdown(shutdown_rx);
        let coordinator = BuildCoordinator::new(Sheet::new(grid), executor, ChangeTracker::new(fs))
            .with_last_build(last_build);

        info!(
            path = %store.path().display(),
            since = %last_build,
            "grid loaded"
        );
        Ok(App {
            store,
            coordinator: Arc::new(coordinator),
            shutdown,
            tick: Duration::from_secs(config.tick_seconds),
        })
    }

    /// Print every cycle and self reference. Returns the exit code.
    pub async fn check(&self) -> i32 {
        let sheet = self.coordinator.sheet();
        let reports = sheet.read().await.cycle_reports();
        if reports.is_empty() {
            println!("No cycles found");
            return 0;
        }
        for report in reports {
            println!("{}", report);
        }
        1
    }

    /// Run a single build and print the outputs in cell order.
    pub async fn run_once(&self, all: bool) -> anyhow::Result<()> {
        let outcome = if all {
            self.coordinator.force_build().await?
        } else {
            self.coordinator.try_run_build(BuildTrigger::Manual).await?
        };
        match outcome {
            BuildOutcome::Ran { outputs } => {
                let sorted: BTreeMap<_, _> = outputs.into_iter().collect();
                for (cell, output) in sorted {
                    println!("{}: {}", cell, output.trim_end());
                }
            }
            BuildOutcome::UpToDate => println!("Up to date"),
            BuildOutcome::Skipped => {}
        }
        Ok(())
    }

    /// Build on every tick and edit until interrupted, then save the grid.
    pub async fn serve(self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let notify = self.coordinator.notify_handle();
        let mut builds: JoinSet<()> = JoinSet::new();
        let mut seen = self.store.modified()?;

        let signal = wait_for_signal();
        tokio::pin!(signal);

        info!(tick = ?self.tick, "watching for changes");
        loop {
            tokio::select! {
                result = &mut signal => {
                    if let Err(err) = result {
                        error!(error = %err, "cannot listen for signals");
                    }
                    info!("shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.reload_if_changed(&mut seen).await;
                    self.spawn_build(&mut builds, BuildTrigger::Tick);
                }
                _ = notify.notified() => {
                    self.spawn_build(&mut builds, BuildTrigger::Edit);
                }
                Some(joined) = builds.join_next() => {
                    if let Err(err) = joined {
                        error!(error = %err, "build task failed");
                    }
                }
            }
        }

        self.shutdown.send_replace(true);
        while let Some(joined) = builds.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "build task failed");
            }
        }

        let sheet = self.coordinator.sheet();
        let grid = sheet.read().await.grid().clone();
        self.store
            .save(&grid)
            .with_context(|| format!("failed to save {}", self.store.path().display()))?;
        info!(path = %self.store.path().display(), "grid saved");
        Ok(())
    }

    fn spawn_build(&self, builds: &mut JoinSet<()>, trigger: BuildTrigger) {
        let coordinator = Arc::clone(&self.coordinator);
        builds.spawn(async move {
            log_outcome(trigger, coordinator.try_run_build(trigger).await);
        });
    }

    /// Pick up edits made to the data file by other programs.
    async fn reload_if_changed(&self, seen: &mut Option<DateTime<Utc>>) {
        let modified = match self.store.modified() {
            Ok(modified) => modified,
            Err(err) => {
                warn!(error = %err, "cannot stat data file");
                return;
            }
        };
        if modified == *seen {
            return;
        }
        match self.store.load() {
            Ok(grid) => {
                info!(path = %self.store.path().display(), "data file changed, reloading");
                self.coordinator.edit_handle().replace_grid(grid).await;
                *seen = modified;
            }
            Err(err) => warn!(error = %err, "cannot reload data file, keeping current grid"),
        }
    }
}

fn log_outcome(trigger: BuildTrigger, outcome: Result<BuildOutcome, CoreError>) {
    match outcome {
        Ok(BuildOutcome::Ran { outputs }) => {
            let sorted: BTreeMap<_, _> = outputs.into_iter().collect();
            for (cell, output) in sorted {
                debug!(cell = %cell, "{}", output.trim_end());
            }
        }
        Ok(BuildOutcome::UpToDate) => {}
        Ok(BuildOutcome::Skipped) => debug!(trigger = %trigger, "build already running"),
        Err(err) => {
            for line in err.to_string().lines() {
                error!(trigger = %trigger, "{}", line);
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
