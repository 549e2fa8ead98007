//! End-to-end builds with real files and `sh`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shellgrid_core::{
    BuildCoordinator, BuildOutcome, BuildTrigger, CellRef, ChangeTracker, CsvStore, Executor,
    FileSystem, Grid, GridStore, OsFileSystem, ShellRunner, Sheet,
};

fn coordinator(grid: Grid) -> BuildCoordinator {
    let fs: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
    let executor = Executor::new(Arc::new(ShellRunner::with_shell("sh")), fs.clone());
    BuildCoordinator::new(Sheet::new(grid), executor, ChangeTracker::new(fs))
        .with_last_build(Utc::now() - chrono::Duration::hours(1))
}

#[tokio::test]
async fn test_only_changed_producers_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "1\n2\n").unwrap();

    let root = dir.path().display();
    let coord = coordinator(Grid::from_rows(vec![
        vec![
            format!("FILES({}/*.txt)", root),
            "cat $A1 | wc -l | tr -d ' '".to_string(),
        ],
        vec![format!("FILES({}/*.md)", root), "echo md $A2".to_string()],
    ]));

    let BuildOutcome::Ran { outputs } = coord.try_run_build(BuildTrigger::Tick).await.unwrap()
    else {
        panic!("expected the txt branch to run");
    };
    assert_eq!(outputs[&CellRef::new(1, 0)], "2\n");
    assert!(!outputs.contains_key(&CellRef::new(1, 1)));

    let again = coord.try_run_build(BuildTrigger::Tick).await.unwrap();
    assert_eq!(again, BuildOutcome::UpToDate);

    // Stay clear of coarse filesystem timestamps.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(dir.path().join("notes.md"), "hi").unwrap();

    let BuildOutcome::Ran { outputs } = coord.try_run_build(BuildTrigger::Tick).await.unwrap()
    else {
        panic!("expected the md branch to run");
    };
    assert_eq!(
        outputs[&CellRef::new(1, 1)],
        format!("md {}/notes.md\n", root)
    );
    assert!(!outputs.contains_key(&CellRef::new(1, 0)));
}

#[tokio::test]
async fn test_saved_grid_round_trips_through_csv() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path().join("grid.csv"));
    let grid = Grid::from_rows(vec![
        vec!["FILES(src/*.rs)".to_string(), String::new(), "wc -l $A1".to_string()],
        vec![],
        vec![String::new()],
        vec!["printf '%s, %s' \"$A1\" x".to_string()],
    ]);

    store.save(&grid).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded, grid);

    let sheet = Sheet::new(loaded);
    assert_eq!(sheet.file_producers(), &[CellRef::new(0, 0)]);
    assert_eq!(
        sheet.graph().edges_out_of(&CellRef::new(0, 0)),
        &[CellRef::new(2, 0), CellRef::new(0, 3)]
    );
}
