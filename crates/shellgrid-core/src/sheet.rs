//! Sheet state: the grid plus the graph derived from it.
//!
//! The graph is never patched in place. Any edit rebuilds it from a full
//! scan, so it always matches the grid it was derived from.

use serde::{Deserialize, Serialize};
use shellgrid_engine::engine::{
    CellRef, CellSyntax, CycleReport, DependencyGraph, Grid, SheetGraph, detect_cycles,
};

use crate::error::{CoreError, CycleErrors, Result};

/// A single cell edit, as sent by an editor front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    pub row: usize,
    pub column: usize,
    pub new_value: String,
}

impl CellChange {
    pub fn new(cell: CellRef, new_value: impl Into<String>) -> Self {
        CellChange {
            row: cell.row,
            column: cell.col,
            new_value: new_value.into(),
        }
    }

    pub fn cell(&self) -> CellRef {
        CellRef::new(self.column, self.row)
    }
}

/// UI-agnostic sheet state.
#[derive(Debug, Clone)]
pub struct Sheet {
    grid: Grid,
    graph: SheetGraph,
    syntax: CellSyntax,
}

impl Sheet {
    pub fn new(grid: Grid) -> Self {
        Self::with_syntax(grid, CellSyntax::new())
    }

    pub fn with_syntax(grid: Grid, syntax: CellSyntax) -> Self {
        let graph = SheetGraph::from_grid(&grid, &syntax);
        Sheet {
            grid,
            graph,
            syntax,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn graph(&self) -> &DependencyGraph<CellRef> {
        &self.graph.graph
    }

    /// `FILES(...)` cells in row-major order.
    pub fn file_producers(&self) -> &[CellRef] {
        &self.graph.file_producers
    }

    pub fn syntax(&self) -> &CellSyntax {
        &self.syntax
    }

    pub fn cell(&self, cell: &CellRef) -> Option<&str> {
        self.grid.get(cell)
    }

    pub fn cycle_reports(&self) -> Vec<CycleReport<CellRef>> {
        detect_cycles(self.graph())
    }

    /// Fail with every cycle and self reference if the sheet cannot be scheduled.
    pub fn validate(&self) -> Result<()> {
        let reports = self.cycle_reports();
        if reports.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Cycles(CycleErrors(reports)))
        }
    }

    pub fn replace_grid(&mut self, grid: Grid) {
        self.grid = grid;
        self.rebuild_graph();
    }

    /// Apply edits in order; later edits to the same cell win.
    pub fn apply_changes(&mut self, changes: &[CellChange]) {
        if changes.is_empty() {
            return;
        }
        for change in changes {
            self.grid.set(&change.cell(), change.new_value.clone());
        }
        self.rebuild_graph();
    }

    fn rebuild_graph(&mut self) {
        self.graph = SheetGraph::from_grid(&self.grid, &self.syntax);
    }
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new(Grid::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_collects_all_reports() {
        let sheet = Sheet::new(Grid::from([["echo $A2", "echo $B1"], ["echo $A1", "echo 1"]]));
        let Err(CoreError::Cycles(errors)) = sheet.validate() else {
            panic!("expected cycle errors");
        };
        assert_eq!(errors.0.len(), 2);
        assert_eq!(errors.to_string(), "Cycle: A1, A2\nSelf reference: B1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_validate_long_chain_on_worker_thread() {
        let mut rows = vec![vec!["FILES(*.txt)".to_string()]];
        rows.extend((1..200_000).map(|row| vec![format!("echo $A{}", row)]));
        let sheet = Sheet::new(Grid::from_rows(rows));

        let validated = tokio::spawn(async move { sheet.validate().is_ok() })
            .await
            .unwrap();
        assert!(validated);
    }

    #[test]
    fn test_apply_changes_rebuilds_graph() {
        let mut sheet = Sheet::new(Grid::from([["FILES(*.txt)", "echo hi"]]));
        assert!(sheet.graph().is_empty());
        assert_eq!(sheet.file_producers(), &[CellRef::new(0, 0)]);

        sheet.apply_changes(&[
            CellChange::new(CellRef::new(1, 0), "wc -w $A1"),
            CellChange::new(CellRef::new(0, 1), "FILES(*.md)"),
        ]);

        assert_eq!(
            sheet.graph().edges_out_of(&CellRef::new(0, 0)),
            &[CellRef::new(1, 0)]
        );
        assert_eq!(
            sheet.file_producers(),
            &[CellRef::new(0, 0), CellRef::new(0, 1)]
        );
        assert_eq!(sheet.cell(&CellRef::new(1, 1)), None);
    }

    #[test]
    fn test_replace_grid_drops_old_edges() {
        let mut sheet = Sheet::new(Grid::from([["echo $B1", "echo $A1"]]));
        assert!(sheet.validate().is_err());
        sheet.replace_grid(Grid::from([["echo 1", "echo 2"]]));
        assert!(sheet.validate().is_ok());
        assert!(sheet.graph().is_empty());
    }

    #[test]
    fn test_cell_change_json_shape() {
        let change: CellChange =
            serde_json::from_str(r#"{"row": 2, "column": 1, "newValue": "echo $A1"}"#).unwrap();
        assert_eq!(change.cell(), CellRef::new(1, 2));
        assert_eq!(change.new_value, "echo $A1");
    }
}
