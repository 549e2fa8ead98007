//! Cell data structures for the grid.
//!
//! - [`Grid`] - Rows of raw cell text; rows may have different lengths
//! - [`CellKind`] - What a cell's text means, derived on demand from the text

use serde::{Deserialize, Serialize};

use super::cell_ref::CellRef;

/// What a cell does when it is scheduled.
///
/// The kind is never stored; it is recomputed from the text with
/// [`CellSyntax::kind`](super::CellSyntax::kind).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellKind<'a> {
    /// No references: an inert value that still runs as a command.
    Literal,
    /// The whole cell is `FILES(<pattern>)`.
    FileProducer { pattern: &'a str },
    /// Contains at least one `$COORD` reference.
    Computed,
}

/// The spreadsheet grid: ordered rows of cell text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Grid { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.is_empty())
    }

    /// Look up a cell. Out-of-range coordinates are a miss, not an error.
    pub fn get(&self, cell: &CellRef) -> Option<&str> {
        self.rows
            .get(cell.row)
            .and_then(|row| row.get(cell.col))
            .map(String::as_str)
    }

    /// Overwrite a cell, growing the grid with empty cells as needed.
    /// Returns the previous text if the cell existed.
    pub fn set(&mut self, cell: &CellRef, text: impl Into<String>) -> Option<String> {
        if self.rows.len() <= cell.row {
            self.rows.resize_with(cell.row + 1, Vec::new);
        }
        let row = &mut self.rows[cell.row];
        if row.len() <= cell.col {
            row.resize(cell.col + 1, String::new());
            row[cell.col] = text.into();
            return None;
        }
        Some(std::mem::replace(&mut row[cell.col], text.into()))
    }

    /// Iterate over every cell with its coordinate, row by row.
    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &str)> + '_ {
        self.rows.iter().enumerate().flat_map(|(row_idx, row)| {
            row.iter()
                .enumerate()
                .map(move |(col_idx, text)| (CellRef::new(col_idx, row_idx), text.as_str()))
        })
    }
}

impl From<Vec<Vec<String>>> for Grid {
    fn from(rows: Vec<Vec<String>>) -> Self {
        Grid::from_rows(rows)
    }
}

impl<const R: usize, const C: usize> From<[[&str; C]; R]> for Grid {
    fn from(rows: [[&str; C]; R]) -> Self {
        Grid::from_rows(
            rows.iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }
}
