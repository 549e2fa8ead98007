//! CSV storage.
//!
//! Every cell is stored exactly as typed, so loading a saved grid gives the
//! same rows back. Rules on top of plain RFC 4180:
//! - an empty cell is an empty field
//! - a row holding a single empty cell is written as `""`, since a blank line
//!   is an empty row
//! - fields with surrounding whitespace are quoted and never trimmed
//! - quoted fields may span lines

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use shellgrid_engine::engine::Grid;
use tracing::debug;

use super::GridStore;
use crate::error::{CoreError, Result};

/// A grid stored in one CSV file.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl GridStore for CsvStore {
    fn load(&self) -> Result<Grid> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no data file yet, starting empty");
                return Ok(Grid::new());
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Grid::from_rows(parse_csv_content(&content)?))
    }

    fn save(&self, grid: &Grid) -> Result<()> {
        std::fs::write(&self.path, write_csv_content(grid.rows()))?;
        debug!(path = %self.path.display(), rows = grid.row_count(), "grid saved");
        Ok(())
    }

    fn modified(&self) -> Result<Option<DateTime<Utc>>> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(DateTime::<Utc>::from(meta.modified()?))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Parse a whole CSV document into rows.
pub(crate) fn parse_csv_content(content: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Whether the current record has anything in it, even an empty quoted field.
    let mut started = false;
    let mut line = 1;
    let mut quote_line = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => {
                    if c == '\n' {
                        line += 1;
                    }
                    field.push(c);
                }
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                quote_line = line;
                started = true;
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if started {
                    row.push(std::mem::take(&mut field));
                }
                rows.push(std::mem::take(&mut row));
                started = false;
                line += 1;
            }
            _ => {
                field.push(c);
                started = true;
            }
        }
    }

    if in_quotes {
        return Err(CoreError::Csv {
            line: quote_line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if started {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

/// Render rows as CSV, one line per row.
pub(crate) fn write_csv_content(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        if let [only] = row.as_slice()
            && only.is_empty()
        {
            out.push_str("\"\"");
        } else {
            let fields: Vec<String> = row.iter().map(|field| escape_csv_field(field)).collect();
            out.push_str(&fields.join(","));
        }
        out.push('\n');
    }
    out
}

/// Escape a field for CSV output
fn escape_csv_field(field: &str) -> String {
    let needs_quotes = field.contains(',')
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r')
        || field.trim() != field;
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
