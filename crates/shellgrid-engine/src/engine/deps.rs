//! Dependency extraction from cell text.
//!
//! A cell refers to another cell through shell variable expansion: `$A1` or
//! `${A1}`. Bare `A1`-looking text is not a reference. The executor later
//! exports each referenced cell's output under the same variable name, so
//! these rules follow what the shell itself would expand:
//!
//! - `$A1x` and `$A1_2` name a different variable and are not references
//! - `$$A1` is the shell's pid followed by the literal text `A1`, while
//!   `$$$A1` is the pid followed by a reference
//! - `${A1}` must be closed by `}`
//!
//! Rows with leading zeros (`$F010`) and row zero (`$A0`) are not valid
//! references; they are dropped silently.

use regex::Regex;

use super::cell::CellKind;
use super::cell_ref::CellRef;

/// Compiled patterns for reading cell text.
///
/// Build one per process (or per sheet) and hand it to whatever needs to scan
/// cells; cloning is cheap since the compiled regexes are shared.
#[derive(Clone, Debug)]
pub struct CellSyntax {
    reference: Regex,
    files: Regex,
}

impl CellSyntax {
    pub fn new() -> Self {
        CellSyntax {
            reference: Regex::new(r"\$(\{?)([A-Z]+)([0-9]+)")
                .expect("cell reference regex must compile"),
            files: Regex::new(r"^FILES\((.*)\)$").expect("FILES marker regex must compile"),
        }
    }

    /// Extract every cell reference from the text, left to right.
    /// Duplicates are kept.
    pub fn references(&self, text: &str) -> Vec<CellRef> {
        let bytes = text.as_bytes();
        let mut refs = Vec::new();

        for caps in self.reference.captures_iter(text) {
            let whole = caps.get(0).expect("group 0 always matches");
            let braced = !caps[1].is_empty();

            // "$$" is a special shell parameter, so an odd run of `$` before
            // the match swallows its sigil.
            let dollars = bytes[..whole.start()]
                .iter()
                .rev()
                .take_while(|&&b| b == b'$')
                .count();
            if dollars % 2 == 1 {
                continue;
            }

            let next = bytes.get(whole.end()).copied();
            if braced {
                if next != Some(b'}') {
                    continue;
                }
            } else if next.is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
                continue;
            }

            let Some(col) = CellRef::letters_to_col(&caps[2]) else {
                continue;
            };
            let Some(row) = CellRef::parse_row(&caps[3]) else {
                continue;
            };
            refs.push(CellRef::new(col, row));
        }

        refs
    }

    /// Return the glob pattern if the whole (trimmed) cell is a `FILES(...)` marker.
    pub fn file_pattern<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.files
            .captures(text.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    pub fn is_file_producer(&self, text: &str) -> bool {
        self.file_pattern(text).is_some()
    }

    /// Classify a cell by its text.
    pub fn kind<'a>(&self, text: &'a str) -> CellKind<'a> {
        if let Some(pattern) = self.file_pattern(text) {
            CellKind::FileProducer { pattern }
        } else if self.references(text).is_empty() {
            CellKind::Literal
        } else {
            CellKind::Computed
        }
    }
}

impl Default for CellSyntax {
    fn default() -> Self {
        Self::new()
    }
}
