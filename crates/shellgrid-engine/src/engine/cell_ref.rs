//! Cell reference parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style cell references
//! (e.g., "A1", "B2", "AA100") and zero-indexed row/column coordinates.
//!
//! Column letters are bijective base-26: there is no zero digit, so "Z" is
//! followed by "AA". Row numbers are 1-based in text and must not carry
//! leading zeros.
//!
//! # Examples
//!
//! ```
//! use shellgrid_engine::engine::CellRef;
//!
//! let cell = CellRef::from_str("B3").unwrap();
//! assert_eq!(cell.col, 1);  // 0-indexed
//! assert_eq!(cell.row, 2);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to a cell by row and column indices (0-indexed).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(col: usize, row: usize) -> CellRef {
        CellRef { row, col }
    }

    /// Parse a cell reference from spreadsheet notation (e.g., "A1", "B2", "AA10").
    /// Returns None if the input is invalid.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<CellRef> {
        Self::parse_a1(name)
    }

    fn parse_a1(name: &str) -> Option<CellRef> {
        let split = name.find(|c: char| !c.is_ascii_uppercase())?;
        let (letters, numbers) = name.split_at(split);
        if letters.is_empty() || numbers.is_empty() {
            return None;
        }
        let col = Self::letters_to_col(letters)?;
        let row = Self::parse_row(numbers)?;
        Some(CellRef::new(col, row))
    }

    /// Parse the 1-based row digits into a 0-based row.
    ///
    /// The digits must reformat to exactly the same text, which rejects
    /// leading zeros ("010") and signs; row 0 is rejected too.
    pub(crate) fn parse_row(digits: &str) -> Option<usize> {
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number = digits.parse::<usize>().ok()?;
        if number.to_string() != digits {
            return None;
        }
        number.checked_sub(1)
    }

    /// Convert uppercase column letters to a 0-based column index.
    pub(crate) fn letters_to_col(letters: &str) -> Option<usize> {
        let mut col_acc = 0usize;
        for c in letters.bytes() {
            if !c.is_ascii_uppercase() {
                return None;
            }
            let digit = (c - b'A') as usize + 1;
            col_acc = col_acc.checked_mul(26)?.checked_add(digit)?;
        }
        col_acc.checked_sub(1)
    }

    /// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
    pub fn col_to_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col as u128 + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }
}

impl std::str::FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_a1(s).ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CellRef::col_to_letters(self.col), self.row + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::CellRef;

    #[test]
    fn test_parse_a1_overflow_returns_none() {
        let huge = format!("{}1", "Z".repeat(40));
        assert!(CellRef::from_str(&huge).is_none());
    }

    #[test]
    fn test_col_to_letters_handles_max_usize() {
        let letters = CellRef::col_to_letters(usize::MAX);
        assert!(!letters.is_empty());
        assert!(letters.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_col_to_letters_known_values() {
        assert_eq!(CellRef::col_to_letters(0), "A");
        assert_eq!(CellRef::col_to_letters(25), "Z");
        assert_eq!(CellRef::col_to_letters(26), "AA");
        assert_eq!(CellRef::col_to_letters(27), "AB");
        assert_eq!(CellRef::col_to_letters(156), "FA");
        assert_eq!(CellRef::col_to_letters(3000), "DKK");
    }

    #[test]
    fn test_leading_zero_rows_are_rejected() {
        assert!(CellRef::from_str("F010").is_none());
        assert!(CellRef::from_str("A01").is_none());
        assert!(CellRef::from_str("A0").is_none());
        assert_eq!(CellRef::from_str("F10"), Some(CellRef::new(5, 9)));
    }

    #[test]
    fn test_parse_std_from_str_reports_input() {
        let err = "A0".parse::<CellRef>().unwrap_err();
        assert!(err.contains("A0"));
        assert_eq!("C7".parse::<CellRef>(), Ok(CellRef::new(2, 6)));
    }

    #[test]
    fn test_column_round_trip_first_million() {
        for i in 0..1_000_000usize {
            let text = format!("{}1", CellRef::col_to_letters(i));
            let parsed = CellRef::from_str(&text).map(|c| c.col);
            assert_eq!(parsed, Some(i), "column {} via {}", i, text);
        }
    }

    #[test]
    fn test_display_round_trip() {
        for (col, row) in [(0, 0), (27, 2), (3000, 6), (701, 99_999)] {
            let cell = CellRef::new(col, row);
            assert_eq!(CellRef::from_str(&cell.to_string()), Some(cell));
        }
    }
}
