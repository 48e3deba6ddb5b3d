//! Rectangular ranges such as `A1:C10`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::cell::CellRef;
use crate::error::{Result, SheetqlError};

/// Inclusive rectangle; `start` is always the top-left corner.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeRef {
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeRef {
    /// Build from any two opposite corners.
    pub fn new(a: CellRef, b: CellRef) -> Self {
        RangeRef {
            start: CellRef::new(a.col.min(b.col), a.row.min(b.row)),
            end: CellRef::new(a.col.max(b.col), a.row.max(b.row)),
        }
    }

    /// Parse `A1:C3` (or a single cell `B2`).
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || SheetqlError::InvalidRange(text.to_string());
        match text.split_once(':') {
            Some((a, b)) => {
                let a = CellRef::parse(a).ok_or_else(invalid)?;
                let b = CellRef::parse(b).ok_or_else(invalid)?;
                Ok(RangeRef::new(a, b))
            }
            None => {
                let cell = CellRef::parse(text).ok_or_else(invalid)?;
                Ok(RangeRef::new(cell, cell))
            }
        }
    }

    pub fn rows(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    pub fn cols(&self) -> usize {
        self.end.col - self.start.col + 1
    }

    /// Same top-left corner and width, `rows` tall.
    pub fn with_rows(&self, rows: usize) -> Self {
        let rows = rows.max(1);
        RangeRef {
            start: self.start,
            end: CellRef::new(self.end.col, self.start.row + rows - 1),
        }
    }

    pub fn contains(&self, cell: &CellRef) -> bool {
        (self.start.col..=self.end.col).contains(&cell.col)
            && (self.start.row..=self.end.row).contains(&cell.row)
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises_corners() {
        let range = RangeRef::parse("C3:A1").unwrap();
        assert_eq!(range.to_string(), "A1:C3");
        assert_eq!((range.rows(), range.cols()), (3, 3));
        assert_eq!(RangeRef::parse("B2").unwrap().to_string(), "B2:B2");
        assert!(matches!(RangeRef::parse("A1:"), Err(SheetqlError::InvalidRange(_))));
    }

    #[test]
    fn test_with_rows_resizes_from_top() {
        let range = RangeRef::parse("B2:D4").unwrap();
        assert_eq!(range.with_rows(5).to_string(), "B2:D6");
        assert_eq!(range.with_rows(0).to_string(), "B2:D2");
        assert!(range.contains(&CellRef::new(2, 2)));
        assert!(!range.contains(&CellRef::new(0, 2)));
    }
}
