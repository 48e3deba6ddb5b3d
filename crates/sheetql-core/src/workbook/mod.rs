//! In-process spreadsheet: a sparse cell grid plus named ranges.

mod cell;
mod range;

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::{Result, SheetqlError};

pub use cell::{CellRef, CellValue};
pub use range::RangeRef;

/// Sparse grid. DashMap is internally sharded; the `Arc` makes clones cheap.
pub type Grid = Arc<DashMap<CellRef, CellValue>>;

/// A workbook with one sheet. Clones share the same cells and names.
#[derive(Clone, Default)]
pub struct Workbook {
    grid: Grid,
    /// Named ranges by upper-cased name, with the name as defined.
    names: Arc<DashMap<String, (String, RangeRef)>>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cell: &CellRef) -> CellValue {
        self.grid
            .get(cell)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    /// Setting `Empty` removes the cell.
    pub fn set(&self, cell: CellRef, value: CellValue) {
        if value == CellValue::Empty {
            self.grid.remove(&cell);
        } else {
            self.grid.insert(cell, value);
        }
    }

    pub fn set_a1(&self, cell: &str, value: CellValue) -> Result<()> {
        let cell = CellRef::parse(cell).ok_or_else(|| SheetqlError::InvalidRange(cell.to_string()))?;
        self.set(cell, value);
        Ok(())
    }

    /// Number of non-empty cells.
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Bind `name` to `range`, replacing any earlier binding.
    pub fn define_name(&self, name: &str, range: RangeRef) {
        self.names
            .insert(name.to_ascii_uppercase(), (name.to_string(), range));
    }

    pub fn remove_name(&self, name: &str) -> Option<RangeRef> {
        self.names
            .remove(&name.to_ascii_uppercase())
            .map(|(_, (_, range))| range)
    }

    /// Look up a named range (case-insensitive).
    pub fn named_range(&self, name: &str) -> Result<RangeRef> {
        self.names
            .get(&name.to_ascii_uppercase())
            .map(|entry| entry.value().1)
            .ok_or_else(|| SheetqlError::UnknownNamedRange(name.to_string()))
    }

    /// Defined names with their ranges, sorted by name.
    pub fn names(&self) -> Vec<(String, RangeRef)> {
        let mut names: Vec<(String, RangeRef)> =
            self.names.iter().map(|e| e.value().clone()).collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names
    }

    /// Cell values row by row.
    pub fn read_range(&self, range: &RangeRef) -> Vec<Vec<CellValue>> {
        (range.start.row..=range.end.row)
            .map(|row| {
                (range.start.col..=range.end.col)
                    .map(|col| self.get(&CellRef::new(col, row)))
                    .collect()
            })
            .collect()
    }

    /// Write `rows` with their first cell at `start`.
    pub fn write_range(&self, start: CellRef, rows: &[Vec<CellValue>]) {
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                self.set(CellRef::new(start.col + c, start.row + r), value.clone());
            }
        }
    }

    pub fn clear_range(&self, range: &RangeRef) {
        self.grid.retain(|cell, _| !range.contains(cell));
    }

    /// Smallest range covering every non-empty cell.
    pub fn used_range(&self) -> Option<RangeRef> {
        let mut cells = self.grid.iter().map(|e| *e.key());
        let first = cells.next()?;
        let (mut min, mut max) = (first, first);
        for cell in cells {
            min = CellRef::new(min.col.min(cell.col), min.row.min(cell.row));
            max = CellRef::new(max.col.max(cell.col), max.row.max(cell.row));
        }
        Some(RangeRef::new(min, max))
    }
}
