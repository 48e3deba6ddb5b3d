use serde_json::Value;
use sheetql_engine::{Row, RowSet};
use tracing::debug;

use super::table_name;
use crate::error::{Result, SheetqlError};
use crate::query::{Queryable, QueryableProvider, TableMethods};
use crate::services::Services;
use crate::workbook::{CellValue, RangeRef, Workbook};

/// Named ranges of a workbook as tables: the first row of the range is the
/// header, every other row a record. `FROM RANGE('name')`, `INTO RANGE('name')`.
#[derive(Clone)]
pub struct NamedRangeProvider {
    workbook: Workbook,
}

/// A resolved named range and its validated header.
struct Table {
    range: RangeRef,
    header: Vec<String>,
    cells: Vec<Vec<CellValue>>,
}

impl NamedRangeProvider {
    pub const TABLE: &'static str = "RANGE";

    pub fn new(workbook: Workbook) -> Self {
        NamedRangeProvider { workbook }
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    fn resolve(&self, name: &str) -> Result<Table> {
        let range = self.workbook.named_range(name)?;
        let cells = self.workbook.read_range(&range);
        let header_cells = cells.first().map(Vec::as_slice).unwrap_or_default();
        if header_cells.iter().all(CellValue::is_blank) {
            return Err(SheetqlError::EmptyRange(name.to_string()));
        }
        if let Some(column) = header_cells.iter().position(CellValue::is_blank) {
            return Err(SheetqlError::BlankHeader {
                range: name.to_string(),
                column: column + 1,
            });
        }
        let header = header_cells.iter().map(CellValue::display).collect();
        Ok(Table { range, header, cells })
    }

    /// Records of a named range, in header order.
    pub fn read(&self, name: &str) -> Result<RowSet> {
        let table = self.resolve(name)?;
        let rows = table
            .cells
            .iter()
            .skip(1)
            .map(|cells| {
                table
                    .header
                    .iter()
                    .zip(cells)
                    .map(|(column, cell)| (column.clone(), cell.to_json()))
                    .collect::<Row>()
            })
            .collect();
        Ok(RowSet::new(table.header, rows))
    }

    /// Replace a named range's records, resizing the range to fit.
    ///
    /// The column set must equal the header exactly. Nothing is written when
    /// it does not.
    pub fn write(&self, name: &str, rows: &RowSet) -> Result<usize> {
        let table = self.resolve(name)?;
        let missing: Vec<String> = table
            .header
            .iter()
            .filter(|c| !rows.columns.contains(c))
            .cloned()
            .collect();
        let unexpected: Vec<String> = rows
            .columns
            .iter()
            .filter(|c| !table.header.contains(c))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(SheetqlError::ColumnMismatch {
                range: name.to_string(),
                missing,
                unexpected,
            });
        }

        let mut grid = Vec::with_capacity(rows.len() + 1);
        grid.push(
            table
                .header
                .iter()
                .map(|c| CellValue::Text(c.clone()))
                .collect::<Vec<_>>(),
        );
        for row in &rows.rows {
            grid.push(
                table
                    .header
                    .iter()
                    .map(|c| row.get(c).map(CellValue::from_json).unwrap_or_default())
                    .collect(),
            );
        }

        let resized = table.range.with_rows(grid.len());
        self.workbook.clear_range(&table.range);
        self.workbook.write_range(table.range.start, &grid);
        self.workbook.define_name(name, resized);
        debug!(range = name, from = %table.range, to = %resized, "named range rewritten");
        Ok(rows.len())
    }

    fn from_range(&self, args: &[Value]) -> Result<RowSet> {
        self.read(&table_name(Self::TABLE, args)?)
    }

    fn into_range(&self, args: &[Value], rows: &RowSet) -> Result<usize> {
        self.write(&table_name(Self::TABLE, args)?, rows)
    }
}

impl QueryableProvider for NamedRangeProvider {
    const PROVIDER_TYPE: &'static str = "NamedRangeProvider";

    fn table_methods() -> TableMethods<Self> {
        TableMethods::new()
            .with_from(Self::TABLE, NamedRangeProvider::from_range)
            .with_into(Self::TABLE, NamedRangeProvider::into_range)
    }
}

impl Queryable<NamedRangeProvider> {
    /// Query the named ranges of `workbook`.
    pub fn for_workbook(workbook: Workbook, services: &Services) -> Result<Self> {
        Queryable::new(NamedRangeProvider::new(workbook), services)
    }
}
