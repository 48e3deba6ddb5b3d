//! sheetql-core - cached SQL queries over spreadsheet ranges and other providers.

pub mod cache;
pub mod config;
pub mod error;
pub mod functions;
pub mod providers;
pub mod query;
pub mod services;
pub mod storage;
pub mod workbook;

pub use cache::{Cache, CacheProvider, FileCacheProvider, MemoryCacheProvider};
pub use config::Config;
pub use error::{Result, SheetqlError};
pub use providers::{MemoryProvider, NamedRangeProvider};
pub use query::{CacheKeySelector, ExecutionContext, Queryable, QueryableProvider, TableMethods};
pub use services::{Services, ServicesBuilder};
pub use workbook::{CellRef, CellValue, RangeRef, Workbook};

pub use sheetql_engine::{QueryOutput, Row, RowSet};
