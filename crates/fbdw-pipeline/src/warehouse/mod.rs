//! Destination tables and the bulk loader behind them.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use fbdw_core::{FieldMapping, Record};
use serde::Deserialize;
use thiserror::Error;

pub use memory::MemoryWarehouse;
pub use postgres::PgWarehouse;

/// Postgres caps one statement at this many bind parameters.
pub const MAX_BIND_PARAMS: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Insert on top of whatever the table holds.
    #[default]
    Append,
    /// Truncate then insert, in the same transaction.
    Replace,
}

/// Schema-qualified table name. Displays quoted, ready to splice into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn bronze(name: impl Into<String>) -> Self {
        Self::new("bronze", name)
    }

    pub fn silver(name: impl Into<String>) -> Self {
        Self::new("silver", name)
    }

    /// `bronze.staging_squad_stats`, unquoted, for logs and summaries.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `UPDATE table SET column = to WHERE column = from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFix {
    pub column: String,
    pub from: String,
    pub to: String,
}

impl ColumnFix {
    pub fn new(column: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("connecting to the warehouse: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("{action} on {table}: {source}")]
    Database {
        action: &'static str,
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("applying migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("table {0} does not exist")]
    UnknownTable(String),
    #[error("load into {table} rejected: {reason}")]
    Rejected { table: String, reason: String },
    #[error("warehouse connection already closed")]
    Closed,
}

/// Where normalized records end up.
///
/// Every `load`/`replace_values` call is one transaction: it either applies
/// completely or leaves the destination untouched.
#[async_trait]
pub trait Warehouse: Send {
    fn name(&self) -> &'static str;

    /// Inserts `rows` laid out by `mapping`, truncating first in [`LoadMode::Replace`].
    /// Returns the number of rows inserted.
    async fn load(
        &mut self,
        table: &TableRef,
        mapping: &FieldMapping,
        rows: &[Record],
        mode: LoadMode,
    ) -> Result<u64, LoadError>;

    /// Reads `columns` of every row as text; SQL nulls stay null.
    async fn fetch_text(&mut self, table: &TableRef, columns: &[&str]) -> Result<Vec<Record>, LoadError>;

    /// Applies all fixes in one transaction and returns the number of rows changed.
    async fn replace_values(&mut self, table: &TableRef, fixes: &[ColumnFix]) -> Result<u64, LoadError>;

    /// Distinct non-null values of one column, as text, sorted.
    async fn distinct_values(&mut self, table: &TableRef, column: &str) -> Result<Vec<String>, LoadError>;

    async fn close(&mut self) -> Result<(), LoadError> {
        Ok(())
    }
}

/// Rows per `INSERT` so one statement stays under [`MAX_BIND_PARAMS`].
pub fn rows_per_batch(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}
