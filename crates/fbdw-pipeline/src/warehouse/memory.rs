use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use fbdw_core::{normalize_record, FieldMapping, Record, Value};
use tracing::info;

use super::{ColumnFix, LoadError, LoadMode, TableRef, Warehouse};

/// Process-local warehouse for dry runs and tests.
///
/// Tables spring into existence on first load. Loads into a table named with
/// [`MemoryWarehouse::fail_loads_into`] are rejected without touching it, which
/// is how tests exercise rollback.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: BTreeMap<TableRef, Vec<Record>>,
    failing: BTreeSet<TableRef>,
    truncations: BTreeMap<TableRef, usize>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableRef, rows: Vec<Record>) -> Self {
        self.tables.insert(table, rows);
        self
    }

    pub fn fail_loads_into(&mut self, table: TableRef) {
        self.failing.insert(table);
    }

    pub fn rows(&self, table: &TableRef) -> &[Record] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn truncations(&self, table: &TableRef) -> usize {
        self.truncations.get(table).copied().unwrap_or(0)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&TableRef, usize)> {
        self.tables.iter().map(|(table, rows)| (table, rows.len()))
    }

    fn existing(&self, table: &TableRef) -> Result<&Vec<Record>, LoadError> {
        self.tables
            .get(table)
            .ok_or_else(|| LoadError::UnknownTable(table.qualified()))
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(
        &mut self,
        table: &TableRef,
        mapping: &FieldMapping,
        rows: &[Record],
        mode: LoadMode,
    ) -> Result<u64, LoadError> {
        if self.failing.contains(table) {
            return Err(LoadError::Rejected {
                table: table.qualified(),
                reason: "configured to fail".to_string(),
            });
        }

        let stored = self.tables.entry(table.clone()).or_default();
        if mode == LoadMode::Replace {
            stored.clear();
            *self.truncations.entry(table.clone()).or_default() += 1;
        }
        stored.extend(rows.iter().map(|row| normalize_record(row, mapping)));
        info!(table = %table.qualified(), rows = rows.len(), ?mode, "memory load");
        Ok(rows.len() as u64)
    }

    async fn fetch_text(&mut self, table: &TableRef, columns: &[&str]) -> Result<Vec<Record>, LoadError> {
        Ok(self
            .existing(table)?
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| {
                        let text = row.get(column).and_then(Value::as_text).map(|t| t.into_owned());
                        (*column, Value::from(text))
                    })
                    .collect()
            })
            .collect())
    }

    async fn replace_values(&mut self, table: &TableRef, fixes: &[ColumnFix]) -> Result<u64, LoadError> {
        let rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| LoadError::UnknownTable(table.qualified()))?;
        let mut changed = 0u64;
        for fix in fixes {
            for row in rows.iter_mut() {
                if row.text(&fix.column).as_deref() == Some(fix.from.as_str()) {
                    row.insert(fix.column.as_str(), fix.to.as_str());
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn distinct_values(&mut self, table: &TableRef, column: &str) -> Result<Vec<String>, LoadError> {
        let values: BTreeSet<String> = self
            .existing(table)?
            .iter()
            .filter_map(|row| row.text(column).map(|t| t.into_owned()))
            .collect();
        Ok(values.into_iter().collect())
    }
}
