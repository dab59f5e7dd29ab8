use async_trait::async_trait;
use chrono::NaiveDate;
use fbdw_core::{coerce_date, coerce_decimal, parse_integer, ColumnType, FieldMapping, Record, Value};
use sqlx::postgres::Postgres;
use sqlx::query_builder::Separated;
use sqlx::{Connection, PgConnection, QueryBuilder, Row};
use tracing::{debug, info};

use super::{quote_ident, rows_per_batch, ColumnFix, LoadError, LoadMode, TableRef, Warehouse};

const ISO_DATE: &str = "%Y-%m-%d";

fn db_error<'a>(action: &'static str, table: &'a TableRef) -> impl FnOnce(sqlx::Error) -> LoadError + 'a {
    move |source| LoadError::Database {
        action,
        table: table.qualified(),
        source,
    }
}

/// Postgres warehouse over one connection held for the whole run.
pub struct PgWarehouse {
    conn: Option<PgConnection>,
}

impl PgWarehouse {
    pub async fn connect(database_url: &str) -> Result<Self, LoadError> {
        let conn = PgConnection::connect(database_url)
            .await
            .map_err(LoadError::Connect)?;
        info!("connected to warehouse");
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut PgConnection, LoadError> {
        self.conn.as_mut().ok_or(LoadError::Closed)
    }

    /// Creates the bronze and silver schemas and tables.
    pub async fn migrate(&mut self) -> Result<(), LoadError> {
        let conn = self.conn()?;
        sqlx::migrate!("../../migrations").run(conn).await?;
        info!("migrations applied");
        Ok(())
    }
}

fn bind_value(row: &mut Separated<'_, '_, Postgres, &'static str>, column_type: &ColumnType, value: Option<&Value>) {
    match column_type {
        ColumnType::Text => {
            row.push_bind(value.and_then(Value::as_text).map(|t| t.into_owned()));
        }
        ColumnType::Integer | ColumnType::NullableInteger => {
            row.push_bind(parse_integer(value));
        }
        ColumnType::Decimal => {
            row.push_bind(coerce_decimal(value));
        }
        ColumnType::Date { format } => {
            let date: Option<NaiveDate> =
                coerce_date(value, format).or_else(|| coerce_date(value, ISO_DATE));
            row.push_bind(date);
        }
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn load(
        &mut self,
        table: &TableRef,
        mapping: &FieldMapping,
        rows: &[Record],
        mode: LoadMode,
    ) -> Result<u64, LoadError> {
        let conn = self.conn()?;
        let mut tx = conn.begin().await.map_err(db_error("begin", table))?;

        if mode == LoadMode::Replace {
            sqlx::query(&format!("TRUNCATE TABLE {table}"))
                .execute(&mut *tx)
                .await
                .map_err(db_error("truncate", table))?;
        }

        let columns = mapping
            .columns()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");
        let mut inserted = 0u64;
        for chunk in rows.chunks(rows_per_batch(mapping.len())) {
            let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {table} ({columns}) "));
            qb.push_values(chunk, |mut row, record| {
                for field in mapping.fields() {
                    bind_value(&mut row, &field.column_type, record.get(&field.destination));
                }
            });
            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(db_error("insert", table))?;
            inserted += result.rows_affected();
            debug!(table = %table.qualified(), batch = chunk.len(), "inserted batch");
        }

        tx.commit().await.map_err(db_error("commit", table))?;
        Ok(inserted)
    }

    async fn fetch_text(&mut self, table: &TableRef, columns: &[&str]) -> Result<Vec<Record>, LoadError> {
        let projection = columns
            .iter()
            .map(|c| format!("{0}::text AS {0}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn()?;
        let rows = sqlx::query(&format!("SELECT {projection} FROM {table}"))
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("select", table))?;

        rows.iter()
            .map(|row| {
                let mut record = Record::new();
                for (idx, column) in columns.iter().enumerate() {
                    let text: Option<String> = row.try_get(idx).map_err(db_error("decode", table))?;
                    record.insert(*column, text);
                }
                Ok(record)
            })
            .collect()
    }

    async fn replace_values(&mut self, table: &TableRef, fixes: &[ColumnFix]) -> Result<u64, LoadError> {
        let conn = self.conn()?;
        let mut tx = conn.begin().await.map_err(db_error("begin", table))?;
        let mut changed = 0u64;
        for fix in fixes {
            let column = quote_ident(&fix.column);
            let result = sqlx::query(&format!("UPDATE {table} SET {column} = $1 WHERE {column} = $2"))
                .bind(&fix.to)
                .bind(&fix.from)
                .execute(&mut *tx)
                .await
                .map_err(db_error("update", table))?;
            debug!(table = %table.qualified(), column = %fix.column, from = %fix.from, rows = result.rows_affected(), "replaced value");
            changed += result.rows_affected();
        }
        tx.commit().await.map_err(db_error("commit", table))?;
        Ok(changed)
    }

    async fn distinct_values(&mut self, table: &TableRef, column: &str) -> Result<Vec<String>, LoadError> {
        let column = quote_ident(column);
        let conn = self.conn()?;
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT {column}::text FROM {table} WHERE {column} IS NOT NULL ORDER BY 1"
        ))
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("select distinct", table))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(db_error("decode", table)))
            .collect()
    }

    async fn close(&mut self) -> Result<(), LoadError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(LoadError::Connect)?;
            info!("warehouse connection closed");
        }
        Ok(())
    }
}
