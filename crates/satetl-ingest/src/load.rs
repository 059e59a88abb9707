//! Load engine: just-in-time DDL and shielded batch inserts
//!
//! Manages the persistence lifecycle against Postgres. Table structures are
//! created on demand with business-aware column types, every upload runs a
//! coarse duplicate-batch probe first, and the insert itself is one atomic
//! transaction per batch: either every row of a batch lands or none does.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use satetl_common::{Batch, EtlError, Result, TargetType, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;

/// Column whose value uniquely identifies a record across the whole period
const KEY_COLUMN: &str = "UUID";

/// Stay under the Postgres bind-parameter ceiling (65535) per statement;
/// oversized batches are split into several statements inside one transaction.
const MAX_BIND_PARAMS: usize = 60_000;

/// Business-name keyword to storage type, checked in order, first
/// `contains` match wins. Order is load-bearing: TIPO is checked before
/// CAMBIO, so TIPOCAMBIO lands as a fixed-width code column exactly as the
/// production tables have it.
const BUSINESS_STORAGE: &[(&str, &str)] = &[
    ("RFC", "VARCHAR(13)"),
    ("UUID", "VARCHAR(36) NOT NULL PRIMARY KEY"),
    ("CURP", "VARCHAR(18)"),
    ("MONEDA", "VARCHAR(10)"),
    ("TIPO", "VARCHAR(10)"),
    ("METODOPAGO", "VARCHAR(5)"),
    ("FORMAPAGO", "VARCHAR(5)"),
    ("SERIE", "VARCHAR(50)"),
    ("FOLIO", "VARCHAR(50)"),
    ("NUMEMPLEADO", "VARCHAR(50)"),
    ("BANCO", "VARCHAR(10)"),
    ("CAMBIO", "NUMERIC(18,4)"),
];

/// Result of one upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The batch was committed; carries the row count
    Inserted(usize),
    /// The first record's identifier already exists; the whole batch was
    /// skipped without attempting an insert
    SkippedDuplicate,
    /// Nothing to do
    EmptyBatch,
}

/// How values are bound for a column, derived from its storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageClass {
    Character,
    Timestamp,
    Numeric,
}

/// Persistence engine for one target database.
///
/// Owns the connection pool; a single batch's DDL + probe + insert sequence
/// runs on it sequentially, one batch in flight at a time.
pub struct LoadEngine {
    pool: PgPool,
}

impl LoadEngine {
    /// Connect to a specific database on the configured server.
    pub async fn connect(config: &DatabaseConfig, database: &str) -> Result<Self> {
        let url = config.url_for(database)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&url)
            .await
            .map_err(EtlError::Connectivity)?;
        Ok(LoadEngine { pool })
    }

    /// Wrap an already-connected pool (test hook)
    pub fn from_pool(pool: PgPool) -> Self {
        LoadEngine { pool }
    }

    /// Upload one coerced batch into the target table.
    ///
    /// Sequence: conditional table creation, duplicate-batch probe on the
    /// first record's identifier, then a single-transaction insert. The
    /// probe is a coarse batch-level heuristic, not per-row deduplication:
    /// a batch whose first row is new but that contains already-persisted
    /// rows later will attempt the full insert and fail with
    /// `ConstraintViolation`, rolling back in its entirety.
    pub async fn upload(&self, batch: &Batch, table: &str) -> Result<UploadOutcome> {
        if batch.is_empty() {
            return Ok(UploadOutcome::EmptyBatch);
        }

        self.ensure_table(batch, table).await?;

        match first_identifier(batch) {
            Some(identifier) => {
                if self.identifier_exists(batch, table, identifier).await? {
                    debug!(table, identifier, "first record already persisted, skipping batch");
                    return Ok(UploadOutcome::SkippedDuplicate);
                }
            }
            None => {
                warn!(table, "batch has no {} column, duplicate probe skipped", KEY_COLUMN);
            }
        }

        self.insert_batch(batch, table).await?;
        Ok(UploadOutcome::Inserted(batch.len()))
    }

    /// Issue the conditional table definition (and RFC index) for a batch.
    ///
    /// Conditioned on table absence, so it is safe to repeat before every
    /// upload and across processes.
    async fn ensure_table(&self, batch: &Batch, table: &str) -> Result<()> {
        let ddl = create_table_sql(batch, table);
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| EtlError::from_sqlx(e, table))?;

        if let Some(rfc_column) = batch
            .columns
            .iter()
            .find(|c| c.to_uppercase().contains("RFC"))
        {
            let index = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&format!("IX_{}_RFC", table)),
                quote_ident(table),
                quote_ident(rfc_column),
            );
            sqlx::query(&index)
                .execute(&self.pool)
                .await
                .map_err(|e| EtlError::from_sqlx(e, table))?;
        }
        Ok(())
    }

    /// Probe for the presence of one identifier in the target table
    async fn identifier_exists(&self, batch: &Batch, table: &str, identifier: &str) -> Result<bool> {
        // Column lookup already succeeded in first_identifier.
        let key_column = batch
            .columns
            .iter()
            .find(|c| satetl_common::batch::normalize_column_key(c) == KEY_COLUMN)
            .map(String::as_str)
            .unwrap_or(KEY_COLUMN);
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = $1 LIMIT 1",
            quote_ident(table),
            quote_ident(key_column),
        );
        let found = sqlx::query(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EtlError::from_sqlx(e, table))?;
        Ok(found.is_some())
    }

    /// Insert all rows of the batch inside one transaction.
    ///
    /// Statements are chunked to respect the bind-parameter ceiling but the
    /// transaction is one: commit only after every chunk succeeds, otherwise
    /// the drop of the transaction rolls everything back.
    async fn insert_batch(&self, batch: &Batch, table: &str) -> Result<()> {
        let classes: Vec<StorageClass> = batch
            .columns
            .iter()
            .zip(&batch.types)
            .map(|(name, ty)| storage_class(name, *ty))
            .collect();

        let rows_per_statement = rows_per_statement(batch.columns.len());
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::from_sqlx(e, table))?;

        for chunk in batch.rows.chunks(rows_per_statement) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} (", quote_ident(table)));
            {
                let mut sep = builder.separated(", ");
                for column in &batch.columns {
                    sep.push(quote_ident(column));
                }
            }
            builder.push(") ");
            builder.push_values(chunk, |mut row_builder, row| {
                for (value, class) in row.iter().zip(&classes) {
                    match class {
                        StorageClass::Timestamp => {
                            row_builder.push_bind(as_timestamp(value));
                        }
                        StorageClass::Numeric => {
                            row_builder.push_bind(as_decimal(value));
                        }
                        StorageClass::Character => {
                            row_builder.push_bind(as_character(value));
                        }
                    }
                }
            });

            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| EtlError::from_sqlx(e, table))?;
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::from_sqlx(e, table))?;
        Ok(())
    }
}

/// The first record's unique identifier, if the batch carries the key column
fn first_identifier(batch: &Batch) -> Option<&str> {
    let idx = batch.column_index(KEY_COLUMN)?;
    batch.rows.first()?.get(idx)?.as_text()
}

/// Rows per INSERT statement under the bind-parameter ceiling
fn rows_per_statement(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

/// Build the conditional CREATE TABLE statement for a batch's shape.
fn create_table_sql(batch: &Batch, table: &str) -> String {
    let mut column_defs = Vec::with_capacity(batch.columns.len());
    for (name, ty) in batch.columns.iter().zip(&batch.types) {
        column_defs.push(format!("{} {}", quote_ident(name), storage_type(name, *ty)));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        column_defs.join(", ")
    )
}

/// Storage type for one column, by descending precedence: business-name
/// keyword, then coerced timestamp, then coerced decimal, then elastic text.
fn storage_type(name: &str, ty: TargetType) -> String {
    let upper = name.to_uppercase();
    if let Some((_, storage)) = BUSINESS_STORAGE.iter().find(|(kw, _)| upper.contains(kw)) {
        return storage.to_string();
    }
    match ty {
        TargetType::Timestamp => "TIMESTAMP(0)".to_string(),
        TargetType::Decimal { precision, scale } => format!("NUMERIC({},{})", precision, scale),
        TargetType::Text => "TEXT".to_string(),
    }
}

/// Bind class matching the storage type chosen by `storage_type`
fn storage_class(name: &str, ty: TargetType) -> StorageClass {
    let upper = name.to_uppercase();
    if let Some((_, storage)) = BUSINESS_STORAGE.iter().find(|(kw, _)| upper.contains(kw)) {
        return if storage.starts_with("NUMERIC") {
            StorageClass::Numeric
        } else {
            StorageClass::Character
        };
    }
    match ty {
        TargetType::Timestamp => StorageClass::Timestamp,
        TargetType::Decimal { .. } => StorageClass::Numeric,
        TargetType::Text => StorageClass::Character,
    }
}

fn as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Decimal(d) => Some(d.clone()),
        _ => None,
    }
}

/// Character-class columns accept whatever the pipeline produced; coerced
/// values that ended up in a fixed-width business column are rendered back
/// to text (TIPOCAMBIO and friends).
fn as_character(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::Decimal(d) => Some(d.to_string()),
        Value::Null => None,
    }
}

/// Double-quote an identifier, escaping embedded quotes
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed_batch(columns: &[(&str, TargetType)]) -> Batch {
        let mut batch = Batch::new(columns.iter().map(|(n, _)| n.to_string()).collect());
        batch.types = columns.iter().map(|(_, t)| *t).collect();
        batch
    }

    #[test]
    fn business_keywords_beat_coerced_types() {
        // RFC stays fixed-width even though coercion left it text, and the
        // identifier column carries the primary key.
        assert_eq!(storage_type("EmisorRFC", TargetType::Text), "VARCHAR(13)");
        assert_eq!(
            storage_type("UUID", TargetType::Text),
            "VARCHAR(36) NOT NULL PRIMARY KEY"
        );
        assert_eq!(storage_type("CURP", TargetType::Text), "VARCHAR(18)");
    }

    #[test]
    fn tipocambio_is_matched_by_tipo_first() {
        // Order-sensitive contains match, pinned to the production schema.
        assert_eq!(
            storage_type("TipoCambio", TargetType::EXCHANGE_RATE),
            "VARCHAR(10)"
        );
        assert_eq!(storage_class("TipoCambio", TargetType::EXCHANGE_RATE), StorageClass::Character);
    }

    #[test]
    fn coerced_types_map_to_storage() {
        assert_eq!(storage_type("FECHAEMISION", TargetType::Timestamp), "TIMESTAMP(0)");
        assert_eq!(storage_type("TOTAL", TargetType::MONEY), "NUMERIC(18,2)");
        assert_eq!(storage_type("OBSERVACIONES", TargetType::Text), "TEXT");
    }

    #[test]
    fn create_table_sql_is_conditional_and_quoted() {
        let batch = typed_batch(&[
            ("UUID", TargetType::Text),
            ("Total", TargetType::MONEY),
            ("Nombre", TargetType::Text),
        ]);
        let ddl = create_table_sql(&batch, "ANEXO_1A_2025_1S");
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"ANEXO_1A_2025_1S\""));
        assert!(ddl.contains("\"UUID\" VARCHAR(36) NOT NULL PRIMARY KEY"));
        assert!(ddl.contains("\"Total\" NUMERIC(18,2)"));
        assert!(ddl.contains("\"Nombre\" TEXT"));
    }

    #[test]
    fn first_identifier_reads_the_key_column() {
        let mut batch = typed_batch(&[("uuid", TargetType::Text), ("TOTAL", TargetType::MONEY)]);
        batch.rows.push(vec![
            Value::Text("aaa-111".to_string()),
            Value::Null,
        ]);
        assert_eq!(first_identifier(&batch), Some("aaa-111"));

        let no_key = typed_batch(&[("FOLIO", TargetType::Text)]);
        assert_eq!(first_identifier(&no_key), None);
    }

    #[test]
    fn statement_chunking_respects_bind_ceiling() {
        assert_eq!(rows_per_statement(1), 60_000);
        assert_eq!(rows_per_statement(60), 1_000);
        // Degenerate wide batch still makes progress one row at a time.
        assert_eq!(rows_per_statement(100_000), 1);
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
