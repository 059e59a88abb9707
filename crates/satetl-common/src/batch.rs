//! In-flight batch model
//!
//! A batch is an ordered, finite sequence of records sharing one ordered
//! column list. Columns arrive as raw text from the stream reader and are
//! progressively assigned semantic types by the coercion engine. The column
//! set is fixed for the lifetime of a batch; it may differ between annex
//! variants but never within one stream.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Closed set of target semantic types a column can be coerced into.
///
/// Deliberately independent of any dataframe or database library; the load
/// engine maps these onto storage types at DDL time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    /// Raw text, the default for every column leaving the stream reader
    Text,
    /// Second-resolution timestamp
    Timestamp,
    /// Fixed-precision numeric
    Decimal { precision: u8, scale: u8 },
}

impl TargetType {
    /// Standard monetary precision used for amount-like columns
    pub const MONEY: TargetType = TargetType::Decimal {
        precision: 18,
        scale: 2,
    };

    /// Wider scale reserved for exchange-rate-like columns
    pub const EXCHANGE_RATE: TargetType = TargetType::Decimal {
        precision: 18,
        scale: 4,
    };
}

/// A single cell value.
///
/// Coercion is always non-strict: a value that fails to parse under its
/// inferred target type becomes `Null` rather than aborting the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Timestamp(NaiveDateTime),
    Decimal(BigDecimal),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text content, if this is a non-null text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Build a value from a raw field: empty or whitespace-only becomes Null
    pub fn from_raw_field(field: &str) -> Value {
        if field.trim().is_empty() {
            Value::Null
        } else {
            Value::Text(field.to_string())
        }
    }
}

/// One bounded chunk of rows processed and persisted as a unit.
///
/// Invariant: every row holds exactly `columns.len()` values, and
/// `types.len() == columns.len()`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub columns: Vec<String>,
    pub types: Vec<TargetType>,
    pub rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Create an empty raw-text batch over the given column list
    pub fn new(columns: Vec<String>) -> Self {
        let types = vec![TargetType::Text; columns.len()];
        Batch {
            columns,
            types,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case- and quote-insensitive column lookup.
    ///
    /// Source headers arrive with inconsistent casing and stray quote
    /// characters; all name resolution in the pipeline goes through this.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let key = normalize_column_key(name);
        self.columns
            .iter()
            .position(|c| normalize_column_key(c) == key)
    }

    /// The value at (row, column), if both exist
    pub fn value_at(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }
}

/// Normalization applied to column names before comparison: trim, strip
/// quote characters, uppercase.
pub fn normalize_column_key(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .collect::<String>()
        .to_uppercase()
}
