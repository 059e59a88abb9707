//! Error types for the extract pipeline
//!
//! Only the fatal arms of the pipeline's anomaly taxonomy live here. Decode
//! anomalies, ragged rows, and coercion failures are absorbed in place (byte
//! substitution, row drop, null) and never surface as errors.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Main error type for the extract pipeline
#[derive(Error, Debug)]
pub enum EtlError {
    /// Unresolvable annex/table target. Raised before any I/O is attempted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection, pool, or protocol failure against the target store.
    /// Aborts the run; retry policy belongs to the orchestrator.
    #[error("Database connectivity error: {0}")]
    Connectivity(sqlx::Error),

    /// Constraint breach inside a batch insert. The batch transaction has
    /// been rolled back in its entirety when this is returned.
    #[error("Constraint violation on table '{table}': {detail}")]
    ConstraintViolation { table: String, detail: String },

    /// Source file could not be opened or read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Split a sqlx error into the pipeline taxonomy: constraint breaches
    /// become `ConstraintViolation`, everything else is a connectivity
    /// failure for the run.
    pub fn from_sqlx(err: sqlx::Error, table: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation()
                || db_err.is_check_violation()
                || db_err.is_foreign_key_violation()
            {
                return Self::ConstraintViolation {
                    table: table.to_string(),
                    detail: db_err.message().to_string(),
                };
            }
        }
        Self::Connectivity(err)
    }
}
