//! SATETL Common Library
//!
//! Shared types, utilities, and error handling for the SAT annex extract
//! pipeline.
//!
//! # Overview
//!
//! This crate provides common functionality used across all workspace members:
//!
//! - **Error Handling**: The pipeline error taxonomy and result type
//! - **Logging**: Centralized tracing initialization (console and file)
//! - **Batch Model**: The in-flight batch representation with its closed set
//!   of target semantic types
//!
//! # Example
//!
//! ```no_run
//! use satetl_common::{Batch, EtlError, Result};
//!
//! fn first_identifier(batch: &Batch) -> Option<&str> {
//!     let idx = batch.column_index("UUID")?;
//!     batch.rows.first()?.get(idx)?.as_text()
//! }
//! ```

pub mod batch;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use batch::{Batch, TargetType, Value};
pub use error::{EtlError, Result};
