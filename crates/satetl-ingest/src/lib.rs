//! SATETL Ingest Library
//!
//! Streaming ingestion of SAT annex extract files: permissive decoding of
//! corrupt source bytes, ordered mojibake repair, non-strict type coercion,
//! and idempotent batch loading into Postgres.
//!
//! # Pipeline
//!
//! ```text
//! file -> reader (raw text batches)
//!      -> repair (sensitive text columns)
//!      -> coerce (timestamps, decimals)
//!      -> audit.observe (quality counters, side channel)
//!      -> load.upload (DDL + dedup probe + transactional insert)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use satetl_ingest::{config::Config, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let summary = pipeline::run_annex(&config, "1A").await?;
//!     println!("{} rows inserted", summary.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod catalog;
pub mod cleanup;
pub mod coerce;
pub mod config;
pub mod load;
pub mod pipeline;
pub mod reader;
pub mod repair;
