//! Per-annex pipeline orchestration
//!
//! Drives one annex end to end: catalog resolution, streaming read, text
//! repair, type coercion, audit observation and batched upload. Batches move
//! strictly in stream order, one at a time; there is no retry logic, a fatal
//! error aborts the annex after the audit report is written.

use indicatif::{ProgressBar, ProgressStyle};
use satetl_common::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use crate::audit::{AuditReport, RunStatus};
use crate::catalog;
use crate::coerce;
use crate::config::Config;
use crate::load::{LoadEngine, UploadOutcome};
use crate::reader::StreamReader;
use crate::repair;

/// Outcome of one annex run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub annex: String,
    pub table: String,
    pub rows_inserted: u64,
    pub batches_inserted: u64,
    pub batches_skipped: u64,
    pub report_path: Option<PathBuf>,
}

/// Run the full pipeline for one annex code.
///
/// The audit report is written on both the success and the failure path; a
/// failure to write the report itself never masks the pipeline error.
pub async fn run_annex(config: &Config, annex: &str) -> Result<RunSummary> {
    let target = catalog::resolve(annex)?;
    let source_path = config.source_dir.join(&target.source_file);

    info!(
        annex = %target.annex,
        table = %target.table,
        database = %target.database,
        source = %source_path.display(),
        "starting annex run"
    );

    // Open the source before dialing the database so a missing file fails
    // fast without consuming a connection.
    let mut reader = StreamReader::open(&source_path, config.batch_size)?;
    let engine = LoadEngine::connect(&config.database, &target.database).await?;

    let mut audit = AuditReport::new(&config.log_dir);
    let mut summary = RunSummary {
        annex: target.annex.clone(),
        table: target.table.clone(),
        rows_inserted: 0,
        batches_inserted: 0,
        batches_skipped: 0,
        report_path: None,
    };

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.enable_steady_tick(Duration::from_millis(120));

    loop {
        let batch = match reader.next_batch() {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(err) => {
                finalize_failed(&audit, &err);
                progress.finish_and_clear();
                return Err(err);
            }
        };

        let mut batch = batch;
        repair::repair_batch(&mut batch);
        let batch = coerce::coerce(batch);

        let watched: Vec<String> = batch
            .columns
            .iter()
            .filter(|c| repair::is_repair_target(c))
            .cloned()
            .collect();
        audit.observe(&batch, &watched);

        match engine.upload(&batch, &target.table).await {
            Ok(UploadOutcome::Inserted(rows)) => {
                audit.record_throughput(rows);
                summary.rows_inserted += rows as u64;
                summary.batches_inserted += 1;
                progress.set_message(format!(
                    "annex {}: {} rows ({:.0} rows/s)",
                    target.annex,
                    summary.rows_inserted,
                    audit.rows_per_second()
                ));
            }
            Ok(UploadOutcome::SkippedDuplicate) => {
                summary.batches_skipped += 1;
                progress.set_message(format!(
                    "annex {}: skipped duplicate batch ({} so far)",
                    target.annex, summary.batches_skipped
                ));
            }
            Ok(UploadOutcome::EmptyBatch) => {}
            Err(err) => {
                finalize_failed(&audit, &err);
                progress.finish_and_clear();
                return Err(err);
            }
        }
    }

    progress.finish_and_clear();
    summary.report_path = Some(audit.finalize(RunStatus::Success, None)?);

    info!(
        annex = %summary.annex,
        rows = summary.rows_inserted,
        batches = summary.batches_inserted,
        skipped = summary.batches_skipped,
        "annex run complete"
    );
    Ok(summary)
}

/// Best-effort report on the failure path; the original error wins.
fn finalize_failed(audit: &AuditReport, err: &satetl_common::EtlError) {
    error!(error = %err, "annex run failed");
    if let Err(report_err) = audit.finalize(RunStatus::Failed, Some(&err.to_string())) {
        error!(error = %report_err, "could not write audit report");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use satetl_common::EtlError;
    use tempfile::tempdir;

    fn test_config(source_dir: PathBuf, log_dir: PathBuf) -> Config {
        Config {
            database: DatabaseConfig {
                url: "postgresql://localhost/sat_v2".to_string(),
                max_connections: 1,
                connect_timeout_secs: 1,
            },
            source_dir,
            work_dir: PathBuf::from("./temp_processing"),
            log_dir,
            batch_size: 10,
        }
    }

    #[tokio::test]
    async fn unknown_annex_fails_before_any_io() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), dir.path().to_path_buf());
        let err = run_annex(&config, "9Z").await.unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[tokio::test]
    async fn missing_source_file_fails_before_connecting() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), dir.path().to_path_buf());
        let err = run_annex(&config, "1A").await.unwrap_err();
        assert!(matches!(err, EtlError::Io(_)));
    }
}
