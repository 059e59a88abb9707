//! SAT annex ingestion tool

use anyhow::Result;
use clap::Parser;
use satetl_common::logging::{init_logging, LogConfig, LogLevel};
use satetl_ingest::config::Config;
use satetl_ingest::pipeline::RunSummary;
use satetl_ingest::{catalog, cleanup, pipeline};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "satetl")]
#[command(author, version, about = "SAT annex extraction and load tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Process a single annex
    Run {
        /// Annex code from the master catalog (e.g. 1A, 3C)
        #[arg(short, long)]
        annex: String,

        /// Override the configured lines-per-batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Process every annex in catalog order, continuing past failures
    RunAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().unwrap_or_default();
    log_config.log_file_prefix = "satetl".to_string();
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    init_logging(&log_config)?;

    let mut config = Config::load()?;

    match cli.command {
        Command::Run { annex, batch_size } => {
            if let Some(size) = batch_size {
                config.batch_size = size;
            }
            let summary = pipeline::run_annex(&config, &annex).await?;
            print_summary(&summary);
        }
        Command::RunAll => {
            run_all(&config).await?;
        }
    }

    Ok(())
}

/// Sequential run over the whole catalog. One annex failing does not stop
/// the rest; the consolidated tally is printed at the end and the process
/// exits nonzero if anything failed.
async fn run_all(config: &Config) -> Result<()> {
    let started = std::time::Instant::now();
    let mut completed: Vec<RunSummary> = Vec::new();
    let mut failed: Vec<(String, String)> = Vec::new();

    for code in catalog::annex_codes() {
        match pipeline::run_annex(config, code).await {
            Ok(summary) => completed.push(summary),
            Err(err) => {
                error!(annex = code, error = %err, "annex failed, continuing with the next one");
                failed.push((code.to_string(), err.to_string()));
            }
        }
        // Each annex gets a clean slate.
        if let Err(err) = cleanup::clean_workdir(&config.work_dir) {
            error!(error = %err, "work directory sweep failed");
        }
    }

    let total_rows: u64 = completed.iter().map(|s| s.rows_inserted).sum();
    info!(
        completed = completed.len(),
        failed = failed.len(),
        total_rows,
        elapsed_min = format!("{:.1}", started.elapsed().as_secs_f64() / 60.0),
        "full catalog run finished"
    );

    println!("\n==================== RUN SUMMARY ====================");
    for summary in &completed {
        print_summary(summary);
    }
    for (code, detail) in &failed {
        println!("annex {code}: FAILED ({detail})");
    }
    println!("=====================================================");

    if !failed.is_empty() {
        anyhow::bail!("{} annex(es) failed", failed.len());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "annex {}: {} rows into {} ({} batches inserted, {} skipped as duplicates)",
        summary.annex,
        summary.rows_inserted,
        summary.table,
        summary.batches_inserted,
        summary.batches_skipped,
    );
    if let Some(path) = &summary.report_path {
        println!("  audit report: {}", path.display());
    }
}
