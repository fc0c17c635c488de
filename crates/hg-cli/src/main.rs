use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use hg_config::HourglassConfig;
use hg_runtime::signal::cancel_on_signal;
use hg_runtime::tracing_init::init_tracing;

mod counts;
mod input;
mod tips;

#[derive(Parser)]
#[command(name = "hourglass", about = "Event-time window aggregation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hourly tip totals per driver, then the top driver of every hour
    Tips {
        /// Path to hourglass.toml config file
        #[arg(short, long)]
        config: PathBuf,
        /// JSON-lines file of {driver_id, ts, tip} records
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Record counts per key and window through the partitioned runner
    Counts {
        /// Path to hourglass.toml config file
        #[arg(short, long)]
        config: PathBuf,
        /// JSON-lines input file
        #[arg(short, long)]
        input: PathBuf,
        /// Name of the [stage.*] section to run
        #[arg(long)]
        stage: String,
        /// Grouping field; repeat to count per combination of fields
        #[arg(long = "key-field", required = true)]
        key_fields: Vec<String>,
        /// Field holding the event time (RFC 3339 or epoch millis)
        #[arg(long, default_value = "ts")]
        time_field: String,
        /// Only print windows with at least this many records
        #[arg(long, default_value_t = 1)]
        min_count: u64,
    },
}

/// Canonical config path, the loaded config and its directory.
fn load_config(config: &PathBuf) -> Result<(HourglassConfig, PathBuf)> {
    let config_path = config
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("config path '{}': {e}", config.display()))?;
    let loaded = HourglassConfig::load(&config_path)?;
    let base_dir = config_path
        .parent()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("config path has no parent directory"))?;
    Ok((loaded, base_dir))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tips { config, input } => {
            let (config, base_dir) = load_config(&config)?;
            let _guard = init_tracing(&config.logging, &base_dir)?;

            let file = std::fs::File::open(&input)
                .map_err(|e| anyhow::anyhow!("input '{}': {e}", input.display()))?;
            let stdout = std::io::stdout();
            let summary = tips::run_tips(&config, std::io::BufReader::new(file), stdout.lock())?;
            tracing::info!(
                domain = "sys",
                lines = summary.lines,
                skipped = summary.skipped,
                late = summary.late,
                emitted = summary.emitted,
                "tips finished"
            );
        }
        Commands::Counts {
            config,
            input,
            stage,
            key_fields,
            time_field,
            min_count,
        } => {
            let (config, base_dir) = load_config(&config)?;
            let _guard = init_tracing(&config.logging, &base_dir)?;

            let file = tokio::fs::File::open(&input)
                .await
                .map_err(|e| anyhow::anyhow!("input '{}': {e}", input.display()))?;
            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_signal(cancel.clone()));

            let opts = counts::CountOptions {
                stage,
                key_fields,
                time_field,
                min_count,
            };
            let summary = counts::run_counts(
                &config,
                &opts,
                tokio::io::BufReader::new(file),
                std::io::stdout(),
                cancel.clone(),
            )
            .await?;
            cancel.cancel();

            let report = serde_json::to_string(&summary.report)?;
            tracing::info!(
                domain = "sys",
                printed = summary.printed,
                skipped = summary.skipped,
                report = %report,
                "counts finished"
            );
        }
    }

    Ok(())
}
