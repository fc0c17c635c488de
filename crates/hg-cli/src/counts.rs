//! `hourglass counts`: records per key and window through the partitioned
//! runner, keeping only windows that reach a popularity threshold.

use std::io::Write;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hg_config::HourglassConfig;
use hg_core::WindowResult;
use hg_core::aggregate::Count;
use hg_runtime::{InputRecord, PartitionedRunner, RunReport};

use crate::input::{format_event_time, parse_keyed};

#[derive(Debug, Clone)]
pub struct CountOptions {
    pub stage: String,
    /// Grouping fields; records are counted per distinct combination.
    pub key_fields: Vec<String>,
    pub time_field: String,
    pub min_count: u64,
}

#[derive(Debug, Serialize)]
pub struct KeyCountLine {
    pub key: Vec<String>,
    pub window_start: String,
    pub window_end: String,
    pub count: u64,
}

impl From<&WindowResult<Vec<String>, u64>> for KeyCountLine {
    fn from(r: &WindowResult<Vec<String>, u64>) -> Self {
        Self {
            key: r.key.clone(),
            window_start: format_event_time(r.window.start),
            window_end: format_event_time(r.window.end),
            count: r.value,
        }
    }
}

/// Outcome of one `counts` run.
#[derive(Debug)]
pub struct CountsSummary {
    pub report: RunReport,
    pub skipped: usize,
    pub printed: usize,
}

/// Stream `input` through a [`PartitionedRunner`] for `opts.stage`.
///
/// Windows with fewer than `min_count` records are not printed. Cancelling
/// `cancel` stops the run without flushing open windows.
pub async fn run_counts<R, W>(
    config: &HourglassConfig,
    opts: &CountOptions,
    input: R,
    mut out: W,
    cancel: CancellationToken,
) -> Result<CountsSummary>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: Write,
{
    if opts.key_fields.is_empty() {
        bail!("at least one key field is required");
    }
    let stage = config.stage(&opts.stage)?;
    let runner = PartitionedRunner::<Vec<String>, _>::from_config(
        stage,
        &config.runtime,
        Count::<()>::new(),
    )
    .map_err(|e| anyhow!("{e}"))?;

    let capacity = config.runtime.channel_capacity;
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, mut out_rx) = mpsc::channel(capacity);
    let run = tokio::spawn(runner.run(in_rx, out_tx, cancel));
    let feeder = tokio::spawn(feed(
        input,
        in_tx,
        opts.key_fields.clone(),
        opts.time_field.clone(),
    ));

    let mut printed = 0;
    while let Some(result) = out_rx.recv().await {
        if result.value < opts.min_count {
            continue;
        }
        writeln!(out, "{}", serde_json::to_string(&KeyCountLine::from(&result))?)?;
        printed += 1;
    }

    let skipped = feeder.await??;
    let report = run.await?.map_err(|e| anyhow!("{e}"))?;
    Ok(CountsSummary {
        report,
        skipped,
        printed,
    })
}

/// Parse JSON lines into runner input until EOF or the runner stops.
/// Returns the number of malformed lines skipped.
async fn feed<R>(
    input: R,
    tx: mpsc::Sender<InputRecord<Vec<String>, ()>>,
    key_fields: Vec<String>,
    time_field: String,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut line_no = 0usize;
    let mut skipped = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_keyed(&line, &key_fields, &time_field) {
            Ok((key, ts)) => {
                if tx.send(InputRecord::new(key, ts, ())).await.is_err() {
                    tracing::debug!(domain = "pipe", line = line_no, "runner stopped, input abandoned");
                    break;
                }
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(domain = "pipe", line = line_no, error = %e, "skipping malformed record");
            }
        }
    }
    Ok(skipped)
}
