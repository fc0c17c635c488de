//! `hourglass tips`: hourly tip totals per driver, then the top driver of
//! every hour.

use std::io::{BufRead, Write};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hg_config::HourglassConfig;
use hg_core::aggregate::{MaxBy, Sum};
use hg_core::{
    ChainedPipeline, CoreReason, CoreResult, Emitter, OperatorConfig, WindowOperator, WindowResult,
};

use crate::input::{format_event_time, parse_event_time};

pub const SUMS_STAGE: &str = "hourly_sums";
pub const MAX_STAGE: &str = "hourly_max";

/// One tip, as read from the input.
#[derive(Debug, Clone, PartialEq)]
pub struct TipRecord {
    pub driver_id: u64,
    pub ts: i64,
    pub tip: f64,
}

#[derive(Deserialize)]
struct RawTip {
    driver_id: u64,
    ts: Value,
    tip: f64,
}

impl TipRecord {
    pub fn parse(line: &str) -> Result<Self> {
        let raw: RawTip = serde_json::from_str(line)?;
        Ok(Self {
            driver_id: raw.driver_id,
            ts: parse_event_time(&raw.ts)?,
            tip: raw.tip,
        })
    }
}

pub type HourlyTotal = WindowResult<u64, f64>;

type TipSum = Sum<TipRecord, fn(&TipRecord) -> f64>;
type TopDriver = MaxBy<HourlyTotal, fn(&HourlyTotal) -> f64>;
pub type TipsPipeline = ChainedPipeline<u64, TipSum, (), TopDriver, fn(&HourlyTotal)>;

fn tip_amount(t: &TipRecord) -> f64 {
    t.tip
}

fn hourly_total(h: &HourlyTotal) -> f64 {
    h.value
}

fn single_group(_: &HourlyTotal) {}

/// Both stages built from their `[stage.*]` sections.
pub fn build_pipeline(config: &HourglassConfig) -> Result<TipsPipeline> {
    let interval = config.runtime.watermark_interval.as_duration();
    let sums = WindowOperator::new(
        SUMS_STAGE,
        operator_config(config, SUMS_STAGE, interval)?,
        Sum::new(tip_amount as fn(&TipRecord) -> f64),
    )
    .map_err(|e| anyhow!("{e}"))?;
    let top = WindowOperator::new(
        MAX_STAGE,
        operator_config(config, MAX_STAGE, interval)?,
        MaxBy::new(hourly_total as fn(&HourlyTotal) -> f64),
    )
    .map_err(|e| anyhow!("{e}"))?;
    Ok(ChainedPipeline::new(
        sums,
        top,
        single_group as fn(&HourlyTotal),
    ))
}

fn operator_config(
    config: &HourglassConfig,
    stage: &str,
    interval: std::time::Duration,
) -> Result<OperatorConfig> {
    OperatorConfig::from_stage(config.stage(stage)?, interval).map_err(|e| anyhow!("{e}"))
}

/// Output line: the best driver of one hour.
#[derive(Debug, Serialize)]
pub struct TopDriverLine {
    pub window_end: String,
    pub driver_id: u64,
    pub total: f64,
}

/// Writes one JSON line per fired top-driver window.
pub struct JsonLines<W> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLines<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn write_line(&mut self, line: &impl Serialize) -> CoreResult<()> {
        let json = serde_json::to_string(line).map_err(emit_failure)?;
        writeln!(self.writer, "{json}").map_err(emit_failure)?;
        self.written += 1;
        Ok(())
    }
}

fn emit_failure(e: impl std::fmt::Display) -> hg_core::CoreError {
    hg_core::CoreError::from(CoreReason::Emit).with_detail(e.to_string())
}

impl<W: Write> Emitter<(), Option<HourlyTotal>> for JsonLines<W> {
    fn emit(&mut self, result: WindowResult<(), Option<HourlyTotal>>) -> CoreResult<()> {
        let Some(best) = result.value else {
            return Ok(());
        };
        self.write_line(&TopDriverLine {
            window_end: format_event_time(best.window_end()),
            driver_id: best.key,
            total: best.value,
        })
    }
}

/// Counters printed at the end of a run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TipsSummary {
    pub lines: usize,
    pub skipped: usize,
    pub late: u64,
    pub emitted: usize,
}

/// Replay `input` through the tips pipeline, writing results to `out`.
/// Malformed lines are logged and skipped.
pub fn run_tips<R: BufRead, W: Write>(
    config: &HourglassConfig,
    input: R,
    out: W,
) -> Result<TipsSummary> {
    let mut pipeline = build_pipeline(config)?;
    let mut sink = JsonLines::new(out);
    let mut summary = TipsSummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;
        let tip = match TipRecord::parse(&line) {
            Ok(tip) => tip,
            Err(e) => {
                summary.skipped += 1;
                tracing::warn!(domain = "pipe", line = index + 1, error = %e, "skipping malformed tip");
                continue;
            }
        };
        match pipeline.push(tip.driver_id, tip.ts, &tip, &mut sink) {
            Ok(_) => {}
            Err(e) if *e.reason() == CoreReason::EventTimeRange => {
                summary.skipped += 1;
                tracing::warn!(domain = "pipe", line = index + 1, error = %e, "skipping tip outside the windowable range");
            }
            Err(e) => return Err(anyhow!("line {}: {e}", index + 1)),
        }
    }
    pipeline.flush_all(&mut sink).map_err(|e| anyhow!("{e}"))?;

    summary.late = pipeline.first().stats().records_late;
    summary.emitted = sink.written();
    Ok(summary)
}
