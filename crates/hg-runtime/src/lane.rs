use std::hash::Hash;
use std::sync::Arc;

use orion_error::prelude::*;
use tokio::sync::mpsc;

use hg_core::{
    AggregateFunction, CoreReason, EventTime, OperatorStats, PushOutcome, WindowOperator,
    WindowResult,
};

use crate::error::{RuntimeReason, RuntimeResult, core_failure};
use crate::metrics::RuntimeMetrics;
use crate::runner::InputRecord;

/// Messages from the router to one lane, delivered in send order.
pub(crate) enum LaneMsg<K, I> {
    Record(InputRecord<K, I>),
    /// Global watermark snapshot; every record routed before it has already
    /// been queued ahead of it.
    Watermark(EventTime),
    /// End of input: fire everything.
    Flush,
}

/// What a lane leaves behind when it stops.
pub(crate) struct LaneSummary {
    pub stats: OperatorStats,
    pub pending: usize,
}

/// Drive one lane's window operator until the router drops its sender.
///
/// The lane never derives a watermark of its own: firing and lateness only
/// follow the snapshots broadcast by the router, so all lanes judge against
/// the same monotone value.
#[tracing::instrument(name = "lane", skip_all, fields(lane = index))]
pub(crate) async fn run_lane<K, F>(
    index: usize,
    mut operator: WindowOperator<K, F>,
    mut rx: mpsc::Receiver<LaneMsg<K, F::Input>>,
    out: mpsc::Sender<WindowResult<K, F::Output>>,
    metrics: Arc<RuntimeMetrics>,
) -> RuntimeResult<LaneSummary>
where
    K: Hash + Eq + Clone,
    F: AggregateFunction,
{
    let mut fired: Vec<WindowResult<K, F::Output>> = Vec::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            LaneMsg::Record(record) => {
                match operator.process_record(record.key, record.ts, &record.payload) {
                    Ok(PushOutcome::Accepted { .. }) => {}
                    Ok(PushOutcome::DroppedLate) => metrics.inc_record_late(),
                    Err(e) if *e.reason() == CoreReason::Accumulator => {
                        metrics.inc_accumulator_error();
                        hg_warn!(pipe, lane = index, ts = record.ts, error = %e, "record rejected by accumulator");
                    }
                    Err(e) => {
                        hg_warn!(pipe, lane = index, ts = record.ts, error = %e, "record rejected");
                    }
                }
                continue;
            }
            LaneMsg::Watermark(w) => {
                operator
                    .advance_watermark(w, &mut fired)
                    .map_err(|e| core_failure(&format!("lane {index} watermark {w}"), e))?;
            }
            LaneMsg::Flush => {
                operator
                    .flush_all(&mut fired)
                    .map_err(|e| core_failure(&format!("lane {index} flush"), e))?;
                hg_debug!(pipe, lane = index, fired = fired.len(), "lane flushed");
            }
        }
        forward(index, &mut fired, &out, &metrics).await?;
    }

    Ok(LaneSummary {
        stats: operator.stats(),
        pending: operator.pending_count(),
    })
}

async fn forward<K, O>(
    index: usize,
    fired: &mut Vec<WindowResult<K, O>>,
    out: &mpsc::Sender<WindowResult<K, O>>,
    metrics: &RuntimeMetrics,
) -> RuntimeResult<()> {
    for result in fired.drain(..) {
        out.send(result).await.map_err(|_| {
            StructError::from(RuntimeReason::Lane)
                .with_detail(format!("lane {index}: result channel closed"))
        })?;
        metrics.inc_window_fired();
    }
    Ok(())
}
