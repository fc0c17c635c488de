use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use orion_error::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use hg_config::{RuntimeConfig, StageConfig};
use hg_core::window::{NO_WATERMARK, WatermarkGenerator, WatermarkThrottle};
use hg_core::{AggregateFunction, EventTime, OperatorConfig, WindowOperator, WindowResult};

use crate::error::{RuntimeReason, RuntimeResult, core_failure};
use crate::lane::{LaneMsg, LaneSummary, run_lane};
use crate::metrics::{RunReport, RuntimeMetrics};

/// Spacing of the router's periodic watermark check when no interval is
/// configured. Zero-interval runs already broadcast on every record.
const IDLE_TICK: Duration = Duration::from_secs(1);

/// One keyed, timestamped input record.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord<K, I> {
    pub key: K,
    pub ts: EventTime,
    pub payload: I,
}

impl<K, I> InputRecord<K, I> {
    pub fn new(key: K, ts: EventTime, payload: I) -> Self {
        Self { key, ts, payload }
    }
}

// ---------------------------------------------------------------------------
// PartitionedRunner
// ---------------------------------------------------------------------------

/// Runs one window stage across `lanes` tokio tasks.
///
/// Records are routed to a lane by key hash, so every key is handled by a
/// single task in arrival order. The router owns the only watermark
/// generator; it broadcasts monotone snapshots in-band on every lane channel,
/// which gives all lanes the same firing and lateness boundary.
///
/// Shutdown:
///
/// - input channel closed: lanes receive `Flush` (when `flush_on_close`) and
///   drain, then the run returns its [`RunReport`].
/// - cancellation: routing stops immediately, no flush; pending windows are
///   dropped and counted in the report.
pub struct PartitionedRunner<K, F>
where
    F: AggregateFunction,
{
    name: String,
    operator: OperatorConfig,
    aggregate: F,
    lanes: usize,
    channel_capacity: usize,
    flush_on_close: bool,
    metrics: Arc<RuntimeMetrics>,
    _key: std::marker::PhantomData<fn(K)>,
}

impl<K, F> PartitionedRunner<K, F>
where
    K: Hash + Eq + Clone + Send + 'static,
    F: AggregateFunction + Clone + Send + 'static,
    F::Input: Send + 'static,
    F::Acc: Send + 'static,
    F::Output: Send + 'static,
{
    /// Build a runner for the resolved `stage` under the `[runtime]` settings.
    pub fn from_config(
        stage: &StageConfig,
        runtime: &RuntimeConfig,
        aggregate: F,
    ) -> RuntimeResult<Self> {
        let operator = OperatorConfig::from_stage(stage, runtime.watermark_interval.as_duration())
            .map_err(|e| core_failure(&format!("stage {}", stage.name), e))?;
        Self::new(&stage.name, operator, runtime, aggregate)
    }

    pub fn new(
        name: &str,
        operator: OperatorConfig,
        runtime: &RuntimeConfig,
        aggregate: F,
    ) -> RuntimeResult<Self> {
        if runtime.lanes == 0 || runtime.channel_capacity == 0 {
            return Err(StructError::from(RuntimeReason::Bootstrap)
                .with_detail("lanes and channel_capacity must be > 0".to_string()));
        }
        operator
            .spec
            .validate()
            .map_err(|e| core_failure(&format!("stage {name}"), e))?;
        Ok(Self {
            name: name.to_string(),
            operator,
            aggregate,
            lanes: runtime.lanes,
            channel_capacity: runtime.channel_capacity,
            flush_on_close: runtime.flush_on_close,
            metrics: Arc::new(RuntimeMetrics::new(runtime.lanes)),
            _key: std::marker::PhantomData,
        })
    }

    /// Live counters of this runner.
    pub fn metrics(&self) -> Arc<RuntimeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Route `input` until it closes or `cancel` fires.
    ///
    /// Fired windows are sent on `output`; the caller must drain it
    /// concurrently, lanes block when it is full.
    #[tracing::instrument(name = "runner", skip_all, fields(stage = %self.name, lanes = self.lanes))]
    pub async fn run(
        self,
        mut input: mpsc::Receiver<InputRecord<K, F::Input>>,
        output: mpsc::Sender<WindowResult<K, F::Output>>,
        cancel: CancellationToken,
    ) -> RuntimeResult<RunReport> {
        let mut handles: Vec<JoinHandle<RuntimeResult<LaneSummary>>> =
            Vec::with_capacity(self.lanes);
        let mut senders = Vec::with_capacity(self.lanes);
        for index in 0..self.lanes {
            let (tx, rx) = mpsc::channel(self.channel_capacity);
            let operator = WindowOperator::new(
                format!("{}#{index}", self.name),
                self.operator.clone(),
                self.aggregate.clone(),
            )
            .map_err(|e| core_failure(&format!("stage {} lane {index}", self.name), e))?;
            handles.push(tokio::spawn(run_lane(
                index,
                operator,
                rx,
                output.clone(),
                Arc::clone(&self.metrics),
            )));
            senders.push(tx);
        }
        drop(output);
        hg_info!(sys, stage = %self.name, lanes = self.lanes, "runner started");

        let mut router = Router {
            senders,
            watermarks: WatermarkGenerator::new(self.operator.max_out_of_orderness),
            throttle: WatermarkThrottle::new(self.operator.watermark_interval),
            broadcast: NO_WATERMARK,
            metrics: Arc::clone(&self.metrics),
        };

        let period = if self.operator.watermark_interval.is_zero() {
            IDLE_TICK
        } else {
            self.operator.watermark_interval
        };
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let routed: RuntimeResult<bool> = async {
            let cancelled = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break true,
                    next = input.recv() => match next {
                        Some(record) => router.route(record).await?,
                        None => break false,
                    },
                    _ = tick.tick() => router.broadcast().await?,
                }
            };
            if cancelled {
                hg_info!(sys, stage = %self.name, "runner cancelled, pending windows dropped");
            } else {
                router.broadcast().await?;
                if self.flush_on_close {
                    router.flush().await?;
                }
                hg_debug!(sys, stage = %self.name, "input closed");
            }
            Ok(cancelled)
        }
        .await;
        // closing the lane channels ends every lane loop
        drop(router);

        // join every lane before reporting, so a lane failure that stopped
        // routing surfaces as the cause
        let mut report = RunReport::new(&self.name, &self.metrics);
        let mut lane_failure = None;
        for (index, handle) in handles.into_iter().enumerate() {
            let joined = handle.await.map_err(|e| {
                StructError::from(RuntimeReason::Shutdown)
                    .with_detail(format!("lane {index} join error: {e}"))
            });
            match joined.and_then(|lane| lane) {
                Ok(summary) => report.add_lane(&summary.stats, summary.pending),
                Err(e) => {
                    hg_warn!(sys, stage = %self.name, lane = index, error = %e, "lane failed");
                    lane_failure.get_or_insert(e);
                }
            }
        }
        report.cancelled = match (routed, lane_failure) {
            (_, Some(e)) => return Err(e),
            (Err(e), None) => return Err(e),
            (Ok(cancelled), None) => cancelled,
        };
        hg_info!(
            sys,
            stage = %self.name,
            records = report.records_in,
            fired = report.windows_fired,
            late = report.records_late,
            "runner finished"
        );
        Ok(report)
    }
}

/// Lane index for `key`. Stable within one process.
pub fn lane_of<K: Hash>(key: &K, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % lanes.max(1) as u64) as usize
}

// ---------------------------------------------------------------------------
// Router: key partitioning plus global watermark
// ---------------------------------------------------------------------------

struct Router<K, I> {
    senders: Vec<mpsc::Sender<LaneMsg<K, I>>>,
    watermarks: WatermarkGenerator,
    throttle: WatermarkThrottle,
    broadcast: EventTime,
    metrics: Arc<RuntimeMetrics>,
}

impl<K: Hash, I> Router<K, I> {
    async fn route(&mut self, record: InputRecord<K, I>) -> RuntimeResult<()> {
        self.watermarks.observe(record.ts);
        let lane = lane_of(&record.key, self.senders.len());
        self.send(lane, LaneMsg::Record(record)).await?;
        self.metrics.inc_record_routed(lane);

        if self.throttle.ready(Instant::now()) {
            self.broadcast().await?;
        }
        Ok(())
    }

    /// Send the current watermark to every lane if it moved since the last
    /// broadcast.
    async fn broadcast(&mut self) -> RuntimeResult<()> {
        let Some(w) = self.watermarks.current() else {
            return Ok(());
        };
        if w <= self.broadcast {
            return Ok(());
        }
        for lane in 0..self.senders.len() {
            self.send(lane, LaneMsg::Watermark(w)).await?;
        }
        self.broadcast = w;
        self.metrics.set_watermark(w);
        hg_trace!(res, watermark = w, "watermark broadcast");
        Ok(())
    }

    async fn flush(&mut self) -> RuntimeResult<()> {
        for lane in 0..self.senders.len() {
            self.send(lane, LaneMsg::Flush).await?;
        }
        self.metrics.set_watermark(hg_core::window::END_OF_STREAM);
        Ok(())
    }

    async fn send(&self, lane: usize, msg: LaneMsg<K, I>) -> RuntimeResult<()> {
        self.senders[lane].send(msg).await.map_err(|_| {
            StructError::from(RuntimeReason::Lane).with_detail(format!("lane {lane} stopped"))
        })
    }
}
