mod types;

#[cfg(test)]
mod tests;

pub use types::{OperatorConfig, OperatorStats, PushOutcome};

use std::hash::Hash;
use std::time::Instant;

use orion_error::prelude::*;

use super::assigner::{EventTime, TimeWindow, WindowSpec};
use super::scheduler::{FireScheduler, WindowState};
use super::store::AccumulatorStore;
use super::watermark::{END_OF_STREAM, NO_WATERMARK, WatermarkGenerator, WatermarkThrottle};
use crate::aggregate::AggregateFunction;
use crate::error::{CoreReason, CoreResult};
use crate::sink::{Emitter, WindowResult};

/// Keyed event-time window aggregation.
///
/// Records are merged into per-`(key, window)` accumulators. A window fires
/// once the published watermark reaches `window.end + allowed_lateness`: its
/// value is extracted, handed to the emitter, and its state evicted. Records
/// that only map to fired windows are dropped and counted.
///
/// The watermark tracked from pushed records is only *published* (used for
/// firing and lateness) when the throttle allows it, on [`tick`](Self::tick),
/// or on an explicit [`advance_watermark`](Self::advance_watermark).
pub struct WindowOperator<K, F>
where
    F: AggregateFunction,
{
    name: String,
    spec: WindowSpec,
    generator: WatermarkGenerator,
    throttle: WatermarkThrottle,
    watermark: EventTime,
    store: AccumulatorStore<K, F::Acc>,
    scheduler: FireScheduler<K>,
    aggregate: F,
    stats: OperatorStats,
}

impl<K, F> WindowOperator<K, F>
where
    K: Hash + Eq + Clone,
    F: AggregateFunction,
{
    pub fn new(name: impl Into<String>, config: OperatorConfig, aggregate: F) -> CoreResult<Self> {
        config.spec.validate()?;
        Ok(Self {
            name: name.into(),
            spec: config.spec,
            generator: WatermarkGenerator::new(config.max_out_of_orderness),
            throttle: WatermarkThrottle::new(config.watermark_interval),
            watermark: NO_WATERMARK,
            store: AccumulatorStore::new(),
            scheduler: FireScheduler::new(config.allowed_lateness),
            aggregate,
            stats: OperatorStats::default(),
        })
    }

    /// Ingest one record: observe its event time, merge it into its windows,
    /// then (throttle permitting) publish the watermark and fire whatever
    /// became due.
    ///
    /// Lateness is judged against the watermark published *before* this
    /// record, so a record never closes its own window.
    pub fn push<E>(
        &mut self,
        key: K,
        ts: EventTime,
        input: &F::Input,
        out: &mut E,
    ) -> CoreResult<PushOutcome>
    where
        E: Emitter<K, F::Output>,
    {
        self.push_bounded(key, ts, input, END_OF_STREAM, out)
    }

    /// [`push`](Self::push) for a downstream stage: the tracked watermark
    /// never passes `upper_bound`.
    pub(crate) fn push_bounded<E>(
        &mut self,
        key: K,
        ts: EventTime,
        input: &F::Input,
        upper_bound: EventTime,
        out: &mut E,
    ) -> CoreResult<PushOutcome>
    where
        E: Emitter<K, F::Output>,
    {
        self.generator.observe_bounded(ts, upper_bound);
        let outcome = self.process_record(key, ts, input)?;
        if self.throttle.ready(Instant::now()) {
            self.publish(out)?;
        }
        Ok(outcome)
    }

    /// Merge one record without touching the watermark.
    ///
    /// Windows already closed against the published watermark are skipped
    /// unless they still wait to fire. If `add` fails for any window, none of
    /// the record's windows change. A timestamp too close to `i64::MIN` for
    /// any window to start is rejected with `CoreReason::EventTimeRange`.
    pub fn process_record(
        &mut self,
        key: K,
        ts: EventTime,
        input: &F::Input,
    ) -> CoreResult<PushOutcome> {
        self.stats.records_in += 1;

        let assigned = self.spec.assign(ts);
        if assigned.is_empty() {
            return Err(StructError::from(CoreReason::EventTimeRange)
                .with_detail(format!("no window of {:?} can hold ts={ts}", self.spec)));
        }
        let total = assigned.len();
        // a closed window still holding state has not fired yet (restored
        // after a failed emit) and keeps accepting records
        let live: Vec<TimeWindow> = assigned
            .into_iter()
            .filter(|w| {
                !self.scheduler.is_closed(w, self.watermark) || self.store.contains(&key, w)
            })
            .collect();
        let late = (total - live.len()) as u64;

        if live.is_empty() {
            self.stats.records_late += 1;
            self.stats.late_assignments += late;
            log::debug!(
                "window {}: dropped late record ts={} watermark={}",
                self.name,
                ts,
                self.watermark
            );
            return Ok(PushOutcome::DroppedLate);
        }

        let created = match self
            .store
            .merge_into_windows(&self.aggregate, &key, &live, input)
        {
            Ok(created) => created,
            Err(e) => {
                self.stats.accumulator_errors += 1;
                log::warn!("window {}: accumulator rejected record ts={}: {}", self.name, ts, e);
                return Err(e);
            }
        };

        self.stats.late_assignments += late;
        for (window, is_new) in live.iter().zip(created) {
            if is_new {
                self.scheduler.register(key.clone(), *window);
                self.stats.windows_created += 1;
            }
        }
        Ok(PushOutcome::Accepted {
            windows: live.len(),
        })
    }

    /// Publish `watermark` and fire every window whose fire time it reaches.
    ///
    /// A watermark below the published one is rejected and fires nothing.
    /// Returns the number of windows fired.
    pub fn advance_watermark<E>(&mut self, watermark: EventTime, out: &mut E) -> CoreResult<usize>
    where
        E: Emitter<K, F::Output>,
    {
        if watermark < self.watermark {
            log::debug!(
                "window {}: ignored watermark regression {} < {}",
                self.name,
                watermark,
                self.watermark
            );
            return Ok(0);
        }
        self.generator.advance_to(watermark);
        self.watermark = watermark;

        let due = self.scheduler.take_firable(watermark);
        self.fire(due, out)
    }

    /// Publish the tracked watermark regardless of the throttle.
    pub fn tick<E>(&mut self, out: &mut E) -> CoreResult<usize>
    where
        E: Emitter<K, F::Output>,
    {
        self.publish(out)
    }

    /// End of input: fire every remaining window in per-key ascending end
    /// order. Afterwards the operator is at `END_OF_STREAM` and every further
    /// record is late.
    pub fn flush_all<E>(&mut self, out: &mut E) -> CoreResult<usize>
    where
        E: Emitter<K, F::Output>,
    {
        let fired = self.advance_watermark(END_OF_STREAM, out)?;
        log::debug!("window {}: flushed {} windows", self.name, fired);
        Ok(fired)
    }

    fn publish<E>(&mut self, out: &mut E) -> CoreResult<usize>
    where
        E: Emitter<K, F::Output>,
    {
        match self.generator.current() {
            Some(w) => self.advance_watermark(w, out),
            None => Ok(0),
        }
    }

    /// Emit each due window, evicting its state only after the emitter
    /// accepted it. On emitter failure the failed and remaining windows are
    /// put back, so a retry emits them exactly once.
    fn fire<E>(&mut self, due: Vec<(K, TimeWindow)>, out: &mut E) -> CoreResult<usize>
    where
        E: Emitter<K, F::Output>,
    {
        let mut fired = 0;
        let mut due = due.into_iter();
        while let Some((key, window)) = due.next() {
            let Some(value) = self.store.extract(&self.aggregate, &key, &window) else {
                continue;
            };
            let result = WindowResult {
                key: key.clone(),
                window,
                value,
                watermark: self.watermark,
            };
            if let Err(e) = out.emit(result) {
                let mut unfired = vec![(key, window)];
                unfired.extend(due);
                log::warn!(
                    "window {}: emit failed, {} windows left pending: {}",
                    self.name,
                    unfired.len(),
                    e
                );
                self.scheduler.restore(unfired);
                return Err(StructError::from(CoreReason::Emit).with_detail(e.to_string()));
            }
            self.store.evict(&key, &window);
            self.stats.windows_fired += 1;
            fired += 1;
        }
        Ok(fired)
    }

    // -- accessors ----------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Published watermark, `None` before the first publish.
    pub fn watermark(&self) -> Option<EventTime> {
        (self.watermark != NO_WATERMARK).then_some(self.watermark)
    }

    /// Watermark tracked from pushed records, published or not.
    pub fn tracked_watermark(&self) -> Option<EventTime> {
        self.generator.current()
    }

    pub fn is_flushed(&self) -> bool {
        self.watermark == END_OF_STREAM
    }

    pub fn window_state(&self, key: &K, window: &TimeWindow) -> Option<WindowState> {
        self.scheduler
            .state(window, self.store.contains(key, window), self.watermark)
    }

    /// Open windows of `key`, ascending.
    pub fn pending_windows(&self, key: &K) -> Vec<TimeWindow> {
        self.store.pending_windows(key)
    }

    /// Number of `(key, window)` accumulators held.
    pub fn pending_count(&self) -> usize {
        self.store.len()
    }

    /// Earliest fire time among pending windows.
    pub fn next_fire_time(&self) -> Option<EventTime> {
        self.scheduler.next_fire_time()
    }

    pub fn stats(&self) -> OperatorStats {
        self.stats
    }

    pub fn aggregate(&self) -> &F {
        &self.aggregate
    }
}
