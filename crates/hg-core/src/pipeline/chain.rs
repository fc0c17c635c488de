use std::hash::Hash;

use crate::aggregate::AggregateFunction;
use crate::error::CoreResult;
use crate::sink::{Emitter, WindowResult};
use crate::window::{EventTime, PushOutcome, WindowOperator};

/// Stage-1 output of a chain, as seen by stage 2.
type Upstream<K, F> = WindowResult<K, <F as AggregateFunction>::Output>;

/// Feeds every window fired by `first` into `second`, re-keyed by `rekey`.
///
/// Stage 2 tracks its own watermark from stage-1 result timestamps but never
/// lets it pass the watermark at which the feeding stage-1 window fired. Both
/// operators keep their own throttle, lateness, and counters.
pub struct ChainedPipeline<K1, F1, K2, F2, R>
where
    F1: AggregateFunction,
    F2: AggregateFunction<Input = Upstream<K1, F1>>,
{
    first: WindowOperator<K1, F1>,
    second: WindowOperator<K2, F2>,
    rekey: R,
}

impl<K1, F1, K2, F2, R> ChainedPipeline<K1, F1, K2, F2, R>
where
    K1: Hash + Eq + Clone,
    K2: Hash + Eq + Clone,
    F1: AggregateFunction,
    F2: AggregateFunction<Input = Upstream<K1, F1>>,
    R: Fn(&Upstream<K1, F1>) -> K2,
{
    pub fn new(first: WindowOperator<K1, F1>, second: WindowOperator<K2, F2>, rekey: R) -> Self {
        Self {
            first,
            second,
            rekey,
        }
    }

    /// Push a raw record into stage 1. Stage-1 windows fired by it flow into
    /// stage 2 before this returns.
    ///
    /// A stage-2 failure does not undo the stage-1 firing that caused it; it
    /// is reported once every due stage-1 window has been handed over.
    pub fn push<E>(
        &mut self,
        key: K1,
        ts: EventTime,
        input: &F1::Input,
        out: &mut E,
    ) -> CoreResult<PushOutcome>
    where
        E: Emitter<K2, F2::Output>,
    {
        let mut bridge = Bridge::new(&mut self.second, &self.rekey, out);
        let outcome = self.first.push(key, ts, input, &mut bridge)?;
        bridge.finish()?;
        Ok(outcome)
    }

    /// Publish both stages' tracked watermarks regardless of their throttles.
    pub fn tick<E>(&mut self, out: &mut E) -> CoreResult<usize>
    where
        E: Emitter<K2, F2::Output>,
    {
        let mut bridge = Bridge::new(&mut self.second, &self.rekey, out);
        self.first.tick(&mut bridge)?;
        bridge.finish()?;
        self.second.tick(out)
    }

    /// Flush stage 1 into stage 2, then flush stage 2. Returns the number of
    /// stage-2 windows fired by the final flush.
    pub fn flush_all<E>(&mut self, out: &mut E) -> CoreResult<usize>
    where
        E: Emitter<K2, F2::Output>,
    {
        let mut bridge = Bridge::new(&mut self.second, &self.rekey, out);
        let upstream = self.first.flush_all(&mut bridge)?;
        bridge.finish()?;
        log::debug!(
            "chain {} -> {}: flushed {} upstream windows",
            self.first.name(),
            self.second.name(),
            upstream
        );
        self.second.flush_all(out)
    }

    pub fn first(&self) -> &WindowOperator<K1, F1> {
        &self.first
    }

    pub fn second(&self) -> &WindowOperator<K2, F2> {
        &self.second
    }
}

// ---------------------------------------------------------------------------
// Bridge: stage-1 emitter that pushes into stage 2
// ---------------------------------------------------------------------------

struct Bridge<'a, K2, F2, R, E>
where
    F2: AggregateFunction,
{
    second: &'a mut WindowOperator<K2, F2>,
    rekey: &'a R,
    out: &'a mut E,
    failure: Option<crate::error::CoreError>,
}

impl<'a, K2, F2, R, E> Bridge<'a, K2, F2, R, E>
where
    F2: AggregateFunction,
{
    fn new(second: &'a mut WindowOperator<K2, F2>, rekey: &'a R, out: &'a mut E) -> Self {
        Self {
            second,
            rekey,
            out,
            failure: None,
        }
    }

    fn finish(self) -> CoreResult<()> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<K1, O1, K2, F2, R, E> Emitter<K1, O1> for Bridge<'_, K2, F2, R, E>
where
    K2: Hash + Eq + Clone,
    F2: AggregateFunction<Input = WindowResult<K1, O1>>,
    R: Fn(&WindowResult<K1, O1>) -> K2,
    E: Emitter<K2, F2::Output>,
{
    /// Never fails: once a stage-1 result reaches stage 2 it counts as
    /// delivered, so stage 1 must not retry it. Stage-2 errors are kept for
    /// [`Bridge::finish`].
    fn emit(&mut self, result: WindowResult<K1, O1>) -> CoreResult<()> {
        let key = (self.rekey)(&result);
        let ts = result.window.max_timestamp();
        let bound = result.watermark;
        match self.second.push_bounded(key, ts, &result, bound, self.out) {
            Ok(PushOutcome::DroppedLate) => {
                log::debug!(
                    "window {}: upstream result for window ending {} arrived late",
                    self.second.name(),
                    result.window.end
                );
            }
            Ok(PushOutcome::Accepted { .. }) => {}
            Err(e) => {
                if self.failure.is_none() {
                    self.failure = Some(e);
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
