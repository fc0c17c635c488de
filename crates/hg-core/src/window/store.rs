use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use orion_error::compat_prelude::*;

use super::assigner::TimeWindow;
use crate::aggregate::AggregateFunction;
use crate::error::{CoreReason, CoreResult};

// ---------------------------------------------------------------------------
// AccumulatorStore
// ---------------------------------------------------------------------------

/// Per `(key, window)` accumulator state.
///
/// Each key owns an ordered map of its open windows, so per-key iteration is
/// always ascending by window. Entries are created lazily on the first record
/// and removed exactly once by [`extract_and_evict`](Self::extract_and_evict).
#[derive(Debug)]
pub struct AccumulatorStore<K, A> {
    entries: HashMap<K, BTreeMap<TimeWindow, A>>,
    len: usize,
}

impl<K, A> Default for AccumulatorStore<K, A> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            len: 0,
        }
    }
}

impl<K: Hash + Eq + Clone, A> AccumulatorStore<K, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one record into the accumulator for `(key, window)`, creating it
    /// on first use. Returns `true` when the entry was created.
    pub fn merge_record<F>(
        &mut self,
        agg: &F,
        key: &K,
        window: TimeWindow,
        input: &F::Input,
    ) -> CoreResult<bool>
    where
        F: AggregateFunction<Acc = A>,
    {
        let created = self.merge_into_windows(agg, key, &[window], input)?;
        Ok(created.first().copied().unwrap_or(false))
    }

    /// Merge one record into every window it was assigned to.
    ///
    /// All new accumulators are computed before anything is written: if `add`
    /// fails for any window, no window of the record is touched. The returned
    /// flags say, per window, whether the entry was created.
    pub fn merge_into_windows<F>(
        &mut self,
        agg: &F,
        key: &K,
        windows: &[TimeWindow],
        input: &F::Input,
    ) -> CoreResult<Vec<bool>>
    where
        F: AggregateFunction<Acc = A>,
    {
        let existing = self.entries.get(key);
        let mut staged = Vec::with_capacity(windows.len());
        for window in windows {
            let (next, created) = match existing.and_then(|w| w.get(window)) {
                Some(acc) => (agg.add(input, acc).owe(CoreReason::Accumulator)?, false),
                None => {
                    let fresh = agg.create_accumulator();
                    (agg.add(input, &fresh).owe(CoreReason::Accumulator)?, true)
                }
            };
            staged.push((*window, next, created));
        }
        if staged.is_empty() {
            return Ok(Vec::new());
        }

        let slot = self.entries.entry(key.clone()).or_default();
        let mut flags = Vec::with_capacity(staged.len());
        for (window, acc, created) in staged {
            slot.insert(window, acc);
            if created {
                self.len += 1;
            }
            flags.push(created);
        }
        Ok(flags)
    }

    /// Read-only extraction of the current value of `(key, window)`.
    pub fn extract<F>(&self, agg: &F, key: &K, window: &TimeWindow) -> Option<F::Output>
    where
        F: AggregateFunction<Acc = A>,
    {
        self.entries
            .get(key)
            .and_then(|windows| windows.get(window))
            .map(|acc| agg.extract(acc))
    }

    /// Drop the state of `(key, window)`. Returns `false` when absent.
    pub fn evict(&mut self, key: &K, window: &TimeWindow) -> bool {
        let Some(windows) = self.entries.get_mut(key) else {
            return false;
        };
        if windows.remove(window).is_none() {
            return false;
        }
        if windows.is_empty() {
            self.entries.remove(key);
        }
        self.len -= 1;
        true
    }

    /// Extract the final value of `(key, window)` and drop its state.
    ///
    /// Returns `None` when there is no such entry, so a second fire of the
    /// same window is a no-op.
    pub fn extract_and_evict<F>(&mut self, agg: &F, key: &K, window: &TimeWindow) -> Option<F::Output>
    where
        F: AggregateFunction<Acc = A>,
    {
        let value = self.extract(agg, key, window)?;
        self.evict(key, window);
        Some(value)
    }

    pub fn contains(&self, key: &K, window: &TimeWindow) -> bool {
        self.entries
            .get(key)
            .is_some_and(|windows| windows.contains_key(window))
    }

    /// Open windows of `key`, ascending.
    pub fn pending_windows(&self, key: &K) -> Vec<TimeWindow> {
        self.entries
            .get(key)
            .map(|windows| windows.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of `(key, window)` entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
