use std::collections::BTreeMap;
use std::time::Duration;

use super::assigner::{EventTime, TimeWindow};

// ---------------------------------------------------------------------------
// WindowState
// ---------------------------------------------------------------------------

/// Lifecycle of one `(key, window)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Accumulator exists and `fire_time > watermark`.
    Open,
    /// Accumulator exists and the watermark has crossed `fire_time`; fires on
    /// the next evaluation.
    Firable,
    /// Terminal: accumulator evicted, result emitted; later records are late.
    Fired,
}

// ---------------------------------------------------------------------------
// FireScheduler: event-time timer queue
// ---------------------------------------------------------------------------

/// Timer queue keyed by fire time (`window.end + allowed_lateness`).
///
/// Timers are registered once, when a window's accumulator is created.
/// Because fire time grows with `window.end`, draining the queue in key order
/// yields every key's windows in ascending end order.
#[derive(Debug)]
pub struct FireScheduler<K> {
    allowed_lateness: i64,
    timers: BTreeMap<EventTime, Vec<(K, TimeWindow)>>,
    pending: usize,
}

impl<K> FireScheduler<K> {
    pub fn new(allowed_lateness: Duration) -> Self {
        Self {
            allowed_lateness: allowed_lateness.as_nanos().min(i64::MAX as u128) as i64,
            timers: BTreeMap::new(),
            pending: 0,
        }
    }

    pub fn fire_time(&self, window: &TimeWindow) -> EventTime {
        window.end.saturating_add(self.allowed_lateness)
    }

    /// A window is closed once the watermark reaches its fire time. Records
    /// for closed windows are late.
    pub fn is_closed(&self, window: &TimeWindow, watermark: EventTime) -> bool {
        self.fire_time(window) <= watermark
    }

    /// Classify a window given whether it still holds an accumulator.
    ///
    /// `None` for a window that never received a record and is not yet closed.
    pub fn state(
        &self,
        window: &TimeWindow,
        has_accumulator: bool,
        watermark: EventTime,
    ) -> Option<WindowState> {
        match (has_accumulator, self.is_closed(window, watermark)) {
            (true, false) => Some(WindowState::Open),
            (true, true) => Some(WindowState::Firable),
            (false, true) => Some(WindowState::Fired),
            (false, false) => None,
        }
    }

    pub fn register(&mut self, key: K, window: TimeWindow) {
        let at = self.fire_time(&window);
        self.timers.entry(at).or_default().push((key, window));
        self.pending += 1;
    }

    /// Remove and return every timer with `fire_time <= watermark`, in
    /// ascending fire-time order (registration order within a fire time).
    pub fn take_firable(&mut self, watermark: EventTime) -> Vec<(K, TimeWindow)> {
        let later = match watermark.checked_add(1) {
            Some(bound) => self.timers.split_off(&bound),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.timers, later);
        self.drain(due)
    }

    /// Remove and return every timer regardless of watermark.
    pub fn take_all(&mut self) -> Vec<(K, TimeWindow)> {
        let due = std::mem::take(&mut self.timers);
        self.drain(due)
    }

    /// Put back timers that were taken but not fired. Restored entries keep
    /// their position ahead of later registrations with the same fire time.
    pub fn restore(&mut self, unfired: Vec<(K, TimeWindow)>) {
        let mut grouped: BTreeMap<EventTime, Vec<(K, TimeWindow)>> = BTreeMap::new();
        for (key, window) in unfired {
            grouped
                .entry(self.fire_time(&window))
                .or_default()
                .push((key, window));
        }
        for (at, mut entries) in grouped {
            self.pending += entries.len();
            let slot = self.timers.entry(at).or_default();
            entries.append(slot);
            *slot = entries;
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Earliest registered fire time.
    pub fn next_fire_time(&self) -> Option<EventTime> {
        self.timers.keys().next().copied()
    }

    fn drain(&mut self, due: BTreeMap<EventTime, Vec<(K, TimeWindow)>>) -> Vec<(K, TimeWindow)> {
        let out: Vec<(K, TimeWindow)> = due.into_values().flatten().collect();
        self.pending -= out.len();
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
