use std::time::{Duration, Instant};

use super::assigner::EventTime;

/// Watermark value before any record has been observed.
pub const NO_WATERMARK: EventTime = i64::MIN;

/// Watermark published once the input is exhausted; closes every window.
pub const END_OF_STREAM: EventTime = i64::MAX;

// ---------------------------------------------------------------------------
// WatermarkGenerator: bounded out-of-orderness
// ---------------------------------------------------------------------------

/// Derives a monotone watermark `max_seen - max_out_of_orderness` from the
/// event times it observes.
#[derive(Debug, Clone)]
pub struct WatermarkGenerator {
    max_out_of_orderness: i64,
    max_seen: EventTime,
    current: EventTime,
}

impl WatermarkGenerator {
    pub fn new(max_out_of_orderness: Duration) -> Self {
        Self {
            max_out_of_orderness: max_out_of_orderness.as_nanos().min(i64::MAX as u128) as i64,
            max_seen: NO_WATERMARK,
            current: NO_WATERMARK,
        }
    }

    /// Observe one event time and return the (possibly advanced) watermark.
    pub fn observe(&mut self, ts: EventTime) -> Option<EventTime> {
        self.observe_bounded(ts, END_OF_STREAM)
    }

    /// Like [`observe`](Self::observe), but the watermark never passes
    /// `upper_bound`. Used by downstream stages, whose watermark must stay
    /// behind the upstream one.
    pub fn observe_bounded(&mut self, ts: EventTime, upper_bound: EventTime) -> Option<EventTime> {
        self.max_seen = self.max_seen.max(ts);
        let candidate = self
            .max_seen
            .saturating_sub(self.max_out_of_orderness)
            .min(upper_bound);
        self.current = self.current.max(candidate);
        self.current()
    }

    /// Current watermark, `None` before the first record.
    pub fn current(&self) -> Option<EventTime> {
        (self.current != NO_WATERMARK).then_some(self.current)
    }

    /// Largest event time observed so far.
    pub fn max_seen(&self) -> Option<EventTime> {
        (self.max_seen != NO_WATERMARK).then_some(self.max_seen)
    }

    /// Force the watermark forward. Regressions are rejected (returns `false`).
    pub fn advance_to(&mut self, watermark: EventTime) -> bool {
        if watermark <= self.current {
            return false;
        }
        self.current = watermark;
        true
    }
}

// ---------------------------------------------------------------------------
// WatermarkThrottle: wall-clock gate for firing evaluation
// ---------------------------------------------------------------------------

/// Limits how often a new watermark is published. Only affects *when* firing
/// checks run; a zero interval opens the gate on every call.
#[derive(Debug, Clone)]
pub struct WatermarkThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl WatermarkThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` (and restarts the interval) when a publish is due.
    pub fn ready(&mut self, now: Instant) -> bool {
        if self.interval.is_zero() {
            return true;
        }
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
