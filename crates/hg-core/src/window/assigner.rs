use std::time::Duration;

use crate::error::{CoreResult, invalid_spec};

/// Event time in nanoseconds since the Unix epoch.
pub type EventTime = i64;

// ---------------------------------------------------------------------------
// TimeWindow
// ---------------------------------------------------------------------------

/// Half-open event-time interval `[start, end)`.
///
/// Ordering is by `start` then `end`; for windows of one spec this is also
/// ascending end order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: EventTime) -> bool {
        self.start <= ts && ts < self.end
    }

    /// Last instant that still belongs to the window.
    pub fn max_timestamp(&self) -> EventTime {
        self.end - 1
    }

    pub fn length_nanos(&self) -> i64 {
        self.end - self.start
    }
}

/// A window scoped to one key. Identity is `(key, start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyedWindow<K> {
    pub key: K,
    pub window: TimeWindow,
}

// ---------------------------------------------------------------------------
// WindowSpec: tumbling / sliding assignment
// ---------------------------------------------------------------------------

/// Window shape. Construct through [`WindowSpec::tumbling`],
/// [`WindowSpec::sliding`] or [`WindowSpec::new`], which validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    Tumbling { length: Duration },
    Sliding { length: Duration, slide: Duration },
}

impl WindowSpec {
    pub fn tumbling(length: Duration) -> CoreResult<Self> {
        let spec = Self::Tumbling { length };
        spec.validate()?;
        Ok(spec)
    }

    pub fn sliding(length: Duration, slide: Duration) -> CoreResult<Self> {
        let spec = Self::Sliding { length, slide };
        spec.validate()?;
        Ok(spec)
    }

    /// Tumbling when `slide` is absent or equal to `length`.
    pub fn new(length: Duration, slide: Option<Duration>) -> CoreResult<Self> {
        match slide {
            Some(slide) if slide != length => Self::sliding(length, slide),
            _ => Self::tumbling(length),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        let (length, slide) = (self.length(), self.slide());
        if length.is_zero() {
            return Err(invalid_spec("window length must be > 0"));
        }
        if slide.is_zero() {
            return Err(invalid_spec("slide interval must be > 0"));
        }
        if slide > length {
            return Err(invalid_spec(format!(
                "slide interval ({slide:?}) exceeds window length ({length:?})"
            )));
        }
        if length.as_nanos() > i64::MAX as u128 {
            return Err(invalid_spec(format!(
                "window length {length:?} does not fit in i64 nanoseconds"
            )));
        }
        Ok(())
    }

    pub fn length(&self) -> Duration {
        match *self {
            Self::Tumbling { length } | Self::Sliding { length, .. } => length,
        }
    }

    pub fn slide(&self) -> Duration {
        match *self {
            Self::Tumbling { length } => length,
            Self::Sliding { slide, .. } => slide,
        }
    }

    pub fn length_nanos(&self) -> i64 {
        self.length().as_nanos() as i64
    }

    pub fn slide_nanos(&self) -> i64 {
        self.slide().as_nanos() as i64
    }

    /// Number of windows a single record lands in.
    pub fn fan_out(&self) -> usize {
        let (len, slide) = (self.length_nanos(), self.slide_nanos());
        (len / slide + i64::from(len % slide != 0)) as usize
    }

    /// All windows containing `ts`, in ascending start order.
    ///
    /// A record exactly on a boundary belongs to the window starting there.
    /// Empty when the window holding `ts` would start before `i64::MIN`.
    pub fn assign(&self, ts: EventTime) -> Vec<TimeWindow> {
        let len = self.length_nanos();
        let slide = self.slide_nanos();
        let Some(last_start) = window_start(ts, slide) else {
            return Vec::new();
        };

        let mut windows = Vec::with_capacity(self.fan_out());
        let mut start = last_start;
        while start > ts.saturating_sub(len) {
            windows.push(TimeWindow::new(start, start.saturating_add(len)));
            match start.checked_sub(slide) {
                Some(prev) => start = prev,
                None => break,
            }
        }
        windows.reverse();
        windows
    }

    /// [`assign`](Self::assign) with each window scoped to `key`.
    pub fn assign_keyed<K: Clone>(&self, key: &K, ts: EventTime) -> Vec<KeyedWindow<K>> {
        self.assign(ts)
            .into_iter()
            .map(|window| KeyedWindow {
                key: key.clone(),
                window,
            })
            .collect()
    }
}

/// `floor(ts / slide) * slide`, also for negative timestamps. `None` when
/// that start is not representable.
fn window_start(ts: EventTime, slide: i64) -> Option<EventTime> {
    ts.checked_sub(ts.rem_euclid(slide))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60 * 1_000_000_000;

    fn mins(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    #[test]
    fn tumbling_assigns_exactly_one_window() {
        let spec = WindowSpec::tumbling(mins(60)).unwrap();
        let w = spec.assign(10 * MIN);
        assert_eq!(w, vec![TimeWindow::new(0, 60 * MIN)]);
        assert_eq!(spec.fan_out(), 1);
    }

    #[test]
    fn tumbling_windows_tile_the_timeline() {
        let spec = WindowSpec::tumbling(mins(7)).unwrap();
        let mut prev: Option<TimeWindow> = None;
        for ts in (-30 * MIN..30 * MIN).step_by((MIN / 3) as usize) {
            let w = spec.assign(ts);
            assert_eq!(w.len(), 1, "ts={ts}");
            assert!(w[0].contains(ts));
            if let Some(p) = prev
                && p != w[0]
            {
                assert_eq!(p.end, w[0].start, "gap or overlap at ts={ts}");
            }
            prev = Some(w[0]);
        }
    }

    #[test]
    fn boundary_record_belongs_to_next_window() {
        let spec = WindowSpec::tumbling(mins(60)).unwrap();
        assert_eq!(spec.assign(60 * MIN), vec![TimeWindow::new(60 * MIN, 120 * MIN)]);
        assert_eq!(spec.assign(60 * MIN - 1), vec![TimeWindow::new(0, 60 * MIN)]);
    }

    #[test]
    fn negative_timestamps_floor() {
        let spec = WindowSpec::tumbling(mins(60)).unwrap();
        assert_eq!(spec.assign(-1), vec![TimeWindow::new(-60 * MIN, 0)]);
    }

    #[test]
    fn unrepresentable_window_start_yields_no_windows() {
        let spec = WindowSpec::tumbling(mins(60)).unwrap();
        assert!(spec.assign(-9_223_372_036_854_000_000).is_empty());
        assert!(spec.assign(i64::MIN).is_empty());
        let sliding = WindowSpec::sliding(mins(15), mins(5)).unwrap();
        assert!(sliding.assign(i64::MIN + 1).is_empty());
        // still fine right at the top of the range
        assert_eq!(spec.assign(i64::MAX).len(), 1);
    }

    #[test]
    fn sliding_fan_out_is_length_over_slide() {
        let spec = WindowSpec::sliding(mins(15), mins(5)).unwrap();
        assert_eq!(spec.fan_out(), 3);

        let w = spec.assign(12 * MIN);
        assert_eq!(
            w,
            vec![
                TimeWindow::new(0, 15 * MIN),
                TimeWindow::new(5 * MIN, 20 * MIN),
                TimeWindow::new(10 * MIN, 25 * MIN),
            ]
        );
        assert!(w.iter().all(|win| win.contains(12 * MIN)));
    }

    #[test]
    fn sliding_boundary_record() {
        let spec = WindowSpec::sliding(mins(15), mins(5)).unwrap();
        let w = spec.assign(10 * MIN);
        assert_eq!(w.len(), 3);
        assert_eq!(w.last().unwrap().start, 10 * MIN);
        assert_eq!(w.first().unwrap().end, 15 * MIN);
    }

    #[test]
    fn sliding_uneven_slide() {
        let spec = WindowSpec::sliding(mins(10), mins(4)).unwrap();
        assert_eq!(spec.fan_out(), 3);
        for ts in [0, MIN, 3 * MIN, 9 * MIN, 11 * MIN] {
            let w = spec.assign(ts);
            assert!(!w.is_empty() && w.len() <= 3);
            assert!(w.iter().all(|win| win.contains(ts)), "ts={ts}");
        }
        // 1 min lands in [-8,2), [-4,6), [0,10)
        assert_eq!(spec.assign(MIN).len(), 3);
        // 3 min lands in [-4,6), [0,10)
        assert_eq!(spec.assign(3 * MIN).len(), 2);
    }

    #[test]
    fn new_with_equal_slide_is_tumbling() {
        let spec = WindowSpec::new(mins(5), Some(mins(5))).unwrap();
        assert!(matches!(spec, WindowSpec::Tumbling { .. }));
        let spec = WindowSpec::new(mins(5), None).unwrap();
        assert_eq!(spec.slide(), mins(5));
    }

    #[test]
    fn invalid_specs_are_rejected() {
        assert!(WindowSpec::tumbling(Duration::ZERO).is_err());
        assert!(WindowSpec::sliding(mins(5), mins(15)).is_err());
        assert!(WindowSpec::sliding(mins(5), Duration::ZERO).is_err());
        assert!(WindowSpec::tumbling(Duration::MAX).is_err());
    }

    #[test]
    fn keyed_assignment_carries_key() {
        let spec = WindowSpec::sliding(mins(15), mins(5)).unwrap();
        let kw = spec.assign_keyed(&"cell-7", 0);
        assert_eq!(kw.len(), 3);
        assert!(kw.iter().all(|k| k.key == "cell-7"));
    }
}
