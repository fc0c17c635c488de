use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use hg_core::window::NO_WATERMARK;
use hg_core::{EventTime, OperatorStats};
use serde::Serialize;

// ---------------------------------------------------------------------------
// RuntimeMetrics: live counters shared by the router and all lanes
// ---------------------------------------------------------------------------

/// Lock-free counters updated while a [`PartitionedRunner`](crate::PartitionedRunner)
/// is running. Readable at any time from another task.
#[derive(Debug)]
pub struct RuntimeMetrics {
    records_in: AtomicU64,
    records_by_lane: Vec<AtomicU64>,
    records_late: AtomicU64,
    accumulator_errors: AtomicU64,
    windows_fired: AtomicU64,
    watermark_broadcasts: AtomicU64,
    watermark: AtomicI64,
}

impl RuntimeMetrics {
    pub fn new(lanes: usize) -> Self {
        Self {
            records_in: AtomicU64::new(0),
            records_by_lane: (0..lanes).map(|_| AtomicU64::new(0)).collect(),
            records_late: AtomicU64::new(0),
            accumulator_errors: AtomicU64::new(0),
            windows_fired: AtomicU64::new(0),
            watermark_broadcasts: AtomicU64::new(0),
            watermark: AtomicI64::new(NO_WATERMARK),
        }
    }

    pub fn inc_record_routed(&self, lane: usize) {
        self.records_in.fetch_add(1, Ordering::Relaxed);
        if let Some(counter) = self.records_by_lane.get(lane) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_record_late(&self) {
        self.records_late.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_accumulator_error(&self) {
        self.accumulator_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_window_fired(&self) {
        self.windows_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_watermark(&self, watermark: EventTime) {
        self.watermark_broadcasts.fetch_add(1, Ordering::Relaxed);
        self.watermark.fetch_max(watermark, Ordering::Relaxed);
    }

    pub fn records_in(&self) -> u64 {
        self.records_in.load(Ordering::Relaxed)
    }

    pub fn records_late(&self) -> u64 {
        self.records_late.load(Ordering::Relaxed)
    }

    pub fn windows_fired(&self) -> u64 {
        self.windows_fired.load(Ordering::Relaxed)
    }

    /// Last broadcast watermark, `None` before the first one.
    pub fn watermark(&self) -> Option<EventTime> {
        let w = self.watermark.load(Ordering::Relaxed);
        (w != NO_WATERMARK).then_some(w)
    }

    pub fn lane_records(&self) -> Vec<u64> {
        self.records_by_lane
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// RunReport: final summary of one run
// ---------------------------------------------------------------------------

/// Summary returned once every lane has stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub stage: String,
    pub lanes: usize,
    pub records_in: u64,
    pub records_by_lane: Vec<u64>,
    pub records_late: u64,
    pub late_assignments: u64,
    pub accumulator_errors: u64,
    pub windows_created: u64,
    pub windows_fired: u64,
    pub watermark_broadcasts: u64,
    pub final_watermark: Option<EventTime>,
    /// Windows still holding state when the run ended (non-zero only when
    /// the run was cancelled or `flush_on_close` is off).
    pub pending_windows: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub(crate) fn new(stage: &str, metrics: &RuntimeMetrics) -> Self {
        Self {
            stage: stage.to_string(),
            lanes: metrics.records_by_lane.len(),
            records_in: metrics.records_in(),
            records_by_lane: metrics.lane_records(),
            watermark_broadcasts: metrics.watermark_broadcasts.load(Ordering::Relaxed),
            final_watermark: metrics.watermark(),
            ..Self::default()
        }
    }

    /// Fold one lane's operator counters into the report.
    pub(crate) fn add_lane(&mut self, stats: &OperatorStats, pending: usize) {
        self.records_late += stats.records_late;
        self.late_assignments += stats.late_assignments;
        self.accumulator_errors += stats.accumulator_errors;
        self.windows_created += stats.windows_created;
        self.windows_fired += stats.windows_fired;
        self.pending_windows += pending;
    }
}
