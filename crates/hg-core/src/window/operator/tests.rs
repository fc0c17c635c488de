use std::time::Duration;

use hg_config::{HumanDuration, StageConfig};

use super::{OperatorConfig, PushOutcome, WindowOperator};
use crate::aggregate::{Count, FnAggregate, Sum};
use crate::error::{CoreReason, CoreResult};
use crate::sink::{FnEmitter, WindowResult};
use crate::window::assigner::{TimeWindow, WindowSpec};
use crate::window::scheduler::WindowState;
use crate::window::watermark::END_OF_STREAM;

const SEC: i64 = 1_000_000_000;
const MIN: i64 = 60 * SEC;
const HOUR: i64 = 60 * MIN;

#[derive(Debug, Clone)]
struct Tip {
    driver: u32,
    amount: f64,
}

fn tip(driver: u32, amount: f64) -> Tip {
    Tip { driver, amount }
}

type TipSum = Sum<Tip, fn(&Tip) -> f64>;

fn tip_amount(t: &Tip) -> f64 {
    t.amount
}

fn tip_sum() -> TipSum {
    Sum::new(tip_amount as fn(&Tip) -> f64)
}

fn hourly(max_out_of_orderness: Duration) -> WindowOperator<u32, TipSum> {
    let config = OperatorConfig::new(WindowSpec::tumbling(Duration::from_secs(3600)).unwrap())
        .with_max_out_of_orderness(max_out_of_orderness);
    WindowOperator::new("hourly_sums", config, tip_sum()).unwrap()
}

fn push_tips(
    op: &mut WindowOperator<u32, TipSum>,
    tips: &[(i64, Tip)],
    out: &mut Vec<WindowResult<u32, f64>>,
) {
    for (ts, t) in tips {
        op.push(t.driver, *ts, t, out).unwrap();
    }
}

fn summary(out: &[WindowResult<u32, f64>]) -> Vec<(u32, i64, f64)> {
    out.iter().map(|r| (r.key, r.window_end(), r.value)).collect()
}

// ---------------------------------------------------------------------------
// Firing
// ---------------------------------------------------------------------------

#[test]
fn hourly_tip_sum_fires_after_watermark_passes_end() {
    let mut op = hourly(Duration::from_secs(60));
    let mut out = Vec::new();
    push_tips(
        &mut op,
        &[
            (10 * MIN, tip(1, 5.0)),
            (50 * MIN, tip(1, 3.0)),
            (HOUR + 5 * MIN, tip(1, 10.0)),
        ],
        &mut out,
    );

    assert_eq!(summary(&out), vec![(1, HOUR, 8.0)]);
    assert_eq!(out[0].window, TimeWindow::new(0, HOUR));
    assert_eq!(out[0].watermark, HOUR + 4 * MIN);
    assert_eq!(op.pending_windows(&1), vec![TimeWindow::new(HOUR, 2 * HOUR)]);
    assert_eq!(
        op.window_state(&1, &TimeWindow::new(HOUR, 2 * HOUR)),
        Some(WindowState::Open)
    );
    assert_eq!(
        op.window_state(&1, &TimeWindow::new(0, HOUR)),
        Some(WindowState::Fired)
    );
}

#[test]
fn out_of_orderness_holds_window_open() {
    let mut op = hourly(Duration::from_secs(600));
    let mut out = Vec::new();
    push_tips(
        &mut op,
        &[(50 * MIN, tip(1, 1.0)), (HOUR + 5 * MIN, tip(1, 2.0))],
        &mut out,
    );
    // watermark 00:55: the first hour is still open for a straggler
    assert!(out.is_empty());
    assert_eq!(
        op.push(1, 59 * MIN, &tip(1, 4.0), &mut out).unwrap(),
        PushOutcome::Accepted { windows: 1 }
    );
    op.push(1, HOUR + 11 * MIN, &tip(1, 0.5), &mut out).unwrap();
    assert_eq!(summary(&out), vec![(1, HOUR, 5.0)]);
}

#[test]
fn each_window_fires_exactly_once() {
    let mut op = hourly(Duration::ZERO);
    let mut out = Vec::new();
    push_tips(
        &mut op,
        &[(10 * MIN, tip(7, 1.0)), (2 * HOUR, tip(7, 1.0))],
        &mut out,
    );
    assert_eq!(out.len(), 1);

    // re-publishing the same or a larger watermark does not fire again
    op.advance_watermark(2 * HOUR, &mut out).unwrap();
    op.tick(&mut out).unwrap();
    assert_eq!(out.len(), 1);

    op.flush_all(&mut out).unwrap();
    op.flush_all(&mut out).unwrap();
    assert_eq!(summary(&out), vec![(7, HOUR, 1.0), (7, 3 * HOUR, 1.0)]);
    assert_eq!(op.pending_count(), 0);
    assert_eq!(op.stats().windows_fired, 2);
}

#[test]
fn empty_windows_never_emit() {
    let mut op = hourly(Duration::ZERO);
    let mut out = Vec::new();
    push_tips(
        &mut op,
        &[(10 * MIN, tip(1, 1.0)), (5 * HOUR, tip(1, 1.0))],
        &mut out,
    );
    op.flush_all(&mut out).unwrap();
    // nothing for hours 1..5
    assert_eq!(summary(&out), vec![(1, HOUR, 1.0), (1, 6 * HOUR, 1.0)]);
}

#[test]
fn per_key_results_come_in_ascending_end_order() {
    let mut op = hourly(Duration::ZERO);
    let mut out = Vec::new();
    op.advance_watermark(0, &mut out).unwrap();

    // publish manually so several windows become due at once
    for (ts, driver) in [(3 * HOUR, 2), (HOUR, 1), (2 * HOUR, 1), (10, 1), (HOUR + 1, 2)] {
        op.process_record(driver, ts, &tip(driver, 1.0)).unwrap();
    }
    op.advance_watermark(5 * HOUR, &mut out).unwrap();

    for driver in [1, 2] {
        let ends: Vec<i64> = out
            .iter()
            .filter(|r| r.key == driver)
            .map(|r| r.window_end())
            .collect();
        let mut sorted = ends.clone();
        sorted.sort();
        assert_eq!(ends, sorted, "driver {driver} out of order");
    }
    assert_eq!(out.len(), 5);
}

// ---------------------------------------------------------------------------
// Lateness
// ---------------------------------------------------------------------------

#[test]
fn record_for_fired_window_is_dropped_and_counted() {
    let mut op = hourly(Duration::ZERO);
    let mut out = Vec::new();
    push_tips(
        &mut op,
        &[(10 * MIN, tip(1, 5.0)), (HOUR + MIN, tip(1, 1.0))],
        &mut out,
    );
    assert_eq!(out.len(), 1);

    let outcome = op.push(1, 20 * MIN, &tip(1, 100.0), &mut out).unwrap();
    assert_eq!(outcome, PushOutcome::DroppedLate);
    op.flush_all(&mut out).unwrap();

    assert_eq!(summary(&out), vec![(1, HOUR, 5.0), (1, 2 * HOUR, 1.0)]);
    let stats = op.stats();
    assert_eq!(stats.records_in, 3);
    assert_eq!(stats.records_late, 1);
    assert_eq!(stats.late_assignments, 1);
}

#[test]
fn allowed_lateness_delays_firing_and_accepts_stragglers() {
    let config = OperatorConfig::new(WindowSpec::tumbling(Duration::from_secs(3600)).unwrap())
        .with_allowed_lateness(Duration::from_secs(600));
    let mut op = WindowOperator::new("late", config, tip_sum()).unwrap();
    let mut out = Vec::new();

    push_tips(
        &mut op,
        &[(10 * MIN, tip(1, 5.0)), (HOUR + 5 * MIN, tip(1, 1.0))],
        &mut out,
    );
    assert!(out.is_empty());
    assert_eq!(
        op.window_state(&1, &TimeWindow::new(0, HOUR)),
        Some(WindowState::Open)
    );

    assert_eq!(
        op.push(1, 30 * MIN, &tip(1, 2.0), &mut out).unwrap(),
        PushOutcome::Accepted { windows: 1 }
    );
    op.push(1, HOUR + 10 * MIN, &tip(1, 1.0), &mut out).unwrap();
    assert_eq!(summary(&out), vec![(1, HOUR, 7.0)]);
    assert_eq!(op.stats().records_late, 0);
}

#[test]
fn records_after_flush_are_late() {
    let mut op = hourly(Duration::ZERO);
    let mut out = Vec::new();
    op.push(1, 10, &tip(1, 1.0), &mut out).unwrap();
    op.flush_all(&mut out).unwrap();
    assert!(op.is_flushed());
    assert_eq!(op.watermark(), Some(END_OF_STREAM));

    assert_eq!(
        op.push(1, 20, &tip(1, 1.0), &mut out).unwrap(),
        PushOutcome::DroppedLate
    );
    op.flush_all(&mut out).unwrap();
    assert_eq!(out.len(), 1);
}

// ---------------------------------------------------------------------------
// Sliding windows
// ---------------------------------------------------------------------------

#[test]
fn sliding_record_lands_in_every_overlapping_window() {
    let spec = WindowSpec::sliding(Duration::from_secs(900), Duration::from_secs(300)).unwrap();
    let mut op = WindowOperator::new("popular", OperatorConfig::new(spec), Count::new()).unwrap();
    let mut out: Vec<WindowResult<&str, u64>> = Vec::new();

    assert_eq!(
        op.push("a", 12 * MIN, &(), &mut out).unwrap(),
        PushOutcome::Accepted { windows: 3 }
    );
    op.push("a", 13 * MIN, &(), &mut out).unwrap();
    op.flush_all(&mut out).unwrap();

    let got: Vec<(i64, i64, u64)> = out
        .iter()
        .map(|r| (r.window.start, r.window.end, r.value))
        .collect();
    assert_eq!(
        got,
        vec![
            (0, 15 * MIN, 2),
            (5 * MIN, 20 * MIN, 2),
            (10 * MIN, 25 * MIN, 2),
        ]
    );
}

#[test]
fn sliding_record_partially_late_keeps_open_windows() {
    let spec = WindowSpec::sliding(Duration::from_secs(900), Duration::from_secs(300)).unwrap();
    let mut op = WindowOperator::new("popular", OperatorConfig::new(spec), Count::new()).unwrap();
    let mut out: Vec<WindowResult<&str, u64>> = Vec::new();

    op.advance_watermark(15 * MIN, &mut out).unwrap();
    // [0,15) is closed, [5,20) and [10,25) are not
    assert_eq!(
        op.push("a", 12 * MIN, &(), &mut out).unwrap(),
        PushOutcome::Accepted { windows: 2 }
    );
    assert_eq!(op.stats().late_assignments, 1);
    assert_eq!(op.stats().records_late, 0);
}

// ---------------------------------------------------------------------------
// Watermark publication
// ---------------------------------------------------------------------------

#[test]
fn throttle_defers_firing_until_tick() {
    let config = OperatorConfig::new(WindowSpec::tumbling(Duration::from_secs(3600)).unwrap())
        .with_watermark_interval(Duration::from_secs(3600));
    let mut op = WindowOperator::new("throttled", config, tip_sum()).unwrap();
    let mut out = Vec::new();

    // first push publishes, later ones fall inside the interval
    push_tips(
        &mut op,
        &[(10 * MIN, tip(1, 5.0)), (2 * HOUR, tip(1, 1.0))],
        &mut out,
    );
    assert!(out.is_empty());
    assert_eq!(op.watermark(), Some(10 * MIN));
    assert_eq!(op.tracked_watermark(), Some(2 * HOUR));
    assert_eq!(
        op.window_state(&1, &TimeWindow::new(0, HOUR)),
        Some(WindowState::Open)
    );

    assert_eq!(op.tick(&mut out).unwrap(), 1);
    assert_eq!(summary(&out), vec![(1, HOUR, 5.0)]);
}

#[test]
fn watermark_regression_is_ignored() {
    let mut op = hourly(Duration::ZERO);
    let mut out = Vec::new();
    op.process_record(1, 10, &tip(1, 1.0)).unwrap();
    assert_eq!(op.advance_watermark(HOUR, &mut out).unwrap(), 1);
    assert_eq!(op.advance_watermark(10, &mut out).unwrap(), 0);
    assert_eq!(op.watermark(), Some(HOUR));
}

#[test]
fn next_fire_time_tracks_earliest_window() {
    let mut op = hourly(Duration::ZERO);
    let mut out = Vec::new();
    op.advance_watermark(0, &mut out).unwrap();
    op.process_record(1, 10, &tip(1, 1.0)).unwrap();
    assert_eq!(op.next_fire_time(), Some(HOUR));
    assert_eq!(
        op.window_state(&1, &TimeWindow::new(0, HOUR)),
        Some(WindowState::Open)
    );
    assert_eq!(op.window_state(&2, &TimeWindow::new(0, HOUR)), None);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

fn picky_sum() -> FnAggregate<Tip, f64, f64> {
    FnAggregate::new(
        || 0.0,
        |t: &Tip, acc: &f64| {
            if t.amount < 0.0 {
                anyhow::bail!("negative tip {}", t.amount);
            }
            Ok(acc + t.amount)
        },
        |a: &f64, b: &f64| Ok(a + b),
        |acc: &f64| *acc,
    )
}

#[test]
fn accumulator_error_aborts_only_that_record() {
    let config = OperatorConfig::new(WindowSpec::tumbling(Duration::from_secs(3600)).unwrap());
    let mut op = WindowOperator::new("picky", config, picky_sum()).unwrap();
    let mut out = Vec::new();

    op.push(1, 10, &tip(1, 2.0), &mut out).unwrap();
    assert!(op.push(1, 20, &tip(1, -1.0), &mut out).is_err());
    // a failing first record creates no window
    assert!(op.push(2, 20, &tip(2, -1.0), &mut out).is_err());
    op.push(1, 30, &tip(1, 3.0), &mut out).unwrap();
    op.flush_all(&mut out).unwrap();

    assert_eq!(summary(&out), vec![(1, HOUR, 5.0)]);
    assert_eq!(op.stats().accumulator_errors, 2);
    assert_eq!(op.stats().windows_created, 1);
}

#[test]
fn failed_emit_leaves_windows_pending_for_retry() {
    let mut op = hourly(Duration::ZERO);
    let mut sink = Vec::new();
    op.process_record(1, 10, &tip(1, 1.0)).unwrap();
    op.process_record(2, 20, &tip(2, 2.0)).unwrap();

    let mut calls = 0;
    let mut failing = FnEmitter(|_r: WindowResult<u32, f64>| -> CoreResult<()> {
        calls += 1;
        Err(orion_error::StructError::from(CoreReason::Emit))
    });
    assert!(op.advance_watermark(HOUR, &mut failing).is_err());
    drop(failing);
    assert_eq!(calls, 1);
    assert_eq!(op.pending_count(), 2);

    // same watermark again retries the restored windows
    assert_eq!(op.advance_watermark(HOUR, &mut sink).unwrap(), 2);
    assert_eq!(summary(&sink), vec![(1, HOUR, 1.0), (2, HOUR, 2.0)]);
    op.flush_all(&mut sink).unwrap();
    assert_eq!(sink.len(), 2);
}

#[test]
fn record_for_restored_window_still_counts() {
    let mut op = hourly(Duration::ZERO);
    op.process_record(1, 10, &tip(1, 1.0)).unwrap();

    let mut failing = FnEmitter(|_r: WindowResult<u32, f64>| -> CoreResult<()> {
        Err(orion_error::StructError::from(CoreReason::Emit))
    });
    assert!(op.advance_watermark(HOUR, &mut failing).is_err());
    let window = TimeWindow::new(0, HOUR);
    assert_eq!(op.window_state(&1, &window), Some(WindowState::Firable));

    // the window is past its fire time but has not fired: the record joins it
    let outcome = op.process_record(1, 30 * MIN, &tip(1, 4.0)).unwrap();
    assert_eq!(outcome, PushOutcome::Accepted { windows: 1 });
    assert_eq!(op.stats().records_late, 0);

    // a key with no state in that window is still late
    assert_eq!(
        op.process_record(2, 30 * MIN, &tip(2, 9.0)).unwrap(),
        PushOutcome::DroppedLate
    );

    let mut sink = Vec::new();
    assert_eq!(op.advance_watermark(HOUR, &mut sink).unwrap(), 1);
    assert_eq!(summary(&sink), vec![(1, HOUR, 5.0)]);
    assert_eq!(op.window_state(&1, &window), Some(WindowState::Fired));
}

#[test]
fn event_time_below_first_window_is_rejected() {
    let mut op = hourly(Duration::ZERO);
    let mut out = Vec::new();
    let err = op
        .push(1, -9_223_372_036_854_000_000, &tip(1, 1.0), &mut out)
        .unwrap_err();
    assert_eq!(*err.reason(), CoreReason::EventTimeRange);
    assert_eq!(op.stats().records_late, 0);
    assert_eq!(op.pending_count(), 0);

    op.push(1, 10 * MIN, &tip(1, 2.0), &mut out).unwrap();
    op.flush_all(&mut out).unwrap();
    assert_eq!(summary(&out), vec![(1, HOUR, 2.0)]);
}

#[test]
fn invalid_spec_is_rejected_at_construction() {
    let spec = WindowSpec::Sliding {
        length: Duration::from_secs(60),
        slide: Duration::from_secs(120),
    };
    let result = WindowOperator::<u32, _>::new("bad", OperatorConfig::new(spec), tip_sum());
    assert!(result.is_err());
    assert_eq!(CoreReason::InvalidWindowSpec.to_string(), "invalid window spec");
}

#[test]
fn config_from_stage_section() {
    let stage = StageConfig {
        name: "popular".into(),
        length: HumanDuration::from(Duration::from_secs(900)),
        slide: Some(HumanDuration::from(Duration::from_secs(300))),
        max_out_of_orderness: HumanDuration::from(Duration::from_secs(60)),
        allowed_lateness: HumanDuration::from(Duration::from_secs(30)),
    };
    let config = OperatorConfig::from_stage(&stage, Duration::from_millis(200)).unwrap();
    assert_eq!(
        config.spec,
        WindowSpec::Sliding {
            length: Duration::from_secs(900),
            slide: Duration::from_secs(300),
        }
    );
    assert_eq!(config.max_out_of_orderness, Duration::from_secs(60));
    assert_eq!(config.allowed_lateness, Duration::from_secs(30));
    assert_eq!(config.watermark_interval, Duration::from_millis(200));

    let bad = StageConfig {
        slide: Some(HumanDuration::from(Duration::from_secs(1800))),
        ..stage
    };
    assert!(OperatorConfig::from_stage(&bad, Duration::ZERO).is_err());
}
