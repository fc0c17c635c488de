//! Public-API walk through a sliding average: custom aggregate, closure
//! emitter, out-of-order input and end-of-stream flush.

use std::time::Duration;

use hg_core::aggregate::FnAggregate;
use hg_core::{
    CoreResult, FnEmitter, OperatorConfig, PushOutcome, TimeWindow, WindowOperator, WindowResult,
    WindowSpec,
};

const MIN: i64 = 60 * 1_000_000_000;

type Mean = FnAggregate<f64, (f64, u64), f64>;

fn mean() -> Mean {
    FnAggregate::new(
        || (0.0, 0),
        |x: &f64, acc: &(f64, u64)| {
            if x.is_nan() {
                anyhow::bail!("NaN reading");
            }
            Ok((acc.0 + x, acc.1 + 1))
        },
        |a: &(f64, u64), b: &(f64, u64)| Ok((a.0 + b.0, a.1 + b.1)),
        |acc: &(f64, u64)| acc.0 / acc.1 as f64,
    )
}

fn ten_minute_every_five(lag: Duration) -> WindowOperator<&'static str, Mean> {
    let spec = WindowSpec::sliding(Duration::from_secs(600), Duration::from_secs(300)).unwrap();
    let config = OperatorConfig::new(spec).with_max_out_of_orderness(lag);
    WindowOperator::new("mean", config, mean()).unwrap()
}

#[test]
fn sliding_mean_per_sensor() {
    let mut op = ten_minute_every_five(Duration::ZERO);
    let mut fired: Vec<(&str, TimeWindow, f64)> = Vec::new();
    let mut sink = FnEmitter(|r: WindowResult<&'static str, f64>| -> CoreResult<()> {
        fired.push((r.key, r.window, r.value));
        Ok(())
    });

    op.push("s1", MIN, &2.0, &mut sink).unwrap();
    op.push("s1", 6 * MIN, &4.0, &mut sink).unwrap();
    op.push("s2", 21 * MIN, &0.5, &mut sink).unwrap();
    op.flush_all(&mut sink).unwrap();
    drop(sink);

    assert_eq!(
        fired,
        vec![
            ("s1", TimeWindow::new(-5 * MIN, 5 * MIN), 2.0),
            ("s1", TimeWindow::new(0, 10 * MIN), 3.0),
            ("s1", TimeWindow::new(5 * MIN, 15 * MIN), 4.0),
            ("s2", TimeWindow::new(15 * MIN, 25 * MIN), 0.5),
            ("s2", TimeWindow::new(20 * MIN, 30 * MIN), 0.5),
        ]
    );
    assert_eq!(op.pending_count(), 0);
    assert_eq!(op.stats().windows_fired, 5);
}

#[test]
fn bounded_disorder_is_absorbed() {
    let mut op = ten_minute_every_five(Duration::from_secs(120));
    let mut out = Vec::new();

    op.push("s1", 9 * MIN, &1.0, &mut out).unwrap();
    // two minutes late but within the bound
    let outcome = op.push("s1", 7 * MIN, &3.0, &mut out).unwrap();
    assert_eq!(outcome, PushOutcome::Accepted { windows: 2 });
    op.push("s1", 12 * MIN, &5.0, &mut out).unwrap();

    // W = 10m closes [0, 10m)
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].window, TimeWindow::new(0, 10 * MIN));
    assert_eq!(out[0].value, 2.0);
    assert_eq!(out[0].watermark, 10 * MIN);
}

#[test]
fn failing_reading_is_reported_and_skipped() {
    let mut op = ten_minute_every_five(Duration::ZERO);
    let mut out = Vec::new();

    op.push("s1", MIN, &2.0, &mut out).unwrap();
    assert!(op.push("s1", 2 * MIN, &f64::NAN, &mut out).is_err());
    op.flush_all(&mut out).unwrap();

    assert!(out.iter().all(|r| r.value == 2.0));
    assert_eq!(op.stats().accumulator_errors, 1);
}
