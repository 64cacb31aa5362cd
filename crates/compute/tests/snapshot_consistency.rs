//! Readers racing a publisher must always see one whole run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};

use sensorcast_compute::{Pipeline, PipelineResult, Snapshot, SnapshotHandle};
use sensorcast_core::{AnomalyParams, BoosterParams, PipelineConfig, RawRow, RawTable};

/// Every sensor holds `level` for the whole history.
fn flat_table(level: f64) -> RawTable {
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    RawTable::new(
        (0..40)
            .map(|i| {
                RawRow::new(t0 + Duration::minutes(30 * i))
                    .with("current", level)
                    .with("temperature", level)
            })
            .collect(),
    )
}

fn runs() -> Vec<Arc<PipelineResult>> {
    let pipeline = Pipeline::new(PipelineConfig {
        targets: vec!["current".into(), "temperature".into()],
        lag_steps: 2,
        horizon: 3,
        booster: BoosterParams {
            max_rounds: 5,
            ..BoosterParams::default()
        },
        anomaly: AnomalyParams {
            estimators: 5,
            ..AnomalyParams::default()
        },
        ..PipelineConfig::default()
    })
    .unwrap();

    (1..=4)
        .map(|k| Arc::new(pipeline.run(&flat_table(k as f64)).unwrap()))
        .collect()
}

/// All parts of a run agree on its level.
fn assert_consistent(result: &PipelineResult) {
    let level = result.frame.values[0][0];
    for col in &result.frame.values {
        assert!(col.iter().all(|&v| v == level));
    }
    for col in &result.forecast.values {
        assert!(col.iter().all(|&v| (v - level).abs() < 1e-9));
    }
    assert_eq!(result.anomalies.timestamps.last(), result.frame.timestamps.last());
    assert_eq!(result.timings.rows, result.frame.len());
}

#[test]
fn concurrent_reads_never_mix_runs() {
    let runs = runs();
    let handle = SnapshotHandle::new();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut seen = 0usize;
                while !done.load(Ordering::Relaxed) {
                    if let Snapshot::Ready(r) = handle.latest() {
                        assert_consistent(&r);
                        seen += 1;
                    }
                }
                seen
            })
        })
        .collect();

    for i in 0..2_000 {
        let run = &runs[i % runs.len()];
        handle.publish(Arc::clone(run));
    }
    done.store(true, Ordering::Relaxed);

    for r in readers {
        r.join().unwrap();
    }

    let Snapshot::Ready(last) = handle.latest() else {
        panic!("nothing published");
    };
    assert!(Arc::ptr_eq(&last, &runs[1_999 % runs.len()]));
}

#[test]
fn publish_returns_replaced_result() {
    let runs = runs();
    let handle = SnapshotHandle::new();
    assert!(handle.publish(Arc::clone(&runs[0])).is_none());
    let previous = handle.publish(Arc::clone(&runs[1])).unwrap();
    assert!(Arc::ptr_eq(&previous, &runs[0]));
}
