#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use sensorcast_core::{
        AnomalyParams, BoosterParams, DataSource, PipelineConfig, RawRow, RawTable, Result,
        SensorcastError,
    };

    use crate::pipeline::Pipeline;
    use crate::scheduler::runner::RefreshScheduler;
    use crate::scheduler::state::Snapshot;
    use crate::scheduler::types::{CycleError, CycleState, SchedulerConfig};

    /// Source that replays a queue of scripted responses, repeating the last.
    struct ScriptedSource {
        script: Mutex<Vec<std::result::Result<RawTable, String>>>,
        loads: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedSource {
        fn new(script: Vec<std::result::Result<RawTable, String>>) -> Self {
            Self {
                script: Mutex::new(script),
                loads: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(vec![Ok(table(40, 1.0))])
            }
        }

        fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        fn name(&self) -> &str { "scripted" }

        async fn load(&self) -> Result<RawTable> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 { script.remove(0) } else { script[0].clone() };
            next.map_err(SensorcastError::Source)
        }
    }

    fn table(n: usize, level: f64) -> RawTable {
        let t0 = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        RawTable::new(
            (0..n)
                .map(|i| {
                    RawRow::new(t0 + chrono::Duration::minutes(30 * i as i64))
                        .with("current", level + (i % 4) as f64)
                        .with("temperature", level * 10.0)
                })
                .collect(),
        )
    }

    fn pipeline() -> Arc<Pipeline> {
        let config = PipelineConfig {
            targets: vec!["current".into(), "temperature".into()],
            lag_steps: 3,
            horizon: 4,
            booster: BoosterParams {
                min_data_in_leaf: 2,
                max_rounds: 10,
                ..BoosterParams::default()
            },
            anomaly: AnomalyParams {
                estimators: 10,
                ..AnomalyParams::default()
            },
            ..PipelineConfig::default()
        };
        Arc::new(Pipeline::new(config).unwrap())
    }

    fn scheduler(source: Arc<dyn DataSource>, config: SchedulerConfig) -> RefreshScheduler {
        RefreshScheduler::new(config, pipeline(), source)
    }

    fn fast() -> SchedulerConfig {
        SchedulerConfig {
            refresh_interval_seconds: 1,
            cycle_timeout_seconds: 30,
        }
    }

    #[tokio::test]
    async fn initializing_before_first_publish() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(table(40, 1.0))]));
        let s = scheduler(source, fast());

        assert!(matches!(s.latest_snapshot(), Snapshot::Initializing));
        assert!(!s.snapshot().is_ready());
        assert_eq!(s.metrics().state, CycleState::Idle);
    }

    #[tokio::test]
    async fn successful_cycle_publishes() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(table(40, 1.0))]));
        let s = scheduler(source, fast());

        let run = s.run_cycle().await.unwrap();
        let snap = s.latest_snapshot();
        assert!(Arc::ptr_eq(snap.result().unwrap(), &run));

        let m = s.metrics();
        assert_eq!(m.cycles_published, 1);
        assert_eq!(m.state, CycleState::Published);
        assert_eq!(m.last_outcome.unwrap().run_id, Some(run.run_id));
    }

    #[tokio::test]
    async fn failures_keep_previous_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(table(40, 1.0)),
            Err("connection refused".into()),
            Ok(RawTable::empty()),
            Ok(table(2, 1.0)),
        ]));
        let s = scheduler(source, fast());

        let first = s.run_cycle().await.unwrap();

        assert!(matches!(s.run_cycle().await, Err(CycleError::Source(_))));
        assert!(matches!(s.run_cycle().await, Err(CycleError::EmptyData)));
        assert!(matches!(s.run_cycle().await, Err(CycleError::Pipeline(_))));

        let snap = s.latest_snapshot();
        assert!(Arc::ptr_eq(snap.result().unwrap(), &first));

        let m = s.metrics();
        assert_eq!(m.cycles_failed, 3);
        assert_eq!(m.consecutive_failures, 3);
        assert_eq!(m.state, CycleState::Failed);
    }

    #[tokio::test]
    async fn overrunning_cycle_times_out() {
        let source = Arc::new(ScriptedSource::slow(Duration::from_secs(3)));
        let s = scheduler(
            source,
            SchedulerConfig {
                refresh_interval_seconds: 60,
                cycle_timeout_seconds: 1,
            },
        );

        let err = s.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::TimedOut { budget_secs: 1 }));
        assert!(!s.latest_snapshot().is_ready());
        // The abandoned load is dropped, so nothing is left in flight.
        assert!(!s.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn refuses_cycle_while_run_in_flight() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(table(40, 1.0))]));
        let s = scheduler(source.clone(), fast());

        s.in_flight.store(true, Ordering::SeqCst);
        assert!(matches!(s.run_cycle().await, Err(CycleError::Overrun)));
        assert_eq!(source.load_count(), 0);
        assert_eq!(s.metrics().cycles_refused, 1);

        s.in_flight.store(false, Ordering::SeqCst);
        assert!(s.run_cycle().await.is_ok());
        assert!(!s.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn start_runs_first_cycle_then_ticks() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(table(40, 1.0))]));
        let s = Arc::new(scheduler(source.clone(), fast()));

        let handle = Arc::clone(&s).start().await;
        assert!(s.latest_snapshot().is_ready());
        assert_eq!(source.load_count(), 1);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while s.metrics().cycles_published < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(s.metrics().cycles_published >= 2);

        s.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn metrics_still_recorded_after_lock_poisoned() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(table(40, 1.0))]));
        let s = scheduler(source, fast());

        let metrics = Arc::clone(&s.metrics);
        let _ = std::thread::spawn(move || {
            let _held = metrics.write().unwrap();
            panic!("writer died holding the metrics lock");
        })
        .join();
        assert!(s.metrics.is_poisoned());

        s.run_cycle().await.unwrap();
        let m = s.metrics();
        assert_eq!(m.cycles_started, 1);
        assert_eq!(m.cycles_published, 1);
        assert_eq!(m.state, CycleState::Published);
    }

    #[tokio::test]
    async fn consecutive_cycles_replace_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(table(40, 1.0)), Ok(table(40, 2.0))]));
        let s = scheduler(source, fast());

        let a = s.run_cycle().await.unwrap();
        let b = s.run_cycle().await.unwrap();
        assert_ne!(a.run_id, b.run_id);
        assert!(b.completed_at > a.completed_at);

        let snap = s.latest_snapshot();
        assert!(Arc::ptr_eq(snap.result().unwrap(), &b));
    }
}
