use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::pipeline::PipelineResult;
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::types::CycleError;

use super::RefreshScheduler;

/// Clears the in-flight flag when the run that owns it ends, however it ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefreshScheduler {
    /// Run one load + pipeline cycle and publish on success.
    ///
    /// Any failure is logged and leaves the published snapshot untouched.
    /// If the cycle exceeds its budget the blocking run keeps going in the
    /// background, its result is discarded, and cycles are refused until it
    /// finishes.
    pub async fn run_cycle(&self) -> Result<Arc<PipelineResult>, CycleError> {
        let cycle = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        let clock = Instant::now();

        self.record(|m| m.record_start());

        let result = if self.in_flight.swap(true, Ordering::SeqCst) {
            Err(CycleError::Overrun)
        } else {
            let guard = InFlightGuard(Arc::clone(&self.in_flight));
            let budget = self.config.cycle_budget();
            match tokio::time::timeout(budget, self.load_and_run(guard)).await {
                Ok(r) => r,
                Err(_) => Err(CycleError::TimedOut {
                    budget_secs: budget.as_secs(),
                }),
            }
        };

        let elapsed = clock.elapsed();
        match result {
            Ok(run) => {
                let run = Arc::new(run);
                self.snapshot.publish(Arc::clone(&run));
                self.record(|m| m.record_published(cycle, started_at, elapsed, run.run_id));
                info!(
                    "Refresh cycle {} published run {} ({:.1}s)",
                    cycle,
                    run.run_id,
                    elapsed.as_secs_f64()
                );
                Ok(run)
            }
            Err(e) => {
                self.record(|m| m.record_failed(cycle, started_at, elapsed, &e));
                warn!(
                    cycle,
                    started_at = %started_at,
                    "Refresh cycle failed, keeping previous snapshot: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Apply a metrics update, recovering the lock if a writer panicked.
    fn record(&self, update: impl FnOnce(&mut SchedulerMetrics)) {
        let mut m = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        update(&mut *m);
    }

    async fn load_and_run(&self, guard: InFlightGuard) -> Result<PipelineResult, CycleError> {
        let raw = self
            .source
            .load()
            .await
            .map_err(|e| CycleError::Source(e.to_string()))?;
        if raw.is_empty() {
            return Err(CycleError::EmptyData);
        }

        let pipeline = Arc::clone(&self.pipeline);
        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            pipeline.run(&raw)
        });

        match handle.await {
            Ok(r) => r.map_err(CycleError::from),
            Err(e) if e.is_panic() => Err(CycleError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(CycleError::Panicked(e.to_string())),
        }
    }

    /// Run the first cycle, then spawn the timer loop.
    ///
    /// Returns once the first cycle has finished (published or failed); the
    /// returned handle completes after [`RefreshScheduler::shutdown`].
    pub async fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            "Refresh scheduler starting: source={}, every {}s, budget {}s",
            self.source.name(),
            self.config.refresh_interval_seconds,
            self.config.cycle_timeout_seconds
        );
        let _ = self.run_cycle().await;

        tokio::spawn(async move { self.run_loop().await })
    }

    async fn run_loop(&self) {
        let period = self.config.interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.is_shutdown() {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }
            if self.is_shutdown() {
                break;
            }
            let _ = self.run_cycle().await;
        }

        info!("Refresh scheduler stopped");
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
