use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::types::{CycleError, CycleOutcome, CycleState};

/// Refresh scheduler counters and the last cycle's outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    pub cycles_started: u64,
    pub cycles_published: u64,
    pub cycles_failed: u64,
    /// Cycles refused because a previous run was still in flight.
    pub cycles_refused: u64,
    pub consecutive_failures: u64,
    pub state: CycleState,
    pub last_outcome: Option<CycleOutcome>,
    /// Mean duration over finished cycles (published or failed).
    pub avg_cycle_duration: Duration,
}

impl SchedulerMetrics {
    pub fn record_start(&mut self) {
        self.cycles_started += 1;
        self.state = CycleState::Running;
    }

    pub fn record_published(
        &mut self,
        cycle: u64,
        started_at: DateTime<Utc>,
        duration: Duration,
        run_id: Uuid,
    ) {
        self.cycles_published += 1;
        self.consecutive_failures = 0;
        self.finish(CycleOutcome {
            cycle,
            started_at,
            duration,
            state: CycleState::Published,
            run_id: Some(run_id),
            error: None,
        });
    }

    pub fn record_failed(
        &mut self,
        cycle: u64,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: &CycleError,
    ) {
        if matches!(error, CycleError::Overrun) {
            self.cycles_refused += 1;
        }
        self.cycles_failed += 1;
        self.consecutive_failures += 1;
        self.finish(CycleOutcome {
            cycle,
            started_at,
            duration,
            state: CycleState::Failed,
            run_id: None,
            error: Some(error.to_string()),
        });
    }

    fn finish(&mut self, outcome: CycleOutcome) {
        let count = self.cycles_published + self.cycles_failed;

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_cycle_duration = if count <= 1 {
            outcome.duration
        } else {
            let prev = self.avg_cycle_duration.as_nanos() as f64;
            let cur = outcome.duration.as_nanos() as f64;
            Duration::from_nanos((prev + (cur - prev) / count as f64) as u64)
        };

        self.state = outcome.state;
        self.last_outcome = Some(outcome);
    }

    pub fn last_cycle_duration(&self) -> Option<Duration> {
        self.last_outcome.as_ref().map(|o| o.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_resets_failure_streak() {
        let mut m = SchedulerMetrics::default();
        m.record_start();
        m.record_failed(1, Utc::now(), Duration::from_millis(10), &CycleError::EmptyData);
        m.record_start();
        m.record_failed(2, Utc::now(), Duration::from_millis(10), &CycleError::EmptyData);
        assert_eq!(m.consecutive_failures, 2);
        assert_eq!(m.state, CycleState::Failed);

        m.record_start();
        m.record_published(3, Utc::now(), Duration::from_millis(10), Uuid::new_v4());
        assert_eq!(m.consecutive_failures, 0);
        assert_eq!(m.cycles_started, 3);
        assert_eq!(m.cycles_published, 1);
        assert_eq!(m.cycles_failed, 2);
        assert_eq!(m.state, CycleState::Published);
    }

    #[test]
    fn average_duration_is_incremental_mean() {
        let mut m = SchedulerMetrics::default();
        m.record_published(1, Utc::now(), Duration::from_millis(100), Uuid::new_v4());
        m.record_published(2, Utc::now(), Duration::from_millis(200), Uuid::new_v4());

        let avg = m.avg_cycle_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
        assert_eq!(m.last_cycle_duration(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn overrun_counts_as_refused() {
        let mut m = SchedulerMetrics::default();
        m.record_failed(1, Utc::now(), Duration::ZERO, &CycleError::Overrun);
        assert_eq!(m.cycles_refused, 1);
        assert_eq!(m.cycles_failed, 1);
        assert!(m.last_outcome.unwrap().error.unwrap().contains("in flight"));
    }

    #[test]
    fn default_metrics() {
        let m = SchedulerMetrics::default();
        assert_eq!(m.state, CycleState::Idle);
        assert!(m.last_outcome.is_none());
        assert_eq!(m.avg_cycle_duration, Duration::ZERO);
    }
}
