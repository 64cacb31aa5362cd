use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sensorcast_core::config::RefreshConfig;

use crate::pipeline::PipelineError;

/// Lifecycle of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    #[default]
    Idle,
    Running,
    Published,
    Failed,
}

/// Why a cycle did not publish.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("data source failed: {0}")]
    Source(String),

    #[error("data source returned no rows")]
    EmptyData,

    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("cycle exceeded its {budget_secs}s budget")]
    TimedOut { budget_secs: u64 },

    #[error("previous run still in flight")]
    Overrun,

    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

/// Summary of one finished cycle, kept in the metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub state: CycleState,
    pub run_id: Option<Uuid>,
    pub error: Option<String>,
}

/// Refresh cadence, typically built from [`RefreshConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between timer ticks.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Wall-clock budget for load + run.
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_seconds: u64,
}

fn default_refresh_interval() -> u64 { 300 }
fn default_cycle_timeout() -> u64 { 240 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval(),
            cycle_timeout_seconds: default_cycle_timeout(),
        }
    }
}

impl From<&RefreshConfig> for SchedulerConfig {
    fn from(c: &RefreshConfig) -> Self {
        Self {
            refresh_interval_seconds: c.interval_seconds,
            cycle_timeout_seconds: c.cycle_timeout_seconds,
        }
    }
}

impl SchedulerConfig {
    /// Timer period, at least one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }

    pub fn cycle_budget(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_seconds.max(1))
    }
}
