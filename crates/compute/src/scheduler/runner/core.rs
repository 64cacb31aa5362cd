use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;
use tracing::info;

use sensorcast_core::DataSource;

use crate::pipeline::Pipeline;
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::state::{Snapshot, SnapshotHandle};
use crate::scheduler::types::SchedulerConfig;

/// Periodically reloads data, reruns the pipeline, and publishes the result.
pub struct RefreshScheduler {
    pub(super) config: SchedulerConfig,
    pub(super) pipeline: Arc<Pipeline>,
    pub(super) source: Arc<dyn DataSource>,
    /// Where finished results are published.
    pub(super) snapshot: SnapshotHandle,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    /// Set while a pipeline run (possibly an abandoned one) is still executing.
    pub(super) in_flight: Arc<AtomicBool>,
    pub(super) cycle_counter: AtomicU64,
    /// Shutdown signal.
    pub(super) shutdown: Arc<AtomicBool>,
    pub(super) wake: Notify,
}

impl RefreshScheduler {
    pub fn new(config: SchedulerConfig, pipeline: Arc<Pipeline>, source: Arc<dyn DataSource>) -> Self {
        Self {
            config,
            pipeline,
            source,
            snapshot: SnapshotHandle::new(),
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            in_flight: Arc::new(AtomicBool::new(false)),
            cycle_counter: AtomicU64::new(0),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Notify::new(),
        }
    }

    /// A cloneable read handle for consumers.
    pub fn snapshot(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub fn latest_snapshot(&self) -> Snapshot {
        self.snapshot.latest()
    }

    /// Get a copy of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Signal the timer loop to stop after the current cycle.
    pub fn shutdown(&self) {
        info!("Refresh scheduler shutdown requested");
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
