//! Timer-driven refresh of the published pipeline result.
//!
//! The [`RefreshScheduler`] runs one cycle at startup and then one per
//! interval tick: load raw rows from the [`DataSource`], run the
//! [`Pipeline`] on the blocking pool, and publish the result through a
//! [`SnapshotHandle`]. Failed cycles leave the previous snapshot in place.
//!
//! [`DataSource`]: sensorcast_core::DataSource
//! [`Pipeline`]: crate::pipeline::Pipeline

pub mod metrics;
pub mod runner;
pub mod state;
pub mod types;

pub use metrics::SchedulerMetrics;
pub use runner::RefreshScheduler;
pub use state::{Snapshot, SnapshotHandle};
pub use types::{CycleError, CycleOutcome, CycleState, SchedulerConfig};
