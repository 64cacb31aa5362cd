pub mod algorithms;
pub mod pipeline;
pub mod scheduler;

pub use pipeline::{Pipeline, PipelineError, PipelineResult};
pub use scheduler::{
    CycleError, CycleState, RefreshScheduler, SchedulerConfig, SchedulerMetrics, Snapshot,
    SnapshotHandle,
};
