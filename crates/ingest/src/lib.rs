//! Raw-row sources for the sensor pipeline.
//!
//! Every source implements [`sensorcast_core::DataSource`]. None of them
//! clean or coerce values beyond what the storage format requires; that is
//! the resampler's job.

pub mod json_file;
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod synthetic;

pub use json_file::JsonFileSource;
pub use memory::MemorySource;
#[cfg(feature = "mysql")]
pub use mysql::MySqlSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
