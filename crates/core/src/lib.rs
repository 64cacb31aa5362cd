pub mod config;
pub mod error;
pub mod sensor;
pub mod source;
pub mod table;

pub use config::{AnomalyParams, BoosterParams, Config, ImportanceKind, PipelineConfig};
pub use error::*;
pub use sensor::{SensorId, SensorSet, ERROR_FLAG_SUFFIX};
pub use source::DataSource;
pub use table::{RawRow, RawTable, RawValue};
