use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorcastError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid config value for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for SensorcastError {
    fn from(e: serde_json::Error) -> Self {
        SensorcastError::Serialize(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SensorcastError>;
