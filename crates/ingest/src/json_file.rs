use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sensorcast_core::{DataSource, RawRow, RawTable, RawValue, Result, SensorcastError};
use tracing::{debug, info};

/// Rows stored as a JSON array or as JSON lines.
///
/// Each object needs a timestamp field (RFC 3339, or `YYYY-MM-DD HH:MM:SS`
/// read as UTC). Every other field is kept as a [`RawValue`]. Rows without a
/// parseable timestamp are skipped.
pub struct JsonFileSource {
    path: PathBuf,
    timestamp_field: String,
    name: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("json:{}", path.display());
        Self {
            path,
            timestamp_field: "datetime".to_string(),
            name,
        }
    }

    pub fn with_timestamp_field(mut self, field: &str) -> Self {
        self.timestamp_field = field.to_string();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse file contents. Exposed for callers that already hold the bytes.
    pub fn parse(&self, contents: &str) -> Result<RawTable> {
        let trimmed = contents.trim_start();
        let values: Vec<serde_json::Value> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            trimmed
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(serde_json::from_str)
                .collect::<std::result::Result<_, _>>()?
        };

        let mut table = RawTable::empty();
        let mut skipped = 0usize;
        for value in values {
            let serde_json::Value::Object(map) = value else {
                skipped += 1;
                continue;
            };
            let Some(ts) = map
                .get(&self.timestamp_field)
                .and_then(|v| v.as_str())
                .and_then(parse_timestamp)
            else {
                skipped += 1;
                continue;
            };

            let mut row = RawRow::new(ts);
            for (k, v) in &map {
                if k != &self.timestamp_field {
                    row.fields.insert(k.clone(), RawValue::from_json(v));
                }
            }
            table.push(row);
        }

        if skipped > 0 {
            debug!(skipped, path = %self.path.display(), "skipped rows without a usable timestamp");
        }
        Ok(table)
    }
}

/// RFC 3339 first, then a naive `YYYY-MM-DD HH:MM:SS` (or `T`-separated) as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl DataSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<RawTable> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SensorcastError::Source(format!("{}: {}", self.path.display(), e)))?;
        let table = self.parse(&contents)?;
        info!("Loaded {} rows from {}", table.len(), self.path.display());
        Ok(table)
    }
}
