use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sensorcast_core::config::DatabaseConfig;
use sensorcast_core::{DataSource, RawRow, RawTable, RawValue, Result, SensorcastError};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{Column, Row, ValueRef};
use tracing::{debug, info};

/// Reads the conveyor table from MySQL.
///
/// Runs `SELECT * FROM <table> WHERE <id_column> > <min_id>` on every load.
/// Numeric columns are decoded directly, anything else is kept as text and
/// left for the resampler to coerce.
pub struct MySqlSource {
    pool: MySqlPool,
    query: String,
    timestamp_column: String,
    name: String,
}

impl MySqlSource {
    /// Build a lazily connecting pool; no connection is made until the first load.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        for (key, ident) in [
            ("DB_TABLE", &config.table),
            ("DB_ID_COLUMN", &config.id_column),
            ("DB_TIMESTAMP_COLUMN", &config.timestamp_column),
        ] {
            if ident.is_empty() || ident.contains('`') {
                return Err(SensorcastError::Config {
                    key: key.to_string(),
                    reason: format!("invalid identifier {:?}", ident),
                });
            }
        }

        let pool = MySqlPool::connect_lazy(&config.connection_string())
            .map_err(|e| SensorcastError::Source(e.to_string()))?;
        let query = format!(
            "SELECT * FROM `{}` WHERE `{}` > {} ORDER BY `{}`, `{}`",
            config.table,
            config.id_column,
            config.min_id,
            config.timestamp_column,
            config.id_column
        );
        info!("MySQL source configured: {}:{}/{}", config.host, config.port, config.database);

        Ok(Self {
            pool,
            query,
            timestamp_column: config.timestamp_column.clone(),
            name: format!("mysql:{}", config.table),
        })
    }

    fn decode_row(&self, row: &MySqlRow) -> Option<RawRow> {
        let ts = row
            .try_get::<NaiveDateTime, _>(self.timestamp_column.as_str())
            .map(|naive| naive.and_utc())
            .or_else(|_| row.try_get::<DateTime<Utc>, _>(self.timestamp_column.as_str()))
            .ok()?;

        let mut out = RawRow::new(ts);
        for (i, col) in row.columns().iter().enumerate() {
            let name = col.name();
            if name == self.timestamp_column {
                continue;
            }
            out.fields.insert(name.to_string(), decode_value(row, i));
        }
        Some(out)
    }
}

fn decode_value(row: &MySqlRow, i: usize) -> RawValue {
    match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return RawValue::Null,
        Ok(_) => {}
        Err(_) => return RawValue::Null,
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return RawValue::Float(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return RawValue::Integer(v);
    }
    // DECIMAL and text columns arrive as strings on the wire.
    match row.try_get_unchecked::<String, _>(i) {
        Ok(s) => RawValue::Text(s),
        Err(_) => RawValue::Null,
    }
}

#[async_trait]
impl DataSource for MySqlSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<RawTable> {
        let rows = sqlx::query(&self.query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SensorcastError::Source(e.to_string()))?;

        let total = rows.len();
        let table = RawTable::new(rows.iter().filter_map(|r| self.decode_row(r)).collect());
        if table.len() < total {
            debug!(dropped = total - table.len(), "rows without a decodable timestamp");
        }
        info!("Loaded {} rows from {}", table.len(), self.name);
        Ok(table)
    }
}
