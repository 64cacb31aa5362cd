use std::env;

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SensorcastError};
use crate::sensor::SensorSet;

/// Sensors on the monitored conveyor drive.
pub const DEFAULT_TARGETS: &[&str] = &[
    "current",
    "temperature",
    "z_rms",
    "x_rms",
    "z_peak",
    "x_peak",
    "noise",
];

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("Ignoring unparsable {}={:?}, using default", key, raw);
                default
            }
        },
        None => default,
    }
}

/// Largest frequency a `chrono::Duration` can hold, in seconds.
pub const MAX_FREQUENCY_SECS: i64 = i64::MAX / 1_000;

/// Parse a resampling frequency such as `30min`, `30T`, `1h`, `15s`, `1d`
/// into seconds. A bare number is taken as seconds.
pub fn parse_frequency(raw: &str) -> Result<i64> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let invalid = |reason: &str| SensorcastError::Config {
        key: "FREQ".to_string(),
        reason: format!("{:?}: {}", raw, reason),
    };

    let n: i64 = if num.is_empty() {
        1
    } else {
        num.parse().map_err(|_| invalid("bad number"))?
    };
    let unit_secs = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" => 1,
        "t" | "m" | "min" | "mins" => 60,
        "h" | "hr" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        _ => return Err(invalid("unknown unit")),
    };
    let secs = n
        .checked_mul(unit_secs)
        .filter(|&s| s <= MAX_FREQUENCY_SECS)
        .ok_or_else(|| invalid("too large"))?;
    if secs <= 0 {
        return Err(invalid("must be positive"));
    }
    Ok(secs)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
    pub refresh: RefreshConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SENSORCAST_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SENSORCAST_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            pipeline: PipelineConfig::from_env_profiled(p),
            database: DatabaseConfig::from_env_profiled(p),
            refresh: RefreshConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  pipeline:  targets={}, freq={}s, lags={}, horizon={}",
            self.pipeline.targets.join(","),
            self.pipeline.frequency_secs,
            self.pipeline.lag_steps,
            self.pipeline.horizon
        );
        tracing::info!(
            "  database:  host={}, db={}, table={}",
            self.database.host, self.database.database, self.database.table
        );
        tracing::info!(
            "  refresh:   every {}s, budget {}s",
            self.refresh.interval_seconds, self.refresh.cycle_timeout_seconds
        );
    }
}

// ── Pipeline ──────────────────────────────────────────────────

/// Everything one pipeline instance needs; all fields are load-time constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Monitored sensor columns, in order.
    pub targets: Vec<String>,
    /// Resampling grid step in seconds.
    pub frequency_secs: i64,
    /// Lag depth `L` of the supervised matrix.
    pub lag_steps: usize,
    /// Forecast horizon `H` in grid steps.
    pub horizon: usize,
    /// Fixed offset the raw UTC timestamps are converted to before resampling.
    pub utc_offset_minutes: i32,
    /// Round cleaned values to this many decimals.
    pub round_decimals: Option<u32>,
    /// Leading share of the lagged rows used for training; the rest validates.
    pub train_fraction: f64,
    pub booster: BoosterParams,
    pub anomaly: AnomalyParams,
    /// Features kept per sensor in the importance ranking.
    pub importance_top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            targets: DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect(),
            frequency_secs: 30 * 60,
            lag_steps: 48,
            horizon: 12,
            utc_offset_minutes: 8 * 60,
            round_decimals: Some(2),
            train_fraction: 0.9,
            booster: BoosterParams::default(),
            anomaly: AnomalyParams::default(),
            importance_top_k: 10,
        }
    }
}

impl PipelineConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();

        let targets = profiled_env_opt(p, "TARGETS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|t| !t.is_empty())
            .unwrap_or(defaults.targets);

        let frequency_secs = match profiled_env_opt(p, "FREQ") {
            Some(raw) => parse_frequency(&raw).unwrap_or_else(|e| {
                warn!("{}, using default", e);
                defaults.frequency_secs
            }),
            None => defaults.frequency_secs,
        };

        let round_decimals = match profiled_env_opt(p, "ROUND_DECIMALS").as_deref() {
            Some("none") | Some("off") => None,
            Some(raw) => raw.parse().ok().or(defaults.round_decimals),
            None => defaults.round_decimals,
        };

        let mut anomaly = AnomalyParams::default();
        anomaly.lookback = profiled_env_parse(p, "ANOMALY_LOOKBACK", anomaly.lookback);

        let mut booster = BoosterParams::default();
        booster.max_rounds = profiled_env_parse(p, "BOOST_MAX_ROUNDS", booster.max_rounds);
        booster.seed = profiled_env_parse(p, "BOOST_SEED", booster.seed);

        Self {
            targets,
            frequency_secs,
            lag_steps: profiled_env_parse(p, "LAG_STEPS", defaults.lag_steps),
            horizon: profiled_env_parse(p, "FORECAST_HORIZON", defaults.horizon),
            utc_offset_minutes: profiled_env_parse(p, "UTC_OFFSET_MINUTES", defaults.utc_offset_minutes),
            round_decimals,
            train_fraction: profiled_env_parse(p, "TRAIN_FRACTION", defaults.train_fraction),
            booster,
            anomaly,
            importance_top_k: profiled_env_parse(p, "IMPORTANCE_TOP_K", defaults.importance_top_k),
        }
    }

    /// Check structural constraints and build the sensor set.
    pub fn validate(&self) -> Result<SensorSet> {
        let bad = |key: &str, reason: &str| SensorcastError::Config {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.frequency_secs <= 0 {
            return Err(bad("FREQ", "must be positive"));
        }
        if self.frequency_secs > MAX_FREQUENCY_SECS {
            return Err(bad("FREQ", "too large"));
        }
        if self.lag_steps == 0 {
            return Err(bad("LAG_STEPS", "must be at least 1"));
        }
        if self.horizon == 0 {
            return Err(bad("FORECAST_HORIZON", "must be at least 1"));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(bad("TRAIN_FRACTION", "must be in (0, 1]"));
        }
        if offset_from_minutes(self.utc_offset_minutes).is_none() {
            return Err(bad("UTC_OFFSET_MINUTES", "out of range"));
        }
        SensorSet::new(self.targets.iter().cloned())
    }

    pub fn frequency(&self) -> Duration {
        Duration::seconds(self.frequency_secs)
    }

    pub fn utc_offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes).unwrap_or_else(|| Utc.fix())
    }
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

/// Which intrinsic importance a boosted model reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportanceKind {
    /// Number of splits that use the feature.
    Split,
    /// Total loss reduction of those splits.
    Gain,
}

/// Hyperparameters of the per-sensor gradient-boosted regressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoosterParams {
    pub learning_rate: f64,
    pub num_leaves: usize,
    pub min_data_in_leaf: usize,
    pub lambda_l2: f64,
    pub max_bins: usize,
    pub max_rounds: usize,
    /// Stop when validation RMSE has not improved for this many rounds.
    pub early_stopping_rounds: usize,
    /// Row subsampling per round; 1.0 disables bagging.
    pub bagging_fraction: f64,
    pub seed: u64,
    pub importance: ImportanceKind,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            num_leaves: 31,
            min_data_in_leaf: 20,
            lambda_l2: 0.0,
            max_bins: 255,
            max_rounds: 500,
            early_stopping_rounds: 20,
            bagging_fraction: 1.0,
            seed: 42,
            importance: ImportanceKind::Split,
        }
    }
}

/// Windowing and kernel parameters of the anomaly scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyParams {
    /// Trailing points scored per sensor (144 = three days at 30 min).
    pub lookback: usize,
    /// Number of isolation partitions `t`.
    pub estimators: usize,
    pub psi1: usize,
    pub width: usize,
    pub psi2: usize,
}

impl Default for AnomalyParams {
    fn default() -> Self {
        Self {
            lookback: 144,
            estimators: 100,
            psi1: 4,
            width: 20,
            psi2: 4,
        }
    }
}

// ── Database ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub table: String,
    pub timestamp_column: String,
    /// Only rows with `id_column > min_id` are loaded.
    pub id_column: String,
    pub min_id: i64,
}

impl DatabaseConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "DB_HOST", "localhost"),
            port: profiled_env_parse(p, "DB_PORT", 3306),
            database: profiled_env_or(p, "DB_NAME", "sensors"),
            username: profiled_env_opt(p, "DB_USER"),
            password: profiled_env_opt(p, "DB_PASSWORD"),
            table: profiled_env_or(p, "DB_TABLE", "conveyor"),
            timestamp_column: profiled_env_or(p, "DB_TIMESTAMP_COLUMN", "datetime"),
            id_column: profiled_env_or(p, "DB_ID_COLUMN", "conveyor_id"),
            min_id: profiled_env_parse(p, "DB_MIN_ID", 1079),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("root");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "mysql://{}:{}@{}:{}/{}",
            user, pass, self.host, self.port, self.database
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Refresh cadence ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub interval_seconds: u64,
    /// Wall-clock budget for one load + run cycle.
    pub cycle_timeout_seconds: u64,
}

impl RefreshConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            interval_seconds: profiled_env_parse(p, "REFRESH_INTERVAL_SECONDS", 300),
            cycle_timeout_seconds: profiled_env_parse(p, "CYCLE_TIMEOUT_SECONDS", 240),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_units() {
        assert_eq!(parse_frequency("30min").unwrap(), 1800);
        assert_eq!(parse_frequency("30T").unwrap(), 1800);
        assert_eq!(parse_frequency("1h").unwrap(), 3600);
        assert_eq!(parse_frequency("15s").unwrap(), 15);
        assert_eq!(parse_frequency("1d").unwrap(), 86_400);
        assert_eq!(parse_frequency("h").unwrap(), 3600);
        assert_eq!(parse_frequency("900").unwrap(), 900);
    }

    #[test]
    fn frequency_rejects_garbage() {
        assert!(parse_frequency("30 fortnights").is_err());
        assert!(parse_frequency("0min").is_err());
        assert!(parse_frequency("x5").is_err());
    }

    #[test]
    fn frequency_overflow_is_an_error() {
        match parse_frequency("999999999999999999d") {
            Err(SensorcastError::Config { key, reason }) => {
                assert_eq!(key, "FREQ");
                assert!(reason.contains("too large"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
        assert!(parse_frequency("9223372036854775807s").is_err());
    }

    #[test]
    fn validate_rejects_oversized_frequency() {
        let cfg = PipelineConfig {
            frequency_secs: i64::MAX,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_utc_offset_is_rejected_not_panicking() {
        for minutes in [i32::MAX, i32::MIN, 24 * 60] {
            let cfg = PipelineConfig {
                utc_offset_minutes: minutes,
                ..PipelineConfig::default()
            };
            match cfg.validate() {
                Err(SensorcastError::Config { key, .. }) => assert_eq!(key, "UTC_OFFSET_MINUTES"),
                other => panic!("expected offset error, got {:?}", other.map(|s| s.len())),
            }
            assert_eq!(cfg.utc_offset().local_minus_utc(), 0);
        }
    }

    #[test]
    fn pipeline_defaults_match_conveyor_deployment() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.targets.len(), 7);
        assert_eq!(cfg.frequency_secs, 1800);
        assert_eq!(cfg.lag_steps, 48);
        assert_eq!(cfg.horizon, 12);
        assert_eq!(cfg.booster.max_rounds, 500);
        assert_eq!(cfg.booster.early_stopping_rounds, 20);
        assert_eq!(cfg.anomaly.lookback, 144);
        assert_eq!(cfg.utc_offset().local_minus_utc(), 8 * 3600);
        assert_eq!(cfg.validate().unwrap().len(), 7);
    }

    #[test]
    fn validate_rejects_zero_lags() {
        let cfg = PipelineConfig {
            lag_steps: 0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_train_fraction() {
        let cfg = PipelineConfig {
            train_fraction: 0.0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mysql_connection_string() {
        let db = DatabaseConfig {
            host: "db".into(),
            port: 3307,
            database: "plant".into(),
            username: Some("svc".into()),
            password: Some("pw".into()),
            table: "conveyor".into(),
            timestamp_column: "datetime".into(),
            id_column: "conveyor_id".into(),
            min_id: 0,
        };
        assert_eq!(db.connection_string(), "mysql://svc:pw@db:3307/plant");
        assert!(db.is_configured());
    }
}
