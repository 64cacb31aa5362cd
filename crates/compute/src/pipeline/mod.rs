//! Forecasting and anomaly pipeline.
//!
//! One run goes through the stages in order:
//!
//! - **Resample**: raw rows onto a regular, fully imputed grid.
//! - **Lags**: supervised matrix of `<sensor>_lag<k>` features.
//! - **Train**: one boosted regressor per sensor, in parallel.
//! - **Forecast + importance** and **anomaly scoring**: run side by side
//!   with `rayon::join`, then joined into one immutable [`PipelineResult`].

pub mod anomaly;
pub mod forecast;
pub mod importance;
pub mod lags;
pub mod metrics;
pub mod resample;
pub mod trainer;
pub mod views;

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use sensorcast_core::{PipelineConfig, RawTable, SensorSet, SensorcastError};

use self::anomaly::AnomalyScoreSet;
use self::forecast::ForecastFrame;
use self::importance::ImportanceSet;
use self::lags::{build_lags, NumericFrame};
use self::metrics::StageTimings;
use self::resample::{Grid, SensorFrame};
use self::trainer::{split_chronological, TrainedModelSet};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no data after cleaning")]
    EmptyData,

    #[error("insufficient data: need at least {required} rows for the lag depth, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("configuration error: {0}")]
    Config(#[from] SensorcastError),
}

/// Everything one run produced. Immutable once built; shared behind an `Arc`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub frame: SensorFrame,
    pub forecast: ForecastFrame,
    pub anomalies: AnomalyScoreSet,
    pub importance: ImportanceSet,
    pub models: TrainedModelSet,
    pub completed_at: DateTime<Utc>,
    pub timings: StageTimings,
}

/// A configured pipeline. Holds no per-run state, so one instance can be
/// shared across cycles.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    sensors: SensorSet,
    grid: Grid,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let sensors = config.validate()?;
        let grid = Grid::from_config(&config);
        Ok(Self {
            config,
            sensors,
            grid,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sensors(&self) -> &SensorSet {
        &self.sensors
    }

    /// Run every stage on `raw`. Errors are returned, never swallowed.
    pub fn run(&self, raw: &RawTable) -> Result<PipelineResult, PipelineError> {
        let run_start = Instant::now();
        let cfg = &self.config;
        let mut timings = StageTimings::default();

        let t = Instant::now();
        let frame = resample::clean(raw, &self.sensors, &self.grid);
        timings.resample_ms = StageTimings::ms(t.elapsed());
        timings.rows = frame.len();

        if frame.is_empty() {
            return Err(PipelineError::EmptyData);
        }
        if frame.len() <= cfg.lag_steps {
            return Err(PipelineError::InsufficientData {
                required: cfg.lag_steps + 1,
                actual: frame.len(),
            });
        }

        let t = Instant::now();
        let numeric = NumericFrame::from_sensor_frame(&frame);
        let (lagged, feature_columns) = build_lags(&numeric, cfg.lag_steps);
        let split = split_chronological(&lagged, &self.sensors, &feature_columns, cfg.train_fraction);
        timings.lags_ms = StageTimings::ms(t.elapsed());
        timings.train_rows = split.train_rows;
        drop(lagged);

        let t = Instant::now();
        let models = trainer::train(&split, &self.sensors, &cfg.booster);
        timings.train_ms = StageTimings::ms(t.elapsed());

        let ((forecast, importance, forecast_ms), (anomalies, anomaly_ms)) = rayon::join(
            || {
                let t = Instant::now();
                let fc = forecast::forecast(&models, &frame, &feature_columns, cfg.horizon);
                let imp = importance::importance(
                    &models,
                    &self.sensors,
                    cfg.booster.importance,
                    cfg.importance_top_k,
                );
                (fc, imp, StageTimings::ms(t.elapsed()))
            },
            || {
                let t = Instant::now();
                let scores = anomaly::score_all(&frame, &cfg.anomaly);
                (scores, StageTimings::ms(t.elapsed()))
            },
        );
        timings.forecast_ms = forecast_ms;
        timings.anomaly_ms = anomaly_ms;
        timings.total_ms = StageTimings::ms(run_start.elapsed());

        let result = PipelineResult {
            run_id: Uuid::new_v4(),
            frame,
            forecast,
            anomalies,
            importance,
            models,
            completed_at: Utc::now(),
            timings,
        };
        info!(
            "Pipeline run {} complete ({:.1}s): {}",
            result.run_id,
            run_start.elapsed().as_secs_f64(),
            result.timings.summary()
        );
        Ok(result)
    }
}
