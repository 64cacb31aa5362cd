//! Read models over a published [`PipelineResult`].
//!
//! These are what an API layer would serve: a machine summary, a forecast
//! chart and an anomaly status per sensor. All of them are pure functions of
//! one result, so a reader holding an `Arc<PipelineResult>` always sees one
//! consistent run.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use sensorcast_core::SensorId;

use super::PipelineResult;

/// History points returned alongside a forecast (one day at 30 min).
pub const HISTORY_POINTS: usize = 48;

/// Percentile of the score distribution used as the anomaly threshold.
pub const THRESHOLD_PERCENTILE: f64 = 5.0;

/// Data older than this is not considered real-time.
pub const REALTIME_MAX_MINUTES: i64 = 30;

/// Sensor whose RMS velocity drives the ISO 10816 zone.
pub const ISO_SENSOR: &str = "z_rms";

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("sensor '{name}' not found, available: {}", available.join(", "))]
    UnknownSensor { name: String, available: Vec<String> },
}

fn resolve(result: &PipelineResult, name: &str) -> Result<SensorId, ViewError> {
    result
        .frame
        .sensors
        .id_of(name)
        .ok_or_else(|| ViewError::UnknownSensor {
            name: name.to_string(),
            available: result.frame.sensors.names().to_vec(),
        })
}

// ── Machine summary ──────────────────────────────────────────────────

/// ISO 10816 vibration severity zone from RMS velocity in mm/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IsoZone {
    A,
    B,
    C,
    D,
}

impl IsoZone {
    pub fn from_rms(mm_per_s: f64) -> Self {
        if mm_per_s < 0.71 {
            IsoZone::A
        } else if mm_per_s < 1.8 {
            IsoZone::B
        } else if mm_per_s < 4.5 {
            IsoZone::C
        } else {
            IsoZone::D
        }
    }

    pub fn condition(self) -> &'static str {
        match self {
            IsoZone::A => "Good",
            IsoZone::B => "Acceptable",
            IsoZone::C => "Unsatisfactory",
            IsoZone::D => "Unacceptable",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    pub sensor: String,
    pub value: f64,
    pub imputed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineSummary {
    pub run_id: uuid::Uuid,
    pub completed_at: DateTime<Utc>,
    pub data_timestamp: NaiveDateTime,
    pub readings: Vec<SensorReading>,
    /// Sensors whose latest value was interpolated rather than observed.
    pub flagged_sensors: Vec<String>,
    pub data_quality_warning: Option<String>,
    pub minutes_behind: i64,
    pub realtime: bool,
    /// `None` when the machine has no RMS velocity sensor.
    pub iso_zone: Option<IsoZone>,
}

/// Latest readings, data quality and freshness.
///
/// `now_local` must be on the same wall clock as the frame (the configured
/// UTC offset).
pub fn machine_summary(result: &PipelineResult, now_local: NaiveDateTime) -> Option<MachineSummary> {
    let frame = &result.frame;
    let data_timestamp = frame.last_timestamp()?;
    let last = frame.len() - 1;

    let readings: Vec<SensorReading> = frame
        .sensors
        .iter()
        .map(|(id, name)| SensorReading {
            sensor: name.to_string(),
            value: frame.column(id)[last],
            imputed: frame.flags(id)[last],
        })
        .collect();

    let flagged_sensors: Vec<String> = readings
        .iter()
        .filter(|r| r.imputed)
        .map(|r| r.sensor.clone())
        .collect();
    let data_quality_warning = if flagged_sensors.is_empty() {
        None
    } else {
        Some(format!(
            "Sensor reading error for {}; values are interpolated",
            flagged_sensors.join(", ")
        ))
    };

    let minutes_behind = (now_local - data_timestamp).num_minutes();
    let iso_zone = frame
        .sensors
        .id_of(ISO_SENSOR)
        .map(|id| IsoZone::from_rms(frame.column(id)[last]));

    Some(MachineSummary {
        run_id: result.run_id,
        completed_at: result.completed_at,
        data_timestamp,
        readings,
        flagged_sensors,
        data_quality_warning,
        minutes_behind,
        realtime: minutes_behind <= REALTIME_MAX_MINUTES,
        iso_zone,
    })
}

// ── Forecast chart ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ForecastView {
    pub sensor: String,
    pub unit: &'static str,
    pub history_timestamps: Vec<NaiveDateTime>,
    pub history_values: Vec<f64>,
    pub history_flags: Vec<bool>,
    pub forecast_timestamps: Vec<NaiveDateTime>,
    pub forecast_values: Vec<f64>,
}

/// Display unit inferred from the sensor name.
pub fn unit_for(sensor: &str) -> &'static str {
    if sensor.contains("rms") {
        "mm/s"
    } else if sensor.contains("temp") {
        "°C"
    } else {
        "A"
    }
}

pub fn forecast_view(result: &PipelineResult, sensor: &str) -> Result<ForecastView, ViewError> {
    let id = resolve(result, sensor)?;
    let frame = &result.frame;
    let from = frame.len().saturating_sub(HISTORY_POINTS);

    Ok(ForecastView {
        sensor: sensor.to_string(),
        unit: unit_for(sensor),
        history_timestamps: frame.timestamps[from..].to_vec(),
        history_values: frame.column(id)[from..].to_vec(),
        history_flags: frame.flags(id)[from..].to_vec(),
        forecast_timestamps: result.forecast.timestamps.clone(),
        forecast_values: result.forecast.column(id).to_vec(),
    })
}

// ── Anomaly status ───────────────────────────────────────────────────

/// Which scores the percentile threshold is computed over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ThresholdPolicy {
    /// All scores except the one being judged.
    #[default]
    ExcludingLatest,
    /// All scores, including the one being judged.
    IncludingLatest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnomalyStatus {
    Anomaly,
    Normal,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyView {
    pub sensor: String,
    pub timestamps: Vec<NaiveDateTime>,
    pub scores: Vec<f64>,
    pub raw_values: Vec<f64>,
    pub threshold: Option<f64>,
    pub latest_score: Option<f64>,
    pub status: AnomalyStatus,
    pub policy: ThresholdPolicy,
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn anomaly_view(
    result: &PipelineResult,
    sensor: &str,
    policy: ThresholdPolicy,
) -> Result<AnomalyView, ViewError> {
    let id = resolve(result, sensor)?;
    let scores = result.anomalies.column(id);
    let frame = &result.frame;
    let raw_values = frame.column(id)[frame.len() - scores.len()..].to_vec();

    let latest_score = scores.last().copied();
    let reference = match policy {
        ThresholdPolicy::ExcludingLatest => &scores[..scores.len().saturating_sub(1)],
        ThresholdPolicy::IncludingLatest => scores,
    };
    let threshold = percentile(reference, THRESHOLD_PERCENTILE);

    let status = match (latest_score, threshold) {
        (Some(s), Some(t)) if s < t => AnomalyStatus::Anomaly,
        _ => AnomalyStatus::Normal,
    };

    Ok(AnomalyView {
        sensor: sensor.to_string(),
        timestamps: result.anomalies.timestamps.clone(),
        scores: scores.to_vec(),
        raw_values,
        threshold,
        latest_score,
        status,
        policy,
    })
}
