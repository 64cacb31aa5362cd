//! Trailing-window anomaly scores per sensor.
//!
//! Each sensor's last `lookback` cleaned values go through the windowed
//! isolation kernel. Scores line up with the trailing timestamps of the
//! frame, newest last. Lower means more anomalous; turning scores into a
//! verdict is left to the read models.

use std::time::Instant;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use sensorcast_core::{AnomalyParams, SensorId, SensorSet};

use crate::algorithms::idk::windowed_isolation_score;

use super::resample::SensorFrame;

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyScoreSet {
    pub sensors: SensorSet,
    /// The trailing `min(lookback, len)` timestamps of the frame.
    pub timestamps: Vec<NaiveDateTime>,
    /// Indexed by sensor; each aligned with `timestamps`.
    pub scores: Vec<Vec<f64>>,
}

impl AnomalyScoreSet {
    pub fn column(&self, id: SensorId) -> &[f64] {
        &self.scores[id.index()]
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Score one sensor's trailing window.
pub fn score(frame: &SensorFrame, sensor: SensorId, params: &AnomalyParams) -> Vec<f64> {
    let column = frame.column(sensor);
    let n = params.lookback.min(column.len());
    windowed_isolation_score(
        &column[column.len() - n..],
        params.estimators,
        params.psi1,
        params.width,
        params.psi2,
    )
}

/// Score every sensor, in parallel.
pub fn score_all(frame: &SensorFrame, params: &AnomalyParams) -> AnomalyScoreSet {
    let start = Instant::now();
    let n = params.lookback.min(frame.len());
    let ids: Vec<SensorId> = frame.sensors.ids().collect();
    let scores: Vec<Vec<f64>> = ids
        .into_par_iter()
        .map(|id| score(frame, id, params))
        .collect();

    info!(
        "Scored {} sensors over {} points ({:.2}s)",
        scores.len(),
        n,
        start.elapsed().as_secs_f64()
    );

    AnomalyScoreSet {
        sensors: frame.sensors.clone(),
        timestamps: frame.timestamps[frame.len() - n..].to_vec(),
        scores,
    }
}
