//! Supervised lag features.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::resample::SensorFrame;

/// Named numeric columns over shared timestamps, column-major.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericFrame {
    pub timestamps: Vec<NaiveDateTime>,
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

/// Sensor columns followed by every lag column, warm-up rows dropped.
pub type LaggedMatrix = NumericFrame;

impl NumericFrame {
    /// The sensor value columns of a cleaned frame, without the flags.
    pub fn from_sensor_frame(frame: &SensorFrame) -> Self {
        Self {
            timestamps: frame.timestamps.clone(),
            names: frame.sensors.names().to_vec(),
            columns: frame.values.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }
}

pub fn lag_column_name(column: &str, k: usize) -> String {
    format!("{}_lag{}", column, k)
}

/// Split `<column>_lag<k>` back into its parts.
pub fn parse_lag_column(name: &str) -> Option<(&str, usize)> {
    let (column, k) = name.rsplit_once("_lag")?;
    Some((column, k.parse().ok()?))
}

/// Append `<column>_lag<k>` for `k` in `1..=lag_steps`, lag-major, and drop
/// the first `lag_steps` rows.
///
/// Returns the lagged matrix and its lag columns in order. With
/// `lag_steps == 0` the frame is returned unchanged and no feature columns
/// are produced.
pub fn build_lags(frame: &NumericFrame, lag_steps: usize) -> (LaggedMatrix, Vec<String>) {
    if lag_steps == 0 {
        return (frame.clone(), Vec::new());
    }

    let n = frame.len();
    let keep = n.saturating_sub(lag_steps);
    let base = frame.columns.len();

    let mut names = frame.names.clone();
    let mut columns: Vec<Vec<f64>> = frame
        .columns
        .iter()
        .map(|c| c[n - keep..].to_vec())
        .collect();
    let mut features = Vec::with_capacity(base * lag_steps);

    for k in 1..=lag_steps {
        for (name, col) in frame.names.iter().zip(&frame.columns) {
            let lag_name = lag_column_name(name, k);
            // Row r of the output is input row r + lag_steps; its lag k is r + lag_steps - k.
            let start = lag_steps - k;
            columns.push(if keep == 0 {
                Vec::new()
            } else {
                col[start..start + keep].to_vec()
            });
            names.push(lag_name.clone());
            features.push(lag_name);
        }
    }

    let lagged = NumericFrame {
        timestamps: frame.timestamps[n - keep..].to_vec(),
        names,
        columns,
    };
    (lagged, features)
}
