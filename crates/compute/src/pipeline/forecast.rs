//! Recursive multi-step forecasting.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use sensorcast_core::{SensorId, SensorSet};

use super::lags::parse_lag_column;
use super::resample::SensorFrame;
use super::trainer::TrainedModelSet;

/// Fixed-capacity history of the most recent rows, one value per sensor.
///
/// Pushing onto a full ring overwrites the oldest row; the allocation never
/// grows.
#[derive(Debug, Clone)]
pub struct LagRing {
    data: Vec<f64>,
    width: usize,
    capacity: usize,
    /// Slot the next push writes to.
    head: usize,
    len: usize,
}

impl LagRing {
    pub fn new(capacity: usize, width: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![0.0; capacity * width],
            width,
            capacity,
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, row: &[f64]) {
        let slot = &mut self.data[self.head * self.width..(self.head + 1) * self.width];
        for (dst, src) in slot.iter_mut().zip(row) {
            *dst = *src;
        }
        self.head = (self.head + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    /// Value of `column` in the `k`-th most recent row (`k = 1` is the newest).
    pub fn lag(&self, k: usize, column: usize) -> Option<f64> {
        if k == 0 || k > self.len || column >= self.width {
            return None;
        }
        let slot = (self.head + self.capacity - k) % self.capacity;
        Some(self.data[slot * self.width + column])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastFrame {
    pub sensors: SensorSet,
    pub timestamps: Vec<NaiveDateTime>,
    /// Indexed by sensor, then by step.
    pub values: Vec<Vec<f64>>,
}

impl ForecastFrame {
    pub fn column(&self, id: SensorId) -> &[f64] {
        &self.values[id.index()]
    }

    pub fn horizon(&self) -> usize {
        self.timestamps.len()
    }
}

/// Roll the models forward `horizon` steps past the end of `frame`, feeding
/// each step's predictions back in as the newest lag row.
///
/// Feature columns that cannot be rebuilt from the ring (unknown sensor, lag
/// deeper than the history) read as 0.
pub fn forecast(
    models: &TrainedModelSet,
    frame: &SensorFrame,
    feature_columns: &[String],
    horizon: usize,
) -> ForecastFrame {
    let sensors = &frame.sensors;
    let width = sensors.len();

    let layout: Vec<Option<(usize, usize)>> = feature_columns
        .iter()
        .map(|f| {
            let (column, k) = parse_lag_column(f)?;
            Some((k, sensors.id_of(column)?.index()))
        })
        .collect();
    let unresolved = layout.iter().filter(|l| l.is_none()).count();
    if unresolved > 0 {
        debug!(unresolved, "feature columns not rebuildable, filled with 0");
    }
    let depth = layout.iter().flatten().map(|&(k, _)| k).max().unwrap_or(1);

    let mut ring = LagRing::new(depth, width);
    let tail = frame.len().saturating_sub(ring.capacity());
    for r in tail..frame.len() {
        let row: Vec<f64> = frame.values.iter().map(|col| col[r]).collect();
        ring.push(&row);
    }

    let mut values = vec![Vec::with_capacity(horizon); width];
    let mut features = vec![0.0; feature_columns.len()];
    let mut predicted = vec![0.0; width];
    for _ in 0..horizon {
        for (slot, source) in features.iter_mut().zip(&layout) {
            *slot = source
                .and_then(|(k, column)| ring.lag(k, column))
                .unwrap_or(0.0);
        }
        for id in sensors.ids() {
            predicted[id.index()] = models.get(id).predict(&features);
        }
        for (col, &v) in values.iter_mut().zip(&predicted) {
            col.push(v);
        }
        ring.push(&predicted);
    }

    let timestamps = match frame.last_timestamp() {
        Some(last) => (1..=horizon as i32)
            .map(|i| last + frame.frequency() * i)
            .collect(),
        None => Vec::new(),
    };

    ForecastFrame {
        sensors: sensors.clone(),
        timestamps,
        values,
    }
}
