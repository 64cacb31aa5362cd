//! Resampling raw rows onto a regular grid and imputing the gaps.

use std::time::Instant;

use chrono::{Duration, FixedOffset, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use sensorcast_core::{PipelineConfig, RawTable, SensorId, SensorSet};

/// How raw timestamps are placed on the grid.
#[derive(Debug, Clone, Copy)]
pub struct Grid {
    pub frequency_secs: i64,
    pub offset: FixedOffset,
    pub round_decimals: Option<u32>,
}

impl Grid {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            frequency_secs: config.frequency_secs.max(1),
            offset: config.utc_offset(),
            round_decimals: config.round_decimals,
        }
    }

    /// Round a local wall-clock time to the nearest slot, ties to the even slot.
    fn slot_of(&self, local: NaiveDateTime) -> i64 {
        let secs = local.and_utc().timestamp();
        let freq = self.frequency_secs;
        let q = secs.div_euclid(freq);
        let r = secs.rem_euclid(freq);
        if 2 * r > freq || (2 * r == freq && q % 2 != 0) {
            q + 1
        } else {
            q
        }
    }

    fn slot_time(&self, slot: i64) -> NaiveDateTime {
        chrono::DateTime::from_timestamp(slot * self.frequency_secs, 0)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default()
    }
}

/// Cleaned sensor readings on a regular grid.
///
/// `values[sensor][row]` is never missing; `imputed[sensor][row]` records
/// whether the value was filled in rather than observed.
#[derive(Debug, Clone, Serialize)]
pub struct SensorFrame {
    pub sensors: SensorSet,
    /// Local wall-clock slot times, strictly increasing by `frequency_secs`.
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<Vec<f64>>,
    pub imputed: Vec<Vec<bool>>,
    pub frequency_secs: i64,
}

impl SensorFrame {
    pub fn empty(sensors: SensorSet, frequency_secs: i64) -> Self {
        let n = sensors.len();
        Self {
            sensors,
            timestamps: Vec::new(),
            values: vec![Vec::new(); n],
            imputed: vec![Vec::new(); n],
            frequency_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, id: SensorId) -> &[f64] {
        &self.values[id.index()]
    }

    pub fn flags(&self, id: SensorId) -> &[bool] {
        &self.imputed[id.index()]
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    pub fn frequency(&self) -> Duration {
        Duration::seconds(self.frequency_secs)
    }
}

/// Clean raw rows into a [`SensorFrame`].
///
/// Never fails: unparseable values become missing and are imputed, and an
/// empty table yields an empty frame with one column per sensor.
pub fn clean(raw: &RawTable, sensors: &SensorSet, grid: &Grid) -> SensorFrame {
    let start = Instant::now();
    if raw.is_empty() {
        return SensorFrame::empty(sensors.clone(), grid.frequency_secs);
    }

    // Within a slot the earliest reading comes first; arrival order only
    // breaks exact timestamp ties.
    let mut slotted: Vec<(i64, usize)> = raw
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let local = row.timestamp.with_timezone(&grid.offset).naive_local();
            (grid.slot_of(local), i)
        })
        .collect();
    slotted.sort_by_key(|&(slot, i)| (slot, raw.rows[i].timestamp, i));

    let first = slotted[0].0;
    let last = slotted[slotted.len() - 1].0;
    let len = (last - first + 1) as usize;

    let mut observed: Vec<Vec<Option<f64>>> = vec![vec![None; len]; sensors.len()];
    for &(slot, i) in &slotted {
        let row = &raw.rows[i];
        let pos = (slot - first) as usize;
        for (id, name) in sensors.iter() {
            let cell = &mut observed[id.index()][pos];
            if cell.is_none() {
                *cell = row.get(name).and_then(|v| v.as_f64());
            }
        }
    }

    let timestamps: Vec<NaiveDateTime> = (first..=last).map(|s| grid.slot_time(s)).collect();

    let mut values = Vec::with_capacity(sensors.len());
    let mut imputed = Vec::with_capacity(sensors.len());
    for (id, name) in sensors.iter() {
        let column = &observed[id.index()];
        let flags: Vec<bool> = column.iter().map(Option::is_none).collect();
        let missing = flags.iter().filter(|&&f| f).count();
        if missing > 0 {
            debug!(sensor = name, missing, "imputing missing slots");
        }
        let mut filled = impute(column);
        if let Some(d) = grid.round_decimals {
            round_in_place(&mut filled, d);
        }
        values.push(filled);
        imputed.push(flags);
    }

    info!(
        "Resampled {} raw rows onto {} slots ({:.3}s)",
        raw.len(),
        len,
        start.elapsed().as_secs_f64()
    );

    SensorFrame {
        sensors: sensors.clone(),
        timestamps,
        values,
        imputed,
        frequency_secs: grid.frequency_secs,
    }
}

/// Linear interpolation between known points; edges take the nearest known
/// value; an all-missing column becomes zeros.
fn impute(column: &[Option<f64>]) -> Vec<f64> {
    let known: Vec<(usize, f64)> = column
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    if known.is_empty() {
        return vec![0.0; column.len()];
    }

    let mut out = vec![0.0; column.len()];
    let (first_i, first_v) = known[0];
    let (last_i, last_v) = known[known.len() - 1];
    out[..first_i].fill(first_v);
    out[last_i..].fill(last_v);

    for pair in known.windows(2) {
        let (a, va) = pair[0];
        let (b, vb) = pair[1];
        out[a] = va;
        let span = (b - a) as f64;
        for (k, slot) in out.iter_mut().enumerate().take(b).skip(a + 1) {
            let frac = (k - a) as f64 / span;
            *slot = va + (vb - va) * frac;
        }
    }
    out
}

fn round_in_place(values: &mut [f64], decimals: u32) {
    let scale = 10f64.powi(decimals as i32);
    for v in values.iter_mut() {
        *v = (*v * scale).round() / scale;
    }
}
