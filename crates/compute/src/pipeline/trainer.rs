//! One boosted regressor per sensor.

use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use sensorcast_core::{BoosterParams, SensorId, SensorSet};

use crate::algorithms::gbdt::{BoostedRegressor, Columns, TrainError};

use super::lags::LaggedMatrix;

/// Chronological train/validation split of a lagged matrix.
#[derive(Debug, Clone)]
pub struct TrainingSplit {
    pub feature_columns: Vec<String>,
    pub x_train: Vec<Vec<f64>>,
    pub x_val: Vec<Vec<f64>>,
    /// Indexed by sensor.
    pub y_train: Vec<Vec<f64>>,
    pub y_val: Vec<Vec<f64>>,
    pub train_rows: usize,
    pub val_rows: usize,
}

/// Earliest `train_fraction` of the rows train, the rest validate. Never shuffled.
pub fn split_chronological(
    matrix: &LaggedMatrix,
    sensors: &SensorSet,
    feature_columns: &[String],
    train_fraction: f64,
) -> TrainingSplit {
    let n = matrix.len();
    let cut = ((n as f64 * train_fraction) as usize).clamp(n.min(1), n);

    let take = |name: &str| -> (Vec<f64>, Vec<f64>) {
        match matrix.column(name) {
            Some(col) => (col[..cut].to_vec(), col[cut..].to_vec()),
            None => (Vec::new(), Vec::new()),
        }
    };

    let (x_train, x_val): (Vec<_>, Vec<_>) = feature_columns.iter().map(|f| take(f)).unzip();
    let (y_train, y_val): (Vec<_>, Vec<_>) = sensors.names().iter().map(|s| take(s)).unzip();

    TrainingSplit {
        feature_columns: feature_columns.to_vec(),
        x_train,
        x_val,
        y_train,
        y_val,
        train_rows: cut,
        val_rows: n - cut,
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum ModelKind {
    Boosted(BoostedRegressor),
    /// Constant predictor used when training could not produce a model.
    Fallback { value: f64, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainedModel {
    pub sensor: SensorId,
    pub name: String,
    /// Exact feature order the model expects.
    pub feature_columns: Vec<String>,
    pub kind: ModelKind,
}

impl TrainedModel {
    /// Predict from a feature row ordered as `feature_columns`.
    pub fn predict(&self, row: &[f64]) -> f64 {
        match &self.kind {
            ModelKind::Boosted(model) => model.predict_row(row),
            ModelKind::Fallback { value, .. } => *value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.kind, ModelKind::Fallback { .. })
    }
}

/// Fitted models indexed by [`SensorId`]. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct TrainedModelSet {
    models: Vec<TrainedModel>,
}

impl TrainedModelSet {
    /// Models may arrive in any order; they are indexed by their sensor.
    pub fn new(mut models: Vec<TrainedModel>) -> Self {
        models.sort_by_key(|m| m.sensor);
        Self { models }
    }

    pub fn get(&self, id: SensorId) -> &TrainedModel {
        &self.models[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainedModel> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn fallback_count(&self) -> usize {
        self.models.iter().filter(|m| m.is_fallback()).count()
    }
}

/// Train every sensor independently and in parallel.
///
/// A sensor whose training fails gets a constant fallback model; the other
/// sensors are unaffected.
pub fn train(split: &TrainingSplit, sensors: &SensorSet, params: &BoosterParams) -> TrainedModelSet {
    let start = Instant::now();
    let ids: Vec<SensorId> = sensors.ids().collect();

    let models: Vec<TrainedModel> = ids
        .into_par_iter()
        .map(|id| {
            let name = sensors.name(id).to_string();
            let y_train = &split.y_train[id.index()];
            let y_val = &split.y_val[id.index()];

            let kind = match fit_one(split, y_train, y_val, params) {
                Ok(model) => {
                    debug!(
                        sensor = %name,
                        trees = model.num_trees(),
                        val_rmse = ?model.best_validation_rmse,
                        "model trained"
                    );
                    ModelKind::Boosted(model)
                }
                Err(e) => {
                    let value = fallback_value(y_train);
                    warn!(sensor = %name, error = %e, value, "training failed, using constant predictor");
                    ModelKind::Fallback {
                        value,
                        reason: e.to_string(),
                    }
                }
            };

            TrainedModel {
                sensor: id,
                name,
                feature_columns: split.feature_columns.clone(),
                kind,
            }
        })
        .collect();

    let set = TrainedModelSet::new(models);
    info!(
        "Trained {} models ({} fallback) on {} rows ({:.1}s)",
        set.len(),
        set.fallback_count(),
        split.train_rows,
        start.elapsed().as_secs_f64()
    );
    set
}

fn fit_one(
    split: &TrainingSplit,
    y_train: &[f64],
    y_val: &[f64],
    params: &BoosterParams,
) -> Result<BoostedRegressor, TrainError> {
    let x = Columns::new(&split.x_train, y_train.len())?;
    let valid = if y_val.is_empty() {
        None
    } else {
        Some((Columns::new(&split.x_val, y_val.len())?, y_val))
    };
    BoostedRegressor::fit(x, y_train, valid, params)
}

fn fallback_value(y: &[f64]) -> f64 {
    let finite: Vec<f64> = y.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        0.0
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::lags::{build_lags, NumericFrame};
    use chrono::NaiveDate;

    fn small_params() -> BoosterParams {
        BoosterParams {
            min_data_in_leaf: 3,
            max_rounds: 40,
            early_stopping_rounds: 5,
            ..BoosterParams::default()
        }
    }

    fn matrix(n: usize) -> (LaggedMatrix, Vec<String>, SensorSet) {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let frame = NumericFrame {
            timestamps: (0..n)
                .map(|i| t0 + chrono::Duration::minutes(30 * i as i64))
                .collect(),
            names: vec!["wave".into(), "flat".into()],
            columns: vec![
                (0..n).map(|i| ((i % 8) as f64).sin() * 3.0).collect(),
                vec![5.0; n],
            ],
        };
        let sensors = SensorSet::new(["wave", "flat"]).unwrap();
        let (lagged, features) = build_lags(&frame, 4);
        (lagged, features, sensors)
    }

    #[test]
    fn split_is_chronological() {
        let (lagged, features, sensors) = matrix(104);
        let split = split_chronological(&lagged, &sensors, &features, 0.9);
        assert_eq!(split.train_rows, 90);
        assert_eq!(split.val_rows, 10);
        assert_eq!(split.x_train.len(), features.len());
        assert_eq!(split.y_train[0][..], lagged.column("wave").unwrap()[..90]);
        assert_eq!(split.y_val[0][..], lagged.column("wave").unwrap()[90..]);
    }

    #[test]
    fn trains_one_model_per_sensor() {
        let (lagged, features, sensors) = matrix(104);
        let split = split_chronological(&lagged, &sensors, &features, 0.9);
        let models = train(&split, &sensors, &small_params());

        assert_eq!(models.len(), 2);
        for (id, _) in sensors.iter() {
            assert_eq!(models.get(id).sensor, id);
            assert_eq!(models.get(id).feature_columns, features);
        }
    }

    #[test]
    fn constant_sensor_predicts_constant() {
        let (lagged, features, sensors) = matrix(104);
        let split = split_chronological(&lagged, &sensors, &features, 0.9);
        let models = train(&split, &sensors, &small_params());

        let flat = models.get(sensors.require("flat").unwrap());
        let row = vec![1.0; features.len()];
        assert!(!flat.is_fallback());
        assert!((flat.predict(&row) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn training_is_deterministic() {
        let (lagged, features, sensors) = matrix(104);
        let split = split_chronological(&lagged, &sensors, &features, 0.9);
        let a = train(&split, &sensors, &small_params());
        let b = train(&split, &sensors, &small_params());

        let row: Vec<f64> = (0..features.len()).map(|i| i as f64 * 0.1).collect();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.predict(&row), y.predict(&row));
        }
    }

    #[test]
    fn failure_falls_back_without_aborting_others() {
        let (lagged, features, sensors) = matrix(30);
        let mut split = split_chronological(&lagged, &sensors, &features, 0.9);
        split.y_train[0][0] = f64::NAN;
        let models = train(&split, &sensors, &small_params());

        let wave = models.get(sensors.require("wave").unwrap());
        assert!(wave.is_fallback());
        assert!(wave.predict(&[]).is_finite());
        assert!(!models.get(sensors.require("flat").unwrap()).is_fallback());
        assert_eq!(models.fallback_count(), 1);
    }
}
