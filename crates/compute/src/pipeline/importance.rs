use serde::Serialize;

use sensorcast_core::{ImportanceKind, SensorId, SensorSet};

use super::trainer::{ModelKind, TrainedModelSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Top features per sensor, most important first.
#[derive(Debug, Clone, Serialize)]
pub struct ImportanceSet {
    pub sensors: SensorSet,
    pub kind: ImportanceKind,
    pub rankings: Vec<Vec<FeatureImportance>>,
}

impl ImportanceSet {
    pub fn ranking(&self, id: SensorId) -> &[FeatureImportance] {
        &self.rankings[id.index()]
    }
}

/// Rank each model's features by intrinsic importance and keep the top `top_k`.
///
/// Ties keep feature-column order. Fallback models have no ranking.
pub fn importance(
    models: &TrainedModelSet,
    sensors: &SensorSet,
    kind: ImportanceKind,
    top_k: usize,
) -> ImportanceSet {
    let rankings = models
        .iter()
        .map(|model| match &model.kind {
            ModelKind::Boosted(booster) => {
                let mut ranked: Vec<FeatureImportance> = model
                    .feature_columns
                    .iter()
                    .zip(booster.feature_importance(kind))
                    .map(|(f, &v)| FeatureImportance {
                        feature: f.clone(),
                        importance: v,
                    })
                    .collect();
                ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
                ranked.truncate(top_k);
                ranked
            }
            ModelKind::Fallback { .. } => Vec::new(),
        })
        .collect();

    ImportanceSet {
        sensors: sensors.clone(),
        kind,
        rankings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::lags::{build_lags, NumericFrame};
    use crate::pipeline::trainer::{split_chronological, train};
    use chrono::NaiveDate;
    use sensorcast_core::BoosterParams;

    fn trained() -> (TrainedModelSet, SensorSet, Vec<String>) {
        let n = 120;
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let frame = NumericFrame {
            timestamps: (0..n)
                .map(|i| t0 + chrono::Duration::minutes(30 * i as i64))
                .collect(),
            names: vec!["saw".into()],
            columns: vec![(0..n).map(|i| (i % 6) as f64).collect()],
        };
        let sensors = SensorSet::new(["saw"]).unwrap();
        let (lagged, features) = build_lags(&frame, 6);
        let split = split_chronological(&lagged, &sensors, &features, 0.9);
        let params = BoosterParams {
            min_data_in_leaf: 3,
            max_rounds: 30,
            ..BoosterParams::default()
        };
        (train(&split, &sensors, &params), sensors, features)
    }

    #[test]
    fn sorted_descending_and_truncated() {
        let (models, sensors, _) = trained();
        let set = importance(&models, &sensors, ImportanceKind::Split, 3);
        let ranking = set.ranking(sensors.require("saw").unwrap());

        assert!(ranking.len() <= 3);
        assert!(!ranking.is_empty());
        for w in ranking.windows(2) {
            assert!(w[0].importance >= w[1].importance);
        }
    }

    #[test]
    fn top_k_larger_than_features_keeps_all() {
        let (models, sensors, features) = trained();
        let set = importance(&models, &sensors, ImportanceKind::Gain, 100);
        assert_eq!(set.rankings[0].len(), features.len());
    }
}
