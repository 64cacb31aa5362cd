use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sensorcast_core::{DataSource, RawRow, RawTable, RawValue, Result, SensorcastError};

/// Baseline and daily swing per known conveyor sensor.
const PROFILES: &[(&str, f64, f64, f64)] = &[
    // (name, mean, daily amplitude, noise sd)
    ("current", 12.0, 2.5, 0.3),
    ("temperature", 38.0, 4.0, 0.4),
    ("z_rms", 1.1, 0.25, 0.05),
    ("x_rms", 0.9, 0.2, 0.05),
    ("z_peak", 3.2, 0.6, 0.15),
    ("x_peak", 2.8, 0.5, 0.15),
    ("noise", 68.0, 3.0, 0.8),
];

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub sensors: Vec<String>,
    /// Number of raw rows generated.
    pub rows: usize,
    /// Spacing between raw rows.
    pub step: Duration,
    /// Timestamp of the last row; `None` means "now", floored to the step.
    pub end: Option<DateTime<Utc>>,
    /// Chance that a single field is missing.
    pub gap_probability: f64,
    /// Chance that a single field arrives as unparseable text.
    pub garbage_probability: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sensors: PROFILES.iter().map(|p| p.0.to_string()).collect(),
            rows: 14 * 48,
            step: Duration::minutes(30),
            end: None,
            gap_probability: 0.01,
            garbage_probability: 0.002,
            seed: 7,
        }
    }
}

/// Seeded generator of conveyor-like readings with daily cycles and gaps.
///
/// The same config always yields the same values; only `end = None` moves
/// the time axis.
pub struct SyntheticSource {
    config: SyntheticConfig,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self) -> Result<RawTable> {
        let cfg = &self.config;
        if cfg.step <= Duration::zero() {
            return Err(SensorcastError::Config {
                key: "step".into(),
                reason: "must be positive".into(),
            });
        }
        let end = match cfg.end {
            Some(end) => end,
            None => Utc::now()
                .duration_trunc(cfg.step)
                .map_err(|e| SensorcastError::Source(e.to_string()))?,
        };

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut table = RawTable::empty();
        for i in 0..cfg.rows {
            let back = cfg.step * (cfg.rows - 1 - i) as i32;
            let ts = end - back;
            let day_phase = (ts.timestamp() % 86_400) as f64 / 86_400.0;
            let mut row = RawRow::new(ts);

            for name in &cfg.sensors {
                let (mean, amp, sd) = profile(name);
                let roll: f64 = rng.gen();
                let value = if roll < cfg.gap_probability {
                    RawValue::Null
                } else if roll < cfg.gap_probability + cfg.garbage_probability {
                    RawValue::Text("ERR".into())
                } else {
                    let noise = (rng.gen::<f64>() - 0.5) * 2.0 * sd;
                    let v = mean + amp * (std::f64::consts::TAU * day_phase).sin() + noise;
                    RawValue::Float(v)
                };
                row.fields.insert(name.clone(), value);
            }
            table.push(row);
        }
        Ok(table)
    }
}

fn profile(name: &str) -> (f64, f64, f64) {
    PROFILES
        .iter()
        .find(|p| p.0 == name)
        .map(|p| (p.1, p.2, p.3))
        .unwrap_or((1.0, 0.2, 0.05))
}

#[async_trait]
impl DataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn load(&self) -> Result<RawTable> {
        self.generate()
    }
}
