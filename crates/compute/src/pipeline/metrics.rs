use std::time::Duration;

use serde::Serialize;

/// Wall-clock time spent in each stage of one pipeline run, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub resample_ms: u64,
    pub lags_ms: u64,
    pub train_ms: u64,
    /// Forecast and importance run together on one side of the join.
    pub forecast_ms: u64,
    pub anomaly_ms: u64,
    pub total_ms: u64,
    /// Rows of the cleaned frame.
    pub rows: usize,
    /// Rows the models were trained on.
    pub train_rows: usize,
}

impl StageTimings {
    pub fn ms(d: Duration) -> u64 {
        d.as_millis() as u64
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "resample={}ms lags={}ms train={}ms forecast={}ms anomaly={}ms total={}ms",
            self.resample_ms,
            self.lags_ms,
            self.train_ms,
            self.forecast_ms,
            self.anomaly_ms,
            self.total_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_every_stage() {
        let t = StageTimings {
            resample_ms: 1,
            lags_ms: 2,
            train_ms: 3,
            forecast_ms: 4,
            anomaly_ms: 5,
            total_ms: 15,
            ..Default::default()
        };
        assert_eq!(
            t.summary(),
            "resample=1ms lags=2ms train=3ms forecast=4ms anomaly=5ms total=15ms"
        );
        assert_eq!(StageTimings::ms(Duration::from_micros(2_500)), 2);
    }
}
