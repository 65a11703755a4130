use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::config::{FilterField, FilterSettings};
use crate::types::ForecastRecord;

/// Mean and population standard deviation of the filtered field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScoreBounds {
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
}

impl ZScoreBounds {
    /// A zero spread retains everything
    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        if self.std_dev == 0.0 {
            return true;
        }
        ((value - self.mean) / self.std_dev).abs() <= self.threshold
    }
}

/// Drops forecast records whose price sits too many deviations from the mean
#[derive(Debug, Clone)]
pub struct OutlierFilter {
    threshold: f64,
    field: FilterField,
}

impl OutlierFilter {
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            threshold: settings.z_score_threshold,
            field: settings.field,
        }
    }

    fn value_of(&self, record: &ForecastRecord) -> f64 {
        let value = match self.field {
            FilterField::Close => record.close,
            FilterField::PredictClose => record.predict_close,
        };
        value.to_f64().unwrap_or(f64::NAN)
    }

    /// `None` for an empty series
    pub fn bounds(&self, records: &[ForecastRecord]) -> Option<ZScoreBounds> {
        let values: Vec<f64> = records
            .iter()
            .map(|r| self.value_of(r))
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(ZScoreBounds {
            mean,
            std_dev: variance.sqrt(),
            threshold: self.threshold,
        })
    }

    pub fn retain_within(&self, records: &[ForecastRecord], bounds: &ZScoreBounds) -> Vec<ForecastRecord> {
        records
            .iter()
            .filter(|r| bounds.contains(self.value_of(r)))
            .cloned()
            .collect()
    }

    pub fn filter(&self, records: &[ForecastRecord]) -> Vec<ForecastRecord> {
        let Some(bounds) = self.bounds(records) else {
            return Vec::new();
        };
        let kept = self.retain_within(records, &bounds);
        debug!(
            "Outlier filter: mean={:.2} std={:.2}, kept {}/{}",
            bounds.mean, bounds.std_dev, kept.len(), records.len()
        );
        kept
    }
}
