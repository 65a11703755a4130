use ndarray::Array2;
use rust_decimal::Decimal;
use std::sync::atomic::AtomicBool;
use tracing::{debug, error, info, warn};

use crate::config::ModelSettings;
use crate::error::{ForecastError, Result};
use crate::types::{round_money, Candle, Forecast, ForecastRecord, Side};

use super::features::{self, CandleFeatures, TrainingLabel};
use super::network::NeuralRegressor;

/// Forecasts the next close and direction for one candle index.
///
/// Every call trains a fresh regressor on the history up to the target and
/// drops it after a single inference, so unseeded runs differ between calls.
#[derive(Debug, Clone)]
pub struct Predictor {
    settings: ModelSettings,
}

impl Predictor {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Indices with too little history on either edge pass the close through
    pub fn is_pass_through(target_index: usize, len: usize) -> bool {
        target_index <= 1 || target_index + 1 >= len
    }

    fn operation_for(&self, bullish_score: f64) -> Side {
        if bullish_score >= self.settings.bullish_threshold {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn forecast_next(&self, candles: &[Candle], target_index: usize) -> Result<Forecast> {
        self.forecast_next_until(candles, target_index, &AtomicBool::new(false))
    }

    /// `forecast_next` whose training aborts once `cancel` is raised.
    ///
    /// The training window is `candles[..=target_index]`, so the target's own
    /// close is the label of the last sample. Cutting the window one candle
    /// earlier would leave no sample at all at `target_index == 2`.
    pub fn forecast_next_until(&self, candles: &[Candle], target_index: usize, cancel: &AtomicBool) -> Result<Forecast> {
        let target = candles.get(target_index).ok_or(ForecastError::IndexOutOfRange {
            index: target_index,
            len: candles.len(),
        })?;

        if Self::is_pass_through(target_index, candles.len()) {
            return Ok(Forecast::pass_through(target));
        }

        let training = features::build_training_set(&candles[..=target_index]);
        if training.is_empty() {
            return Err(ForecastError::EmptyTrainingSet);
        }

        let mut model = NeuralRegressor::new(
            CandleFeatures::NUM_FEATURES,
            TrainingLabel::NUM_OUTPUTS,
            &self.settings,
        );
        let report = model
            .fit_until(&training, cancel)
            .map_err(|e| ForecastError::training(target_index, e.to_string()))?;

        let current = features::extract_features(target, &candles[target_index - 1]);
        let input = Array2::from_shape_vec((1, CandleFeatures::NUM_FEATURES), current.to_array().to_vec())
            .map_err(|e| ForecastError::training(target_index, e.to_string()))?;
        let output = model.predict(&input);

        let predicted_close = output[[0, 0]];
        let bullish_score = output[[0, 1]];
        if !predicted_close.is_finite() || !bullish_score.is_finite() {
            return Err(ForecastError::training(target_index, "non-finite model output"));
        }

        let predict_close = Decimal::try_from(predicted_close)
            .map(round_money)
            .map_err(|e| ForecastError::training(target_index, e.to_string()))?;
        let operation = self.operation_for(bullish_score);

        debug!(
            "[{}] index {}: {} samples, loss {:.4}, close={} predicted={:.2} score={:.3} -> {}",
            target.symbol, target_index, report.samples, report.final_loss,
            target.close, predicted_close, bullish_score, operation
        );

        Ok(Forecast {
            predict_close,
            operation: Some(operation),
            bullish_score: Some(bullish_score),
        })
    }

    /// One record per candle, in index order. Recoverable failures become
    /// gaps; anything else aborts the series.
    pub fn forecast_series(&self, candles: &[Candle]) -> Result<Vec<ForecastRecord>> {
        let mut records = Vec::with_capacity(candles.len());
        for (index, candle) in candles.iter().enumerate() {
            records.push(record_or_gap(candle, index, self.forecast_next(candles, index))?);
        }

        info!(
            "Forecast series complete: {} records, {} with operations",
            records.len(),
            records.iter().filter(|r| r.has_operation()).count()
        );
        Ok(records)
    }
}

/// Turns one forecast outcome into a series record
pub fn record_or_gap(candle: &Candle, index: usize, outcome: Result<Forecast>) -> Result<ForecastRecord> {
    match outcome {
        Ok(forecast) => Ok(ForecastRecord::from_forecast(candle, forecast)),
        Err(e) if e.is_recoverable() => {
            warn!("[{}] Forecast gap at index {}: {}", candle.symbol, index, e);
            Ok(ForecastRecord::gap(candle))
        }
        Err(e) => {
            error!("[{}] Forecast aborted at index {}: {}", candle.symbol, index, e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::candle::test_support::{candles_from_oc, trending_candles};

    fn fast_settings() -> ModelSettings {
        ModelSettings {
            hidden_layers: vec![8, 8, 4],
            epochs: 5,
            batch_size: 8,
            seed: Some(42),
            ..ModelSettings::default()
        }
    }

    #[test]
    fn test_edges_pass_through() {
        let candles = trending_candles(6);
        let predictor = Predictor::new(fast_settings());

        for index in [0, 1, 5] {
            let forecast = predictor.forecast_next(&candles, index).unwrap();
            assert_eq!(forecast.predict_close, candles[index].close);
            assert_eq!(forecast.operation, None);
        }
    }

    #[test]
    fn test_boundary_arithmetic_uses_series_length() {
        let four = candles_from_oc(&[(10, 10), (10, 12), (12, 11), (11, 14)]);
        assert!(!Predictor::is_pass_through(2, four.len()));
        assert!(Predictor::is_pass_through(3, four.len()));

        let three = &four[..3];
        assert!(Predictor::is_pass_through(2, three.len()));

        let predictor = Predictor::new(fast_settings());
        assert!(predictor.forecast_next(&four, 2).unwrap().operation.is_some());
        let edge = predictor.forecast_next(three, 2).unwrap();
        assert_eq!(edge.operation, None);
        assert_eq!(edge.predict_close, three[2].close);
    }

    #[test]
    fn test_interior_index_emits_operation() {
        let candles = trending_candles(20);
        let predictor = Predictor::new(fast_settings());
        let forecast = predictor.forecast_next(&candles, 10).unwrap();

        let score = forecast.bullish_score.unwrap();
        let expected = if score >= 0.5 { Side::Buy } else { Side::Sell };
        assert_eq!(forecast.operation, Some(expected));
    }

    #[test]
    fn test_threshold_is_configurable() {
        let strict = Predictor::new(ModelSettings {
            bullish_threshold: 1.0,
            ..fast_settings()
        });
        assert_eq!(strict.operation_for(0.99), Side::Sell);
        assert_eq!(strict.operation_for(1.0), Side::Buy);
    }

    #[test]
    fn test_out_of_range_index() {
        let candles = trending_candles(4);
        let predictor = Predictor::new(fast_settings());
        assert!(matches!(
            predictor.forecast_next(&candles, 4),
            Err(ForecastError::IndexOutOfRange { index: 4, len: 4 })
        ));
    }

    #[test]
    fn test_series_has_one_record_per_candle() {
        let candles = trending_candles(8);
        let records = Predictor::new(fast_settings()).forecast_series(&candles).unwrap();

        assert_eq!(records.len(), candles.len());
        assert!(records[0].operation.is_none());
        assert!(records[1].operation.is_none());
        assert!(records[7].operation.is_none());
        assert!(records[2..7].iter().all(|r| r.operation.is_some()));
    }

    #[test]
    fn test_diverging_fit_leaves_gaps_and_series_continues() {
        let candles = trending_candles(8);
        let predictor = Predictor::new(ModelSettings {
            learning_rate: 1e300,
            epochs: 5,
            ..fast_settings()
        });

        assert!(matches!(
            predictor.forecast_next(&candles, 4),
            Err(ForecastError::TrainingFailure { index: 4, .. })
        ));

        let records = predictor.forecast_series(&candles).unwrap();
        assert_eq!(records.len(), candles.len());
        for (record, candle) in records.iter().zip(&candles) {
            assert_eq!(record.operation, None);
            assert_eq!(record.predict_close, candle.close);
        }
    }

    #[test]
    fn test_only_recoverable_errors_become_gaps() {
        let candles = trending_candles(4);

        let gap = record_or_gap(&candles[2], 2, Err(ForecastError::training(2, "diverged"))).unwrap();
        assert_eq!(gap, ForecastRecord::gap(&candles[2]));
        assert!(record_or_gap(&candles[2], 2, Err(ForecastError::EmptyTrainingSet)).is_ok());

        let fatal = record_or_gap(&candles[3], 9, Err(ForecastError::IndexOutOfRange { index: 9, len: 4 }));
        assert!(matches!(fatal, Err(ForecastError::IndexOutOfRange { index: 9, len: 4 })));
    }

    #[test]
    fn test_predicted_close_is_rounded_to_cents() {
        let candles = trending_candles(12);
        let forecast = Predictor::new(fast_settings()).forecast_next(&candles, 6).unwrap();
        assert_eq!(forecast.predict_close, round_money(forecast.predict_close));
    }
}
