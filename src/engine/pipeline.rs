use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::ml::model::record_or_gap;
use crate::ml::{OutlierFilter, Predictor};
use crate::types::{Candle, Forecast, ForecastRecord};

use super::backtest::Backtester;
use super::results::{BacktestResult, ForecastAccuracy};

/// Everything one series run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub symbol: String,
    pub records: Vec<ForecastRecord>,
    pub filtered: Vec<ForecastRecord>,
    pub accuracy: ForecastAccuracy,
    pub backtest: BacktestResult,
}

/// Forecast, filter and backtest a candle series.
///
/// Each index trains on a blocking worker under a timeout; an index whose
/// fit fails or times out becomes a gap record and the series carries on.
#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    predictor: Predictor,
    filter: OutlierFilter,
    backtester: Backtester,
    timeout: Duration,
}

impl ForecastPipeline {
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            predictor: Predictor::new(config.model.clone()),
            filter: OutlierFilter::new(&config.filter),
            backtester: Backtester::new(&config.backtest),
            timeout: config.runtime.training_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One record per candle, in index order. Timeouts and failed fits become
    /// gaps; an unrecoverable error aborts the series.
    pub async fn forecast_series(&self, candles: Arc<Vec<Candle>>) -> Result<Vec<ForecastRecord>> {
        let mut records = Vec::with_capacity(candles.len());

        for index in 0..candles.len() {
            let outcome = if Predictor::is_pass_through(index, candles.len()) {
                self.predictor.forecast_next(&candles, index)
            } else {
                self.train_with_timeout(&candles, index).await
            };
            records.push(record_or_gap(&candles[index], index, outcome)?);
        }

        info!(
            "Forecast series complete: {} records, {} with operations",
            records.len(),
            records.iter().filter(|r| r.has_operation()).count()
        );
        Ok(records)
    }

    /// Fits on a blocking worker; on timeout the worker is told to stop at
    /// its next epoch boundary
    async fn train_with_timeout(&self, candles: &Arc<Vec<Candle>>, index: usize) -> Result<Forecast> {
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = {
            let predictor = self.predictor.clone();
            let candles = Arc::clone(candles);
            let cancel = Arc::clone(&cancel);
            tokio::task::spawn_blocking(move || predictor.forecast_next_until(&candles, index, &cancel))
        };

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(ForecastError::training(index, format!("training task failed: {}", e))),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                Err(ForecastError::training(index, format!("exceeded {:?}", self.timeout)))
            }
        }
    }

    pub async fn run(&self, candles: Vec<Candle>) -> Result<PipelineReport> {
        let symbol = candles.first().map(|c| c.symbol.clone()).unwrap_or_default();
        info!("[{}] Running pipeline over {} candles", symbol, candles.len());

        let records = self.forecast_series(Arc::new(candles)).await?;
        let accuracy = ForecastAccuracy::evaluate(&records);
        let filtered = self.filter.filter(&records);
        let backtest = self.backtester.run(&filtered);

        info!(
            "[{}] {} of {} records kept after filtering, hit rate {:.1}%",
            symbol,
            filtered.len(),
            records.len(),
            accuracy.hit_rate_pct
        );

        Ok(PipelineReport {
            symbol,
            records,
            filtered,
            accuracy,
            backtest,
        })
    }

    /// Independent series run concurrently; each keeps its own ordering
    pub async fn run_symbols(&self, series: Vec<Vec<Candle>>) -> Result<Vec<PipelineReport>> {
        let runs = series.into_iter().map(|candles| self.run(candles));
        futures::future::try_join_all(runs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSettings;
    use crate::types::candle::test_support::trending_candles;

    fn fast_config() -> ForecastConfig {
        ForecastConfig {
            model: ModelSettings {
                hidden_layers: vec![8, 4],
                epochs: 3,
                batch_size: 8,
                seed: Some(7),
                ..ModelSettings::default()
            },
            ..ForecastConfig::default()
        }
    }

    #[tokio::test]
    async fn test_series_keeps_index_order() {
        let candles = trending_candles(10);
        let pipeline = ForecastPipeline::new(&fast_config());
        let records = pipeline.forecast_series(Arc::new(candles.clone())).await.unwrap();

        assert_eq!(records.len(), candles.len());
        for (record, candle) in records.iter().zip(&candles) {
            assert_eq!(record.date, candle.open_time);
        }
        assert!(records[2..9].iter().all(|r| r.operation.is_some()));
    }

    #[tokio::test]
    async fn test_timeout_becomes_gap() {
        let config = ForecastConfig {
            model: ModelSettings {
                epochs: 1_000_000,
                ..fast_config().model
            },
            ..fast_config()
        };
        let candles = trending_candles(5);
        let pipeline = ForecastPipeline::new(&config).with_timeout(Duration::from_millis(20));
        let records = pipeline.forecast_series(Arc::new(candles.clone())).await.unwrap();

        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.operation.is_none()));
        assert_eq!(records[2].predict_close, candles[2].close);
    }

    #[tokio::test]
    async fn test_run_symbols_reports_each_series() {
        let pipeline = ForecastPipeline::new(&fast_config());
        let reports = pipeline
            .run_symbols(vec![trending_candles(6), trending_candles(8)])
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].records.len(), 6);
        assert_eq!(reports[1].records.len(), 8);
        let totals = &reports[1].backtest.totals;
        let model: rust_decimal::Decimal = reports[1].backtest.trades.iter().map(|t| t.model_profit).sum();
        assert_eq!(totals.model_profit, model);
    }
}
