use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::types::{is_chronological, Candle, ForecastRecord, Side};

/// Where candle history comes from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn load_candles(&self) -> Result<Vec<Candle>>;
}

/// A JSON array of candles on disk
#[derive(Debug, Clone)]
pub struct JsonCandleFile {
    path: PathBuf,
}

impl JsonCandleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandleSource for JsonCandleFile {
    async fn load_candles(&self) -> Result<Vec<Candle>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read candles from {}", self.path.display()))?;
        let candles = parse_candles(&raw)?;
        info!("Loaded {} candles from {}", candles.len(), self.path.display());
        Ok(candles)
    }
}

/// Out-of-order input is sorted by open time
pub fn parse_candles(raw: &str) -> Result<Vec<Candle>> {
    let mut candles: Vec<Candle> = serde_json::from_str(raw).context("Invalid candle JSON")?;
    if !is_chronological(&candles) {
        warn!("Candles are not in chronological order, sorting by open time");
        candles.sort_by_key(|c| c.open_time);
    }
    Ok(candles)
}

/// Persisted record with the operation still as free text
#[derive(Debug, Deserialize)]
struct RawForecastRecord {
    symbol: String,
    date: DateTime<Utc>,
    open: Decimal,
    close: Decimal,
    predict_close: Decimal,
    #[serde(default)]
    operation: Option<String>,
}

impl RawForecastRecord {
    fn into_record(self) -> crate::error::Result<ForecastRecord> {
        let operation = match self.operation.as_deref() {
            None | Some("") => None,
            Some(op) => Some(op.parse::<Side>()?),
        };
        Ok(ForecastRecord {
            symbol: self.symbol,
            date: self.date,
            open: self.open,
            close: self.close,
            predict_close: self.predict_close,
            operation,
        })
    }
}

/// Anything but BUY, SELL or an absent operation rejects the whole series
pub fn parse_forecast_series(raw: &str) -> Result<Vec<ForecastRecord>> {
    let rows: Vec<RawForecastRecord> = serde_json::from_str(raw).context("Invalid forecast JSON")?;
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| row.into_record().with_context(|| format!("Record {}", i)))
        .collect::<Result<Vec<_>>>()?;
    Ok(records)
}

pub async fn load_forecast_series(path: &Path) -> Result<Vec<ForecastRecord>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read forecasts from {}", path.display()))?;
    let records = parse_forecast_series(&raw)?;
    info!("Loaded {} forecast records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use crate::types::candle::test_support::candles_from_oc;

    const SERIES: &str = r#"[
        {"symbol":"BTCUSDT","date":"2024-01-01T00:00:00Z","open":"10","close":"11","predict_close":"11","operation":null},
        {"symbol":"BTCUSDT","date":"2024-01-01T01:00:00Z","open":"11","close":"12","predict_close":"12.5","operation":"BUY"},
        {"symbol":"BTCUSDT","date":"2024-01-01T02:00:00Z","open":"12","close":"11","predict_close":"10.5","operation":"sell"}
    ]"#;

    #[test]
    fn test_parse_forecast_series() {
        let records = parse_forecast_series(SERIES).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].operation, None);
        assert_eq!(records[1].operation, Some(Side::Buy));
        assert_eq!(records[2].operation, Some(Side::Sell));
    }

    #[test]
    fn test_unknown_operation_is_malformed() {
        let raw = SERIES.replace("\"BUY\"", "\"HOLD\"");
        let err = parse_forecast_series(&raw).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ForecastError>(),
            Some(ForecastError::MalformedSignal(op)) if op == "HOLD"
        ));
    }

    #[test]
    fn test_candles_are_sorted() {
        let mut candles = candles_from_oc(&[(10, 11), (11, 12), (12, 13)]);
        candles.swap(0, 2);
        let raw = serde_json::to_string(&candles).unwrap();

        let parsed = parse_candles(&raw).unwrap();
        assert!(is_chronological(&parsed));
        assert_eq!(parsed[0].open, Decimal::from(10));
    }

    #[tokio::test]
    async fn test_json_candle_file() {
        let candles = candles_from_oc(&[(10, 11), (11, 12)]);
        let path = std::env::temp_dir().join(format!("candles-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&candles).unwrap()).unwrap();

        let loaded = JsonCandleFile::new(&path).load_candles().await.unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, candles);
    }

    #[tokio::test]
    async fn test_mock_source() {
        let mut source = MockCandleSource::new();
        source
            .expect_load_candles()
            .times(1)
            .returning(|| Ok(candles_from_oc(&[(1, 2)])));

        let candles = source.load_candles().await.unwrap();
        assert_eq!(candles.len(), 1);
    }
}
