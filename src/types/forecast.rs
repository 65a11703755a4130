use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Candle, Side};

/// Output of a single `forecast_next` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub predict_close: Decimal,
    /// `None` on the pass-through edges or after a failed fit
    pub operation: Option<Side>,
    pub bullish_score: Option<f64>,
}

impl Forecast {
    pub fn pass_through(candle: &Candle) -> Self {
        Self {
            predict_close: candle.close,
            operation: None,
            bullish_score: None,
        }
    }
}

/// One row of the forecast series, keyed by `(symbol, date)` for external stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub symbol: String,
    pub date: DateTime<Utc>,
    pub open: Decimal,
    pub close: Decimal,
    pub predict_close: Decimal,
    pub operation: Option<Side>,
}

impl ForecastRecord {
    pub fn from_forecast(candle: &Candle, forecast: Forecast) -> Self {
        Self {
            symbol: candle.symbol.clone(),
            date: candle.open_time,
            open: candle.open,
            close: candle.close,
            predict_close: forecast.predict_close,
            operation: forecast.operation,
        }
    }

    /// Gap record for an index whose forecast could not be produced
    pub fn gap(candle: &Candle) -> Self {
        Self::from_forecast(candle, Forecast::pass_through(candle))
    }

    pub fn has_operation(&self) -> bool {
        self.operation.is_some()
    }
}
