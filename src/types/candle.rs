use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TimeFrame;

/// One OHLCV bar. Immutable once ingested; series are ordered by `open_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn body_size(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Body as a fraction of the high-low range; zero for a flat bar
    pub fn body_weight(&self) -> Decimal {
        let range = self.range();
        if range.is_zero() {
            return Decimal::ZERO;
        }
        self.body_size() / range
    }

    pub fn is_inside_of(&self, prev: &Candle) -> bool {
        self.high < prev.high && self.low > prev.low
    }

    /// Higher high with a low under the previous close
    pub fn is_outside_of(&self, prev: &Candle) -> bool {
        self.high > prev.high && self.low < prev.close
    }

    pub fn gaps_up_from(&self, prev: &Candle) -> bool {
        self.open > prev.close
    }

    pub fn gaps_down_from(&self, prev: &Candle) -> bool {
        self.open < prev.close
    }

    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }
}

/// Symbol-level checks on a materialized series
pub fn is_chronological(candles: &[Candle]) -> bool {
    candles.windows(2).all(|w| w[0].open_time < w[1].open_time)
}
