use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{round_money, ForecastRecord, OpenPosition, Side};

/// One completed trade; appended to the ledger and never touched again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub side: Side,
    pub open_date: DateTime<Utc>,
    pub close_date: DateTime<Utc>,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub size: Decimal,
    /// Profit implied by the position engine's fills
    pub model_profit: Decimal,
    /// Same direction and size, valued at the actual market open and close
    pub market_profit: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestTotals {
    pub model_profit: Decimal,
    pub market_profit: Decimal,
}

impl BacktestTotals {
    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        Self {
            model_profit: round_money(trades.iter().map(|t| t.model_profit).sum()),
            market_profit: round_money(trades.iter().map(|t| t.market_profit).sum()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<ClosedTrade>,
    pub totals: BacktestTotals,
    /// Position still open when the input ran out; not part of the totals
    pub open_position: Option<OpenPosition>,
}

impl BacktestResult {
    pub fn winning_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.model_profit > Decimal::ZERO).count()
    }

    pub fn win_rate_pct(&self) -> Decimal {
        if self.trades.is_empty() {
            return Decimal::ZERO;
        }
        Decimal::from(self.winning_trades() as u64) / Decimal::from(self.trades.len() as u64) * dec!(100)
    }

    /// Pretty print results to console
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("                    BACKTEST RESULTS");
        println!("{}", "=".repeat(60));
        println!("Closed Trades:      {}", self.trades.len());
        println!("Winning Trades:     {} ({:.1}%)", self.winning_trades(), self.win_rate_pct());
        println!("Model Profit:       {:.2}", self.totals.model_profit);
        println!("Market Profit:      {:.2}", self.totals.market_profit);
        if let Some(open) = &self.open_position {
            println!("Open Position:      {} {} @ {:.2}", open.side, open.size, open.open_price);
        }
        println!("{}", "-".repeat(60));
        for trade in &self.trades {
            println!(
                "  {} {} -> {}  {:.2} -> {:.2}  model {:.2}  market {:.2}",
                trade.side,
                trade.open_date.format("%d/%m/%Y %H:%M"),
                trade.close_date.format("%d/%m/%Y %H:%M"),
                trade.open_price,
                trade.close_price,
                trade.model_profit,
                trade.market_profit
            );
        }
        println!("{}", "=".repeat(60));
    }
}

/// How well the series called the following bar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    pub evaluated: usize,
    pub direction_hits: usize,
    pub hit_rate_pct: f64,
    pub mean_abs_error: f64,
}

impl ForecastAccuracy {
    /// Scores each record with an operation against the record after it.
    /// Expects the unfiltered, consecutive series.
    pub fn evaluate(records: &[ForecastRecord]) -> Self {
        let mut evaluated = 0usize;
        let mut direction_hits = 0usize;
        let mut abs_error = 0.0;

        for pair in records.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            let Some(operation) = current.operation else {
                continue;
            };

            let next_bullish = next.close > next.open;
            let hit = (operation == Side::Buy) == next_bullish;
            if hit {
                direction_hits += 1;
            }
            debug!(
                "[{}] {}: predicted {:.2}, actual {:.2}, {} {}",
                current.symbol,
                next.date,
                current.predict_close,
                next.close,
                operation,
                if hit { "hit" } else { "miss" }
            );
            abs_error += (current.predict_close - next.close).abs().to_f64().unwrap_or(0.0);
            evaluated += 1;
        }

        if evaluated == 0 {
            return Self::default();
        }

        Self {
            evaluated,
            direction_hits,
            hit_rate_pct: direction_hits as f64 / evaluated as f64 * 100.0,
            mean_abs_error: abs_error / evaluated as f64,
        }
    }
}
