use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::BacktestSettings;
use crate::types::{directional_pnl, ForecastRecord, PositionEngine, PositionEvent, PositionSignal};

use super::results::{BacktestResult, BacktestTotals, ClosedTrade};

/// Replays a forecast series through the position engine
#[derive(Debug, Clone)]
pub struct Backtester {
    lot_size: Decimal,
}

impl Backtester {
    pub fn new(settings: &BacktestSettings) -> Self {
        Self {
            lot_size: settings.lot_size,
        }
    }

    /// Records without an operation are skipped.
    ///
    /// Fills out of a flat or closed state use the record's actual open; an
    /// open position is valued and closed at the forecast close.
    pub fn run(&self, records: &[ForecastRecord]) -> BacktestResult {
        let mut engine = PositionEngine::new();
        let mut trades = Vec::new();
        let mut market_entry: Option<Decimal> = None;

        for record in records {
            let Some(side) = record.operation else {
                continue;
            };

            let price = if engine.position().is_open() {
                record.predict_close
            } else {
                record.open
            };
            let signal = PositionSignal {
                side,
                price,
                size: self.lot_size,
                date: record.date,
            };

            match engine.on_signal(&signal) {
                PositionEvent::Opened => {
                    debug!("[{}] Opened {} @ {:.2} on {}", record.symbol, side, price, record.date);
                    market_entry = Some(record.open);
                }
                PositionEvent::Held { floating_profit } => {
                    debug!("[{}] Holding, floating profit {:.2}", record.symbol, floating_profit);
                }
                PositionEvent::Closed(closed) => {
                    let entry = market_entry.take().unwrap_or(closed.open_price);
                    let market_profit = directional_pnl(closed.side, entry, record.close, closed.size);
                    debug!(
                        "[{}] Closed {} @ {:.2}: model {:.2}, market {:.2}",
                        record.symbol, closed.side, closed.close_price, closed.profit, market_profit
                    );

                    trades.push(ClosedTrade {
                        side: closed.side,
                        open_date: closed.open_date,
                        close_date: closed.close_date,
                        open_price: closed.open_price,
                        close_price: closed.close_price,
                        size: closed.size,
                        model_profit: closed.profit,
                        market_profit,
                    });
                }
            }
        }

        let totals = BacktestTotals::from_trades(&trades);
        info!(
            "Backtest complete: {} trades, model profit {:.2}, market profit {:.2}",
            trades.len(), totals.model_profit, totals.market_profit
        );

        BacktestResult {
            trades,
            totals,
            open_position: engine.position().as_open().cloned(),
        }
    }
}

pub fn run_backtest(records: &[ForecastRecord], settings: &BacktestSettings) -> BacktestResult {
    Backtester::new(settings).run(records)
}
