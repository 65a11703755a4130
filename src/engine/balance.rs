use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{round_money, ForecastRecord, Side};

/// Price-tagged operation for the all-in balance replay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceSignal {
    pub operation: Side,
    pub price: Decimal,
}

impl BalanceSignal {
    /// Operations from a forecast series, priced at the actual close
    pub fn from_records(records: &[ForecastRecord]) -> Vec<Self> {
        records
            .iter()
            .filter_map(|r| {
                r.operation.map(|operation| Self {
                    operation,
                    price: r.close,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub conversions: usize,
}

impl BalanceReport {
    pub fn return_pct(&self) -> Decimal {
        if self.initial_balance.is_zero() {
            return Decimal::ZERO;
        }
        round_money((self.final_balance - self.initial_balance) / self.initial_balance * Decimal::ONE_HUNDRED)
    }
}

/// Moves the whole balance in and out of the asset.
///
/// BUY converts all cash to units, SELL converts all units back; anything
/// else is ignored. Units still held at the end are marked at the last
/// signal's price.
pub fn simulate_balance(initial_balance: Decimal, signals: &[BalanceSignal]) -> BalanceReport {
    let mut cash = initial_balance;
    let mut units = Decimal::ZERO;
    let mut conversions = 0usize;

    for signal in signals {
        if signal.price <= Decimal::ZERO {
            continue;
        }
        match signal.operation {
            Side::Buy if cash > Decimal::ZERO => {
                units = cash / signal.price;
                cash = Decimal::ZERO;
                conversions += 1;
            }
            Side::Sell if units > Decimal::ZERO => {
                cash = units * signal.price;
                units = Decimal::ZERO;
                conversions += 1;
            }
            _ => {}
        }
    }

    let marked = match signals.last() {
        Some(last) if units > Decimal::ZERO => units * last.price,
        _ => Decimal::ZERO,
    };
    let final_balance = round_money(cash + marked);
    debug!(
        "Balance replay: {} signals, {} conversions, {} -> {}",
        signals.len(), conversions, initial_balance, final_balance
    );

    BalanceReport {
        initial_balance,
        final_balance,
        conversions,
    }
}
