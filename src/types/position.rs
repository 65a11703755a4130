use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::Side;

/// Monetary figures are rounded at the point of computation
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Signed profit of holding `size` from `entry` to `exit` in direction `side`
pub fn directional_pnl(side: Side, entry: Decimal, exit: Decimal, size: Decimal) -> Decimal {
    let price_diff = exit - entry;
    let pnl = match side {
        Side::Buy => price_diff * size,
        Side::Sell => -price_diff * size,
    };
    round_money(pnl)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Close,
}

/// A directional event fed into the position engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSignal {
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub open_price: Decimal,
    pub size: Decimal,
    pub total_operation: Decimal,
    pub open_date: DateTime<Utc>,
}

impl OpenPosition {
    fn from_signal(signal: &PositionSignal) -> Self {
        Self {
            side: signal.side,
            open_price: signal.price,
            size: signal.size,
            total_operation: round_money(signal.price * signal.size),
            open_date: signal.date,
        }
    }

    pub fn calculate_pnl(&self, price: Decimal) -> Decimal {
        directional_pnl(self.side, self.open_price, price, self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub side: Side,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub size: Decimal,
    pub total_operation: Decimal,
    pub open_date: DateTime<Utc>,
    pub close_date: DateTime<Utc>,
    pub profit: Decimal,
}

/// Position lifecycle. Every transition returns a fresh value; nothing is
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Position {
    #[default]
    Flat,
    Open(OpenPosition),
    Closed(ClosedPosition),
}

/// What a single transition reported
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Opened,
    /// Same-direction signal on an open position. The floating profit is
    /// reported only, never written back into the position.
    Held { floating_profit: Decimal },
    Closed(ClosedPosition),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub position: Position,
    pub event: PositionEvent,
}

impl Position {
    pub fn status(&self) -> Option<PositionStatus> {
        match self {
            Position::Flat => None,
            Position::Open(_) => Some(PositionStatus::Open),
            Position::Closed(_) => Some(PositionStatus::Close),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Position::Open(_))
    }

    pub fn as_open(&self) -> Option<&OpenPosition> {
        match self {
            Position::Open(open) => Some(open),
            _ => None,
        }
    }

    /// Pure transition `(prior, signal) -> next`.
    ///
    /// Flat or closed positions open on any signal. An open position holds on a
    /// same-side signal and closes on the opposite side; the closing signal
    /// does not open a new position.
    pub fn apply(&self, signal: &PositionSignal) -> Transition {
        match self {
            Position::Flat | Position::Closed(_) => Transition {
                position: Position::Open(OpenPosition::from_signal(signal)),
                event: PositionEvent::Opened,
            },
            Position::Open(open) if open.side == signal.side => Transition {
                position: self.clone(),
                event: PositionEvent::Held {
                    floating_profit: open.calculate_pnl(signal.price),
                },
            },
            Position::Open(open) => {
                let closed = ClosedPosition {
                    side: open.side,
                    open_price: open.open_price,
                    close_price: signal.price,
                    size: open.size,
                    total_operation: open.total_operation,
                    open_date: open.open_date,
                    close_date: signal.date,
                    profit: open.calculate_pnl(signal.price),
                };
                Transition {
                    position: Position::Closed(closed.clone()),
                    event: PositionEvent::Closed(closed),
                }
            }
        }
    }
}

/// Carries the single position of one backtest run
#[derive(Debug, Clone, Default)]
pub struct PositionEngine {
    position: Position,
}

impl PositionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Feed one signal; the held position is replaced wholesale
    pub fn on_signal(&mut self, signal: &PositionSignal) -> PositionEvent {
        let Transition { position, event } = self.position.apply(signal);
        self.position = position;
        event
    }
}
