use ndarray::Array2;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Fixed-width feature vector for one candle measured against its predecessor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleFeatures {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub weight_body: f64,
    pub is_bullish: f64,
    pub is_inside_bar: f64,
    pub is_outside_bar: f64,
    pub has_gap_bullish: f64,
    pub has_gap_bearish: f64,
}

impl CandleFeatures {
    pub const NUM_FEATURES: usize = 10;

    pub fn to_array(&self) -> [f64; Self::NUM_FEATURES] {
        [
            self.open,
            self.high,
            self.low,
            self.close,
            self.weight_body,
            self.is_bullish,
            self.is_inside_bar,
            self.is_outside_bar,
            self.has_gap_bullish,
            self.has_gap_bearish,
        ]
    }
}

/// Next-bar target: `[close, isBullish]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingLabel {
    pub close: f64,
    pub is_bullish: f64,
}

impl TrainingLabel {
    pub const NUM_OUTPUTS: usize = 2;

    pub fn of(candle: &Candle) -> Self {
        Self {
            close: candle.close_f64(),
            is_bullish: flag(candle.is_bullish()),
        }
    }

    pub fn to_array(&self) -> [f64; Self::NUM_OUTPUTS] {
        [self.close, self.is_bullish]
    }
}

/// Feature matrix and label matrix with matching row counts
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub features: Array2<f64>,
    pub labels: Array2<f64>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }
}

fn round2(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}

fn flag(condition: bool) -> f64 {
    if condition { 1.0 } else { 0.0 }
}

/// Feature vector of `current` against `prev`
pub fn extract_features(current: &Candle, prev: &Candle) -> CandleFeatures {
    CandleFeatures {
        open: round2(current.open),
        high: round2(current.high),
        low: round2(current.low),
        close: round2(current.close),
        weight_body: round2(current.body_weight()),
        is_bullish: flag(current.is_bullish()),
        is_inside_bar: flag(current.is_inside_of(prev)),
        is_outside_bar: flag(current.is_outside_of(prev)),
        has_gap_bullish: flag(current.gaps_up_from(prev)),
        has_gap_bearish: flag(current.gaps_down_from(prev)),
    }
}

/// Feature vector for `candles[index]`; `None` for the first candle or an
/// index past the end
pub fn features_at(candles: &[Candle], index: usize) -> Option<CandleFeatures> {
    if index == 0 || index >= candles.len() {
        return None;
    }
    Some(extract_features(&candles[index], &candles[index - 1]))
}

/// Training pairs for a window `[c0 .. ck]`.
///
/// Sample `i` pairs the features of `c_i` with the label of `c_{i+1}` for
/// `i` in `[1, k)`. The first candle has no predecessor and the last has no
/// successor, so a window needs at least three candles to yield a sample.
pub fn training_pairs(window: &[Candle]) -> Vec<(CandleFeatures, TrainingLabel)> {
    if window.len() < 3 {
        return Vec::new();
    }
    (1..window.len() - 1)
        .map(|i| {
            (
                extract_features(&window[i], &window[i - 1]),
                TrainingLabel::of(&window[i + 1]),
            )
        })
        .collect()
}

pub fn build_training_set(window: &[Candle]) -> TrainingSet {
    let pairs = training_pairs(window);
    let n = pairs.len();

    let mut features = Array2::<f64>::zeros((n, CandleFeatures::NUM_FEATURES));
    let mut labels = Array2::<f64>::zeros((n, TrainingLabel::NUM_OUTPUTS));

    for (i, (feat, label)) in pairs.iter().enumerate() {
        for (j, &val) in feat.to_array().iter().enumerate() {
            features[[i, j]] = val;
        }
        for (j, &val) in label.to_array().iter().enumerate() {
            labels[[i, j]] = val;
        }
    }

    TrainingSet { features, labels }
}
