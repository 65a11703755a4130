use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub model: ModelSettings,
    pub filter: FilterSettings,
    pub backtest: BacktestSettings,
    pub runtime: RuntimeSettings,
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Model validation
        if self.model.hidden_layers.is_empty() {
            errors.push("hidden_layers must name at least one layer".to_string());
        }
        if self.model.hidden_layers.iter().any(|&w| w == 0) {
            errors.push("hidden layer widths must be > 0".to_string());
        }
        if self.model.epochs == 0 {
            errors.push("epochs must be > 0".to_string());
        }
        if self.model.batch_size == 0 {
            errors.push("batch_size must be > 0".to_string());
        }
        if !(self.model.learning_rate > 0.0 && self.model.learning_rate.is_finite()) {
            errors.push("learning_rate must be a positive number".to_string());
        }
        if !(0.0..=1.0).contains(&self.model.bullish_threshold) {
            errors.push("bullish_threshold must be between 0 and 1".to_string());
        }

        // Filter validation
        if !(self.filter.z_score_threshold > 0.0 && self.filter.z_score_threshold.is_finite()) {
            errors.push("z_score_threshold must be a positive number".to_string());
        }

        // Backtest validation
        if self.backtest.lot_size <= Decimal::ZERO {
            errors.push("lot_size must be > 0".to_string());
        }
        if self.backtest.initial_balance < Decimal::ZERO {
            errors.push("initial_balance must be >= 0".to_string());
        }

        if self.runtime.training_timeout_secs == 0 {
            errors.push("training_timeout_secs must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Regressor architecture and training protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub shuffle: bool,
    /// Fixed seed for weight init and shuffling; `None` draws from entropy
    pub seed: Option<u64>,
    /// BUY iff the bullish score is at or above this value
    pub bullish_threshold: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 128, 32],
            learning_rate: 0.001,
            epochs: 100,
            batch_size: 32,
            shuffle: true,
            seed: None,
            bullish_threshold: 0.5,
        }
    }
}

/// Which price the z-score filter looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Close,
    PredictClose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub z_score_threshold: f64,
    pub field: FilterField,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            z_score_threshold: 2.0,
            field: FilterField::Close,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    pub lot_size: Decimal,
    pub initial_balance: Decimal,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            lot_size: dec!(1),
            initial_balance: dec!(1000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub training_timeout_secs: u64,
}

impl RuntimeSettings {
    pub fn training_timeout(&self) -> Duration {
        Duration::from_secs(self.training_timeout_secs)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            training_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_protocol() {
        let config = ForecastConfig::default();
        assert_eq!(config.model.hidden_layers, vec![64, 128, 32]);
        assert_eq!(config.model.epochs, 100);
        assert_eq!(config.model.bullish_threshold, 0.5);
        assert_eq!(config.filter.z_score_threshold, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let invalid = ForecastConfig {
            model: ModelSettings {
                epochs: 0,
                hidden_layers: vec![64, 0],
                ..ModelSettings::default()
            },
            backtest: BacktestSettings {
                lot_size: Decimal::ZERO,
                ..BacktestSettings::default()
            },
            ..ForecastConfig::default()
        };

        let errors = invalid.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
