use thiserror::Error;

/// Failures surfaced by the forecasting core.
///
/// Short history and zero-variance series are not errors: the predictor
/// passes the close through and the outlier filter becomes a no-op.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Fit or inference failed for one index; the series carries on with a gap
    #[error("training failed at index {index}: {reason}")]
    TrainingFailure { index: usize, reason: String },

    /// Only BUY and SELL may reach the position engine
    #[error("malformed signal type: {0:?}")]
    MalformedSignal(String),

    #[error("target index {index} out of range for {len} candles")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot fit a model on an empty training set")]
    EmptyTrainingSet,

    #[error("invalid configuration: {}", .0.join(", "))]
    InvalidConfig(Vec<String>),
}

impl ForecastError {
    pub fn training(index: usize, reason: impl Into<String>) -> Self {
        ForecastError::TrainingFailure {
            index,
            reason: reason.into(),
        }
    }

    /// Recoverable errors leave a gap in the series instead of aborting it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::TrainingFailure { .. } | ForecastError::EmptyTrainingSet
        )
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
