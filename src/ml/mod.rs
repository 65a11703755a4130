pub mod features;
pub mod network;
pub mod model;
pub mod outliers;

pub use features::{CandleFeatures, TrainingLabel, TrainingSet};
pub use model::Predictor;
pub use network::NeuralRegressor;
pub use outliers::{OutlierFilter, ZScoreBounds};
