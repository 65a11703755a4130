pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod ml;
pub mod types;

pub use error::{ForecastError, Result};
