pub mod backtest;
pub mod balance;
pub mod pipeline;
pub mod results;

pub use backtest::*;
pub use balance::*;
pub use pipeline::*;
pub use results::*;
