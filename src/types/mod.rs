pub mod trading;
pub mod position;
pub mod candle;
pub mod forecast;

pub use trading::*;
pub use position::*;
pub use candle::*;
pub use forecast::*;
