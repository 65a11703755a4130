pub mod runtime;
pub mod loader;

pub use runtime::*;
