pub mod regime;
pub mod timeframe;

pub use regime::{classify, RegimeInputs, RegimeLabel, RegimeSample};
pub use timeframe::Timeframe;
