// Technical indicators module
// EMA, RSI and rolling volume average computed as full per-bar series

pub mod frame;
pub mod moving_average;
pub mod rsi;
pub mod volume;

pub use frame::{IndicatorBar, IndicatorSettings};
pub use moving_average::{ema_series, sma_series};
pub use rsi::rsi_series;
pub use volume::volume_avg_series;
