// Trading strategy module
pub mod signals;
pub mod trend;

use crate::indicators::IndicatorBar;
use crate::models::{Candle, ExitReason, Position};

pub use signals::{EntryCheck, SignalConfig, TpSl};
pub use trend::TrendStrategy;

/// Base trait for multi-timeframe strategies
pub trait Strategy: Send + Sync {
    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required on each timeframe before deciding
    fn min_candles_required(&self) -> usize;

    /// Derive indicator values for one timeframe
    fn add_indicators(&self, candles: &[Candle]) -> Vec<IndicatorBar>;

    /// Whether a long entry should be taken now
    fn check_entry(&self, fast: &[IndicatorBar], slow: &[IndicatorBar]) -> bool;

    /// Take-profit and stop-loss prices for a new entry
    fn calculate_tp_sl(&self, entry_price: f64) -> TpSl;

    /// Exit reason for an open position, if any rule fires
    fn should_exit(
        &self,
        position: &Position,
        current_price: f64,
        duration_minutes: f64,
        fast: &[IndicatorBar],
    ) -> Option<ExitReason>;
}
