use super::moving_average::sma_series;
use crate::models::Candle;

/// Rolling mean of bar volume, `None` for the first `period - 1` bars
pub fn volume_avg_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    sma_series(&volumes, period)
}
