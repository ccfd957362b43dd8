use serde::{Deserialize, Serialize};

use super::{ema_series, rsi_series, volume_avg_series};
use crate::models::Candle;

/// Indicator periods applied to every timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub volume_sma: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ema_fast: 50,
            ema_slow: 200,
            rsi_period: 14,
            volume_sma: 20,
        }
    }
}

/// A candle with its derived indicator values
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorBar {
    pub candle: Candle,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: Option<f64>,
    pub volume_avg: Option<f64>,
}

impl IndicatorSettings {
    /// Bars required before any decision may be taken on a series
    pub fn min_history(&self) -> usize {
        self.ema_slow.max(self.rsi_period).max(self.volume_sma)
    }

    /// Compute all indicators over an ordered candle series
    pub fn apply(&self, candles: &[Candle]) -> Vec<IndicatorBar> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let ema_fast = ema_series(&closes, self.ema_fast);
        let ema_slow = ema_series(&closes, self.ema_slow);
        let rsi = rsi_series(&closes, self.rsi_period);
        let volume_avg = volume_avg_series(candles, self.volume_sma);

        candles
            .iter()
            .enumerate()
            .map(|(i, candle)| IndicatorBar {
                candle: candle.clone(),
                ema_fast: ema_fast[i],
                ema_slow: ema_slow[i],
                rsi: rsi[i],
                volume_avg: volume_avg[i],
            })
            .collect()
    }
}
