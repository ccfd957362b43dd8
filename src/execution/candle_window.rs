use std::collections::VecDeque;

use crate::error::BotError;
use crate::models::Candle;

/// Extra bars kept beyond the longest indicator lookback
pub const HISTORY_MARGIN: usize = 50;

/// Bounded, ordered candle series for one timeframe
///
/// Timestamps are strictly ascending; the oldest bar is evicted once the
/// window is full.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    candles: VecDeque<Candle>,
    capacity: usize,
}

/// Window size for a configured kline limit and indicator lookback
pub fn window_capacity(kline_limit: usize, min_history: usize) -> usize {
    kline_limit.max(min_history + HISTORY_MARGIN)
}

/// Reject unordered, duplicated or non-finite bars
pub fn validate_series(candles: &[Candle]) -> Result<(), BotError> {
    for candle in candles {
        let prices = [candle.open, candle.high, candle.low, candle.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(BotError::InvalidData(format!(
                "non-positive price in bar at {}",
                candle.timestamp
            )));
        }
        if !candle.volume.is_finite() || candle.volume < 0.0 {
            return Err(BotError::InvalidData(format!(
                "invalid volume {} at {}",
                candle.volume, candle.timestamp
            )));
        }
    }

    for pair in candles.windows(2) {
        if pair[1].timestamp == pair[0].timestamp {
            return Err(BotError::InvalidData(format!(
                "duplicate bar at {}",
                pair[1].timestamp
            )));
        }
        if pair[1].timestamp < pair[0].timestamp {
            return Err(BotError::InvalidData(format!(
                "bars out of order: {} after {}",
                pair[1].timestamp, pair[0].timestamp
            )));
        }
    }

    Ok(())
}

impl CandleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Replace the contents with a freshly fetched series.
    ///
    /// The series is validated first; on error the window is left unchanged.
    pub fn replace(&mut self, candles: Vec<Candle>) -> Result<(), BotError> {
        validate_series(&candles)?;
        self.store(candles);
        Ok(())
    }

    /// Keep the most recent bars of a series the caller already validated
    pub(super) fn store(&mut self, candles: Vec<Candle>) {
        let skip = candles.len().saturating_sub(self.capacity);
        self.candles.clear();
        self.candles.extend(candles.into_iter().skip(skip));
    }

    pub fn candles(&mut self) -> &[Candle] {
        self.candles.make_contiguous()
    }

    pub(crate) fn len(&self) -> usize {
        self.candles.len()
    }
}
