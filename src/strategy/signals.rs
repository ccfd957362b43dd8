use crate::indicators::{IndicatorBar, IndicatorSettings};
use crate::models::ExitReason;

/// Configuration for signal generation
#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub indicators: IndicatorSettings,
    pub rsi_min: f64,
    pub rsi_max: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub max_duration_minutes: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorSettings::default(),
            rsi_min: 40.0,
            rsi_max: 60.0,
            take_profit_pct: 1.2,
            stop_loss_pct: 0.6,
            max_duration_minutes: 45.0,
        }
    }
}

/// Take-profit and stop-loss prices fixed at entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TpSl {
    pub take_profit: f64,
    pub stop_loss: f64,
}

/// Outcome of each entry rule on the latest bars
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryCheck {
    pub price_above_ema_fast_tf: bool,
    pub price_above_ema_slow_tf: bool,
    pub ema_trend_fast_tf: bool,
    pub ema_trend_slow_tf: bool,
    pub rsi_in_range: bool,
    pub volume_above_avg: bool,
    pub rsi: f64,
}

impl EntryCheck {
    pub fn passed(&self) -> bool {
        self.price_above_ema_fast_tf
            && self.price_above_ema_slow_tf
            && self.ema_trend_fast_tf
            && self.ema_trend_slow_tf
            && self.rsi_in_range
            && self.volume_above_avg
    }
}

/// Evaluate the entry rules on the most recent bar of each timeframe
///
/// Returns `None` when either series is shorter than the minimum history or
/// any required indicator is undefined on the latest bar. Callers must read
/// `None` as "no signal".
pub fn evaluate_entry(
    fast: &[IndicatorBar],
    slow: &[IndicatorBar],
    config: &SignalConfig,
) -> Option<EntryCheck> {
    let min_history = config.indicators.min_history();
    if fast.len() < min_history || slow.len() < min_history {
        tracing::warn!(
            "Not enough data for indicators (fast {} / slow {}, need {})",
            fast.len(),
            slow.len(),
            min_history
        );
        return None;
    }

    let latest_fast = fast.last()?;
    let latest_slow = slow.last()?;

    if !latest_fast.ema_fast.is_finite() || !latest_fast.ema_slow.is_finite() {
        tracing::warn!("Invalid EMA values on fast timeframe");
        return None;
    }
    if !latest_slow.ema_fast.is_finite() || !latest_slow.ema_slow.is_finite() {
        tracing::warn!("Invalid EMA values on slow timeframe");
        return None;
    }

    let Some(rsi) = latest_fast.rsi.filter(|v| v.is_finite()) else {
        tracing::debug!("RSI undefined on latest fast bar");
        return None;
    };
    let Some(volume_avg) = latest_fast.volume_avg.filter(|v| v.is_finite()) else {
        tracing::debug!("Volume average undefined on latest fast bar");
        return None;
    };

    let check = EntryCheck {
        price_above_ema_fast_tf: latest_fast.candle.close > latest_fast.ema_slow,
        price_above_ema_slow_tf: latest_slow.candle.close > latest_slow.ema_slow,
        ema_trend_fast_tf: latest_fast.ema_fast > latest_fast.ema_slow,
        ema_trend_slow_tf: latest_slow.ema_fast > latest_slow.ema_slow,
        rsi_in_range: config.rsi_min <= rsi && rsi <= config.rsi_max,
        volume_above_avg: latest_fast.candle.volume > volume_avg,
        rsi,
    };

    tracing::debug!("Entry conditions check:");
    tracing::debug!("  Price > slow EMA (fast tf): {}", check.price_above_ema_fast_tf);
    tracing::debug!("  Price > slow EMA (slow tf): {}", check.price_above_ema_slow_tf);
    tracing::debug!("  Fast EMA > slow EMA (fast tf): {}", check.ema_trend_fast_tf);
    tracing::debug!("  Fast EMA > slow EMA (slow tf): {}", check.ema_trend_slow_tf);
    tracing::debug!(
        "  RSI in range ({}-{}): {} (RSI={:.2})",
        config.rsi_min,
        config.rsi_max,
        check.rsi_in_range,
        rsi
    );
    tracing::debug!("  Volume > average: {}", check.volume_above_avg);

    Some(check)
}

/// Fast EMA crossed below slow EMA between the previous and the latest bar
pub fn detect_bearish_cross(bars: &[IndicatorBar]) -> bool {
    let [.., previous, latest] = bars else {
        return false;
    };

    let cross_below =
        previous.ema_fast >= previous.ema_slow && latest.ema_fast < latest.ema_slow;

    if cross_below {
        tracing::warn!("Emergency exit: fast EMA crossed below slow EMA on fast timeframe");
    }

    cross_below
}

/// Compute take-profit and stop-loss prices for an entry
pub fn calculate_tp_sl(entry_price: f64, config: &SignalConfig) -> TpSl {
    TpSl {
        take_profit: entry_price * (1.0 + config.take_profit_pct / 100.0),
        stop_loss: entry_price * (1.0 - config.stop_loss_pct / 100.0),
    }
}

/// Exit rules in priority order; the first one that holds wins
pub fn evaluate_exit(
    current_price: f64,
    stop_loss: f64,
    take_profit: f64,
    duration_minutes: f64,
    fast: &[IndicatorBar],
    config: &SignalConfig,
) -> Option<ExitReason> {
    if current_price <= stop_loss {
        return Some(ExitReason::StopLoss);
    }

    if current_price >= take_profit {
        return Some(ExitReason::TakeProfit);
    }

    if duration_minutes >= config.max_duration_minutes {
        return Some(ExitReason::TimeExit);
    }

    if detect_bearish_cross(fast) {
        return Some(ExitReason::EmergencyExit);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use chrono::{Duration, TimeZone, Utc};

    fn small_config() -> SignalConfig {
        SignalConfig {
            indicators: IndicatorSettings {
                ema_fast: 2,
                ema_slow: 4,
                rsi_period: 3,
                volume_sma: 3,
            },
            ..SignalConfig::default()
        }
    }

    fn bar(i: usize, close: f64, volume: f64, ema_fast: f64, ema_slow: f64, rsi: f64) -> IndicatorBar {
        IndicatorBar {
            candle: Candle {
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap()
                    + Duration::minutes(5 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            },
            ema_fast,
            ema_slow,
            rsi: Some(rsi),
            volume_avg: Some(1000.0),
        }
    }

    /// Series whose latest bar satisfies every entry rule
    fn bullish(len: usize) -> Vec<IndicatorBar> {
        (0..len)
            .map(|i| bar(i, 110.0, 1500.0, 105.0, 100.0, 50.0))
            .collect()
    }

    #[test]
    fn test_entry_all_conditions_met() {
        let config = small_config();
        let check = evaluate_entry(&bullish(5), &bullish(5), &config).unwrap();
        assert!(check.passed());
        assert_eq!(check.rsi, 50.0);
    }

    #[test]
    fn test_entry_requires_min_history_on_both_timeframes() {
        let config = small_config();
        assert!(evaluate_entry(&bullish(3), &bullish(5), &config).is_none());
        assert!(evaluate_entry(&bullish(5), &bullish(3), &config).is_none());
    }

    #[test]
    fn test_entry_rsi_band_is_inclusive() {
        let config = small_config();

        let mut fast = bullish(5);
        fast.last_mut().unwrap().rsi = Some(60.0);
        assert!(evaluate_entry(&fast, &bullish(5), &config).unwrap().passed());

        fast.last_mut().unwrap().rsi = Some(60.01);
        let check = evaluate_entry(&fast, &bullish(5), &config).unwrap();
        assert!(!check.rsi_in_range);
        assert!(!check.passed());
    }

    #[test]
    fn test_entry_undefined_rsi_is_no_signal() {
        let config = small_config();
        let mut fast = bullish(5);
        fast.last_mut().unwrap().rsi = None;
        assert!(evaluate_entry(&fast, &bullish(5), &config).is_none());
    }

    #[test]
    fn test_entry_rejects_slow_timeframe_downtrend() {
        let config = small_config();
        let mut slow = bullish(5);
        let last = slow.last_mut().unwrap();
        last.ema_fast = 95.0;

        let check = evaluate_entry(&bullish(5), &slow, &config).unwrap();
        assert!(!check.ema_trend_slow_tf);
        assert!(!check.passed());
    }

    #[test]
    fn test_entry_requires_volume_above_average() {
        let config = small_config();
        let mut fast = bullish(5);
        fast.last_mut().unwrap().candle.volume = 1000.0; // equal is not above

        let check = evaluate_entry(&fast, &bullish(5), &config).unwrap();
        assert!(!check.volume_above_avg);
    }

    #[test]
    fn test_bearish_cross_detection() {
        let bars = vec![
            bar(0, 100.0, 1000.0, 101.0, 100.0, 50.0),
            bar(1, 100.0, 1000.0, 100.0, 100.0, 50.0),
            bar(2, 99.0, 1000.0, 99.5, 99.8, 50.0),
        ];
        assert!(detect_bearish_cross(&bars));

        // Already below on the previous bar: no fresh cross
        let bars = vec![
            bar(0, 99.0, 1000.0, 99.0, 100.0, 50.0),
            bar(1, 98.0, 1000.0, 98.5, 100.0, 50.0),
        ];
        assert!(!detect_bearish_cross(&bars));

        assert!(!detect_bearish_cross(&bars[..1]));
    }

    #[test]
    fn test_calculate_tp_sl() {
        let tp_sl = calculate_tp_sl(50000.0, &SignalConfig::default());
        assert!((tp_sl.stop_loss - 49700.0).abs() < 1e-6);
        assert!((tp_sl.take_profit - 50600.0).abs() < 1e-6);
    }

    #[test]
    fn test_exit_priority_stop_loss_over_time_exit() {
        let config = SignalConfig::default();
        let reason = evaluate_exit(99.0, 99.4, 101.2, 120.0, &[], &config);
        assert_eq!(reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_exit_take_profit_and_time() {
        let config = SignalConfig::default();
        assert_eq!(
            evaluate_exit(101.2, 99.4, 101.2, 0.0, &[], &config),
            Some(ExitReason::TakeProfit)
        );
        assert_eq!(
            evaluate_exit(100.0, 99.4, 101.2, 45.0, &[], &config),
            Some(ExitReason::TimeExit)
        );
        assert_eq!(evaluate_exit(100.0, 99.4, 101.2, 44.9, &[], &config), None);
    }

    #[test]
    fn test_exit_emergency_cross_is_last() {
        let config = SignalConfig::default();
        let bars = vec![
            bar(0, 100.0, 1000.0, 100.5, 100.0, 50.0),
            bar(1, 100.0, 1000.0, 99.9, 100.0, 50.0),
        ];
        assert_eq!(
            evaluate_exit(100.0, 99.4, 101.2, 10.0, &bars, &config),
            Some(ExitReason::EmergencyExit)
        );
        assert_eq!(
            evaluate_exit(100.0, 99.4, 101.2, 50.0, &bars, &config),
            Some(ExitReason::TimeExit)
        );
    }
}
