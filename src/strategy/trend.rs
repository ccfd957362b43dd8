use super::{
    signals::{calculate_tp_sl, evaluate_entry, evaluate_exit, SignalConfig, TpSl},
    Strategy,
};
use crate::indicators::IndicatorBar;
use crate::models::{Candle, ExitReason, Position};

/// Multi-timeframe trend-following strategy (long only)
///
/// Entry when, on the latest bar:
/// - price is above the slow EMA on both timeframes
/// - fast EMA is above slow EMA on both timeframes
/// - fast-timeframe RSI is inside the neutral band
/// - fast-timeframe volume is above its rolling average
///
/// Exit on stop loss, take profit, max holding time, or a bearish EMA cross
/// on the fast timeframe, in that order.
#[derive(Debug, Clone, Default)]
pub struct TrendStrategy {
    config: SignalConfig,
}

impl TrendStrategy {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }
}

impl Strategy for TrendStrategy {
    fn name(&self) -> &str {
        "TrendStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.config.indicators.min_history()
    }

    fn add_indicators(&self, candles: &[Candle]) -> Vec<IndicatorBar> {
        self.config.indicators.apply(candles)
    }

    fn check_entry(&self, fast: &[IndicatorBar], slow: &[IndicatorBar]) -> bool {
        evaluate_entry(fast, slow, &self.config).is_some_and(|check| check.passed())
    }

    fn calculate_tp_sl(&self, entry_price: f64) -> TpSl {
        calculate_tp_sl(entry_price, &self.config)
    }

    fn should_exit(
        &self,
        position: &Position,
        current_price: f64,
        duration_minutes: f64,
        fast: &[IndicatorBar],
    ) -> Option<ExitReason> {
        evaluate_exit(
            current_price,
            position.stop_loss,
            position.take_profit,
            duration_minutes,
            fast,
            &self.config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorSettings;
    use chrono::{Duration, TimeZone, Utc};

    fn config() -> SignalConfig {
        SignalConfig {
            indicators: IndicatorSettings {
                ema_fast: 5,
                ema_slow: 10,
                rsi_period: 5,
                volume_sma: 5,
            },
            ..SignalConfig::default()
        }
    }

    /// Zig-zag uptrend: two steps up, one step down, so RSI stays defined
    fn create_test_candles(len: usize, last_volume: f64) -> Vec<Candle> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut price = 100.0;
        (0..len)
            .map(|i| {
                price += if i % 3 == 2 { -0.5 } else { 0.5 };
                Candle {
                    timestamp: start + Duration::minutes(5 * i as i64),
                    open: price,
                    high: price + 0.2,
                    low: price - 0.2,
                    close: price,
                    volume: if i + 1 == len { last_volume } else { 1000.0 },
                }
            })
            .collect()
    }

    fn position(entry_price: f64) -> Position {
        let strategy = TrendStrategy::new(config());
        let tp_sl = strategy.calculate_tp_sl(entry_price);
        Position {
            symbol: "BTCUSDT".to_string(),
            entry_price,
            quantity: 1.0,
            entry_time: Utc::now(),
            stop_loss: tp_sl.stop_loss,
            take_profit: tp_sl.take_profit,
        }
    }

    #[test]
    fn test_strategy_name() {
        let strategy = TrendStrategy::default();
        assert_eq!(strategy.name(), "TrendStrategy");
    }

    #[test]
    fn test_min_candles_required() {
        assert_eq!(TrendStrategy::default().min_candles_required(), 200);
        assert_eq!(TrendStrategy::new(config()).min_candles_required(), 10);
    }

    #[test]
    fn test_uptrend_with_volume_spike_enters() {
        let strategy = TrendStrategy::new(config());
        let candles = create_test_candles(40, 5000.0);
        let bars = strategy.add_indicators(&candles);

        // Band wide open so only trend and volume decide
        let strategy = TrendStrategy::new(SignalConfig {
            rsi_min: 0.0,
            rsi_max: 100.0,
            ..config()
        });
        assert!(strategy.check_entry(&bars, &bars));
    }

    #[test]
    fn test_no_entry_without_volume_confirmation() {
        let strategy = TrendStrategy::new(SignalConfig {
            rsi_min: 0.0,
            rsi_max: 100.0,
            ..config()
        });
        let bars = strategy.add_indicators(&create_test_candles(40, 1000.0));
        assert!(!strategy.check_entry(&bars, &bars));
    }

    #[test]
    fn test_insufficient_history_never_enters() {
        let strategy = TrendStrategy::new(SignalConfig {
            rsi_min: 0.0,
            rsi_max: 100.0,
            ..config()
        });
        let bars = strategy.add_indicators(&create_test_candles(9, 5000.0));
        assert!(!strategy.check_entry(&bars, &bars));
    }

    #[test]
    fn test_downtrend_never_enters() {
        let strategy = TrendStrategy::new(SignalConfig {
            rsi_min: 0.0,
            rsi_max: 100.0,
            ..config()
        });
        let mut candles = create_test_candles(40, 5000.0);
        candles.reverse();
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for (i, c) in candles.iter_mut().enumerate() {
            c.timestamp = start + Duration::minutes(5 * i as i64);
        }
        let bars = strategy.add_indicators(&candles);
        assert!(!strategy.check_entry(&bars, &bars));
    }

    #[test]
    fn test_should_exit_uses_position_levels() {
        let strategy = TrendStrategy::new(config());
        let position = position(100.0);

        assert_eq!(
            strategy.should_exit(&position, 99.0, 1.0, &[]),
            Some(ExitReason::StopLoss)
        );
        assert_eq!(
            strategy.should_exit(&position, 101.5, 1.0, &[]),
            Some(ExitReason::TakeProfit)
        );
        assert_eq!(
            strategy.should_exit(&position, 100.1, 46.0, &[]),
            Some(ExitReason::TimeExit)
        );
        assert_eq!(strategy.should_exit(&position, 100.1, 1.0, &[]), None);
    }
}
