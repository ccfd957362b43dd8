use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use spotbot::config::BotConfig;
use spotbot::execution::{BotSettings, ExecutionMode, TickOutcome, TradingBot};
use spotbot::persistence::CsvTradeLog;
use spotbot::{Candle, ClientError, ExchangeConstraints, ExitReason, Fill, MarketClient, Side};
use spotbot::SymbolFilters;
use std::sync::{Arc, Mutex};

const CONFIG: &str = r#"
trading:
  symbol: BTCUSDT
  dry_run: true
strategy:
  timeframes:
    fast: 5m
    slow: 15m
  indicators:
    ema_fast: 5
    ema_slow: 10
    rsi_period: 5
    volume_sma: 5
  entry:
    rsi_min: 0
    rsi_max: 100
  exit:
    take_profit_pct: 1.2
    stop_loss_pct: 5.0
    max_duration_minutes: 45
risk:
  max_risk_per_trade_pct: 1.0
  max_open_positions: 1
bot:
  kline_limit: 40
"#;

/// Exchange double with a movable ticker
struct MockExchange {
    klines: Vec<Candle>,
    price: Mutex<f64>,
    balance: f64,
}

#[async_trait]
impl MarketClient for MockExchange {
    async fn get_klines(&self, _: &str, _: &str, limit: usize) -> Result<Vec<Candle>, ClientError> {
        let skip = self.klines.len().saturating_sub(limit);
        Ok(self.klines[skip..].to_vec())
    }

    async fn get_current_price(&self, _: &str) -> Result<f64, ClientError> {
        Ok(*self.price.lock().unwrap())
    }

    async fn get_balance(&self, _: &str) -> Result<f64, ClientError> {
        Ok(self.balance)
    }

    async fn get_symbol_constraints(&self, _: &str) -> Result<SymbolFilters, ClientError> {
        Ok(SymbolFilters {
            min_notional: Some(10.0),
            step_size: Some(0.001),
        })
    }

    async fn submit_market_order(
        &self,
        _: &str,
        _: Side,
        quantity: f64,
    ) -> Result<Fill, ClientError> {
        Ok(Fill {
            price: *self.price.lock().unwrap(),
            quantity,
        })
    }
}

fn uptrend() -> Vec<Candle> {
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut price = 100.0;
    (0..40)
        .map(|i| {
            price += if i % 3 == 2 { -0.5 } else { 0.5 };
            Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open: price,
                high: price + 0.2,
                low: price - 0.2,
                close: price,
                volume: if i == 39 { 5000.0 } else { 1000.0 },
            }
        })
        .collect()
}

#[tokio::test]
async fn test_full_cycle_entry_then_stop_loss_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("trades.csv");

    let config = BotConfig::from_yaml_str(CONFIG).unwrap();
    let settings = BotSettings::from_config(&config);
    assert_eq!(settings.mode, ExecutionMode::DryRun);

    let exchange = Arc::new(MockExchange {
        klines: uptrend(),
        price: Mutex::new(107.0),
        balance: 10_000.0,
    });
    let constraints = spotbot::execution::resolve_constraints(
        exchange.as_ref(),
        "BTCUSDT",
        config.fallback_constraints(),
    )
    .await
    .unwrap();
    assert_eq!(
        constraints,
        ExchangeConstraints {
            min_notional: 10.0,
            step_size: 0.001
        }
    );

    let mut bot = TradingBot::new(
        settings,
        exchange.clone(),
        constraints,
        Box::new(CsvTradeLog::new(&log_path).unwrap()),
    );
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    // NO_POSITION -> OPEN
    let outcome = bot.run_tick_at(t0).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Opened(_)), "{:?}", outcome);
    let position = bot.position().cloned().unwrap();
    assert!((position.stop_loss - 101.65).abs() < 1e-9);

    // Price inside the band: hold
    *exchange.price.lock().unwrap() = 107.5;
    let outcome = bot.run_tick_at(t0 + Duration::minutes(5)).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Holding { .. }));

    // OPEN -> NO_POSITION on the stop, with no re-entry in the same tick
    *exchange.price.lock().unwrap() = 100.0;
    let outcome = bot.run_tick_at(t0 + Duration::minutes(12)).await.unwrap();
    let TickOutcome::Closed(trade) = outcome else {
        panic!("expected a closed trade, got {:?}", outcome);
    };
    assert_eq!(trade.reason, ExitReason::StopLoss);
    assert!(trade.pnl < 0.0);
    assert!(bot.position().is_none());

    let mut reader = csv::Reader::from_path(&log_path).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][3], "ENTRY");
    assert_eq!(&rows[0][4], "107.0");
    assert_eq!(&rows[1][2], "SELL");
    assert_eq!(&rows[1][3], "EXIT");
    assert_eq!(&rows[1][5], "100.0");
    assert_eq!(&rows[1][8], "-6.54");
    assert_eq!(&rows[1][10], "STOP_LOSS");
    assert_eq!(&rows[1][11], "12.0");
}

#[tokio::test]
async fn test_insufficient_history_never_trades() {
    let config = BotConfig::from_yaml_str(CONFIG).unwrap();
    let exchange = Arc::new(MockExchange {
        klines: uptrend()[..9].to_vec(),
        price: Mutex::new(104.0),
        balance: 10_000.0,
    });

    let dir = tempfile::tempdir().unwrap();
    let mut bot = TradingBot::new(
        BotSettings::from_config(&config),
        exchange,
        config.fallback_constraints(),
        Box::new(CsvTradeLog::new(dir.path().join("trades.csv")).unwrap()),
    );

    let outcome = bot.run_tick().await.unwrap();
    assert_eq!(outcome, TickOutcome::NoSignal);
}
