use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::executor::{ExecutionMode, OrderExecutor};
use super::market_feed::MarketFeed;
use super::position_tracker::{ClosedTrade, PositionTracker};
use crate::api::{ClientError, MarketClient};
use crate::config::BotConfig;
use crate::error::BotError;
use crate::models::{ExchangeConstraints, ExitReason, Position, Side, TradeEvent};
use crate::persistence::TradeRecorder;
use crate::risk::{RiskConfig, RiskManager, RiskMetrics, RiskRejection, Sizing};
use crate::strategy::{SignalConfig, Strategy, TrendStrategy};

/// Upper bound for the best-effort close on the way out
const SHUTDOWN_CLOSE_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything the loop needs from configuration
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub symbol: String,
    pub quote_asset: String,
    pub fast_interval: String,
    pub slow_interval: String,
    pub kline_limit: usize,
    pub loop_interval: Duration,
    pub signal: SignalConfig,
    pub risk: RiskConfig,
    pub mode: ExecutionMode,
}

impl BotSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            symbol: config.trading.symbol.clone(),
            quote_asset: config.trading.quote_asset.clone(),
            fast_interval: config.strategy.timeframes.fast.clone(),
            slow_interval: config.strategy.timeframes.slow.clone(),
            kline_limit: config.bot.kline_limit,
            loop_interval: Duration::from_secs(config.bot.loop_interval_seconds),
            signal: config.signal_config(),
            risk: config.risk_config(),
            mode: ExecutionMode::from_dry_run(config.trading.dry_run),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Flat, and the entry rules did not all hold
    NoSignal,
    /// Position kept open
    Holding { price: f64, unrealized_pnl_pct: f64 },
    Opened(Position),
    Closed(ClosedTrade),
    /// Entry signal declined by sizing or validation
    Rejected(RiskRejection),
    /// Entry signal while every position slot is taken
    AtCapacity,
}

/// Resolve quantity constraints once at startup.
///
/// Fallbacks cover only an unknown symbol or a filter the exchange omits;
/// any other failure is returned.
pub async fn resolve_constraints(
    client: &dyn MarketClient,
    symbol: &str,
    fallback: ExchangeConstraints,
) -> Result<ExchangeConstraints, BotError> {
    match client.get_symbol_constraints(symbol).await {
        Ok(filters) => {
            if filters.min_notional.is_none() {
                tracing::warn!(
                    "No NOTIONAL filter for {}, using fallback {}",
                    symbol,
                    fallback.min_notional
                );
            }
            if filters.step_size.is_none() {
                tracing::warn!(
                    "No LOT_SIZE filter for {}, using fallback {}",
                    symbol,
                    fallback.step_size
                );
            }
            Ok(ExchangeConstraints::from_filters(filters, fallback))
        }
        Err(ClientError::SymbolNotFound(_)) => {
            tracing::warn!(
                "Symbol {} not found on exchange, using fallback constraints {:?}",
                symbol,
                fallback
            );
            Ok(fallback)
        }
        Err(e) => Err(BotError::transient("symbol constraints", e)),
    }
}

/// Single-symbol control loop: manage the open position, otherwise look for an entry
pub struct TradingBot {
    settings: BotSettings,
    strategy: Box<dyn Strategy>,
    risk: RiskManager,
    feed: MarketFeed,
    executor: OrderExecutor,
    tracker: PositionTracker,
    recorder: Box<dyn TradeRecorder>,
    constraints: ExchangeConstraints,
}

impl TradingBot {
    pub fn new(
        settings: BotSettings,
        client: Arc<dyn MarketClient>,
        constraints: ExchangeConstraints,
        recorder: Box<dyn TradeRecorder>,
    ) -> Self {
        let strategy = TrendStrategy::new(settings.signal.clone());
        Self::with_strategy(settings, client, constraints, recorder, Box::new(strategy))
    }

    pub fn with_strategy(
        settings: BotSettings,
        client: Arc<dyn MarketClient>,
        constraints: ExchangeConstraints,
        recorder: Box<dyn TradeRecorder>,
        strategy: Box<dyn Strategy>,
    ) -> Self {
        let feed = MarketFeed::new(
            client.clone(),
            &settings.symbol,
            &settings.fast_interval,
            &settings.slow_interval,
            settings.kline_limit,
            strategy.min_candles_required(),
        );

        Self {
            risk: RiskManager::new(settings.risk),
            executor: OrderExecutor::new(client, settings.mode, constraints.step_size),
            tracker: PositionTracker::new(),
            settings,
            strategy,
            feed,
            recorder,
            constraints,
        }
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    pub fn constraints(&self) -> ExchangeConstraints {
        self.constraints
    }

    pub fn position(&self) -> Option<&Position> {
        self.tracker.current()
    }

    pub fn log_startup(&self) {
        let (fast, slow) = self.feed.intervals();
        tracing::info!("{}", "=".repeat(60));
        tracing::info!("Trading bot starting ({})", self.strategy.name());
        tracing::info!("Symbol: {}", self.settings.symbol);
        tracing::info!("Timeframes: {} / {}", fast, slow);
        tracing::info!("Mode: {}", self.executor.mode().label());
        tracing::info!("Min notional: {}", self.constraints.min_notional);
        tracing::info!("Step size: {}", self.constraints.step_size);
        tracing::info!("Loop interval: {:?}", self.settings.loop_interval);
        tracing::info!("{}", "=".repeat(60));
    }

    pub async fn run_tick(&mut self) -> Result<TickOutcome, BotError> {
        self.run_tick_at(Utc::now()).await
    }

    /// One fetch-evaluate-act cycle. A tick that closes a position never re-enters.
    pub async fn run_tick_at(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, BotError> {
        if self.tracker.is_open() {
            self.manage_position(now).await
        } else {
            self.look_for_entry(now).await
        }
    }

    async fn manage_position(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, BotError> {
        let Some(position) = self.tracker.current().cloned() else {
            return Ok(TickOutcome::NoSignal);
        };

        let price = self.feed.current_price().await?;
        let candles = self.feed.refresh_fast().await?;
        let bars = self.strategy.add_indicators(candles);

        let duration = position.duration_minutes(now);
        let unrealized_pnl_pct = (price - position.entry_price) / position.entry_price * 100.0;

        tracing::debug!(
            "Position: entry {:.8}, current {:.8}, PnL {:+.2}%, duration {:.1}m",
            position.entry_price,
            price,
            unrealized_pnl_pct,
            duration
        );

        match self.strategy.should_exit(&position, price, duration, &bars) {
            Some(reason) => {
                tracing::info!("Exit signal: {} at {:.8}", reason, price);
                let trade = self.close_position(reason, price, now).await?;
                Ok(TickOutcome::Closed(trade))
            }
            None => Ok(TickOutcome::Holding {
                price,
                unrealized_pnl_pct,
            }),
        }
    }

    async fn look_for_entry(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, BotError> {
        let (fast, slow) = self.feed.refresh_both().await?;
        let fast_bars = self.strategy.add_indicators(fast);
        let slow_bars = self.strategy.add_indicators(slow);

        if !self.strategy.check_entry(&fast_bars, &slow_bars) {
            return Ok(TickOutcome::NoSignal);
        }
        tracing::info!("Entry signal detected for {}", self.settings.symbol);

        if !self.risk.can_open_position(self.tracker.open_count()) {
            return Ok(TickOutcome::AtCapacity);
        }

        let price = self.feed.current_price().await?;
        let balance = self.feed.balance(&self.settings.quote_asset).await?;
        let levels = self.strategy.calculate_tp_sl(price);

        let quantity = match self.risk.calculate_position_size(
            balance,
            price,
            levels.stop_loss,
            self.constraints.min_notional,
            self.constraints.step_size,
        ) {
            Sizing::Trade { quantity, .. } => quantity,
            Sizing::Reject(rejection) => {
                tracing::warn!("Entry rejected by sizing: {}", rejection);
                return Ok(TickOutcome::Rejected(rejection));
            }
        };

        if let Err(rejection) =
            self.risk
                .validate_trade(quantity, price, balance, self.constraints.min_notional)
        {
            tracing::warn!("Entry rejected by validation: {}", rejection);
            return Ok(TickOutcome::Rejected(rejection));
        }

        let metrics =
            self.risk
                .calculate_risk_metrics(price, levels.stop_loss, levels.take_profit, quantity);
        log_risk_metrics(&metrics);

        let fill = self
            .executor
            .market_buy(&self.settings.symbol, quantity, price)
            .await?;

        // Levels follow the actual fill, not the pre-trade quote
        let levels = self.strategy.calculate_tp_sl(fill.price);
        let position = self
            .tracker
            .open_position_at(&self.settings.symbol, fill.price, fill.quantity, levels, now)?
            .clone();

        self.record(&TradeEvent::Entry {
            symbol: position.symbol.clone(),
            side: Side::Buy,
            price: position.entry_price,
            quantity: position.quantity,
            timestamp: now,
        });

        Ok(TickOutcome::Opened(position))
    }

    /// Sell the open position; on failure the position stays exactly as it was
    async fn close_position(
        &mut self,
        reason: ExitReason,
        reference_price: f64,
        now: DateTime<Utc>,
    ) -> Result<ClosedTrade, BotError> {
        let quantity = self
            .tracker
            .current()
            .map(|p| p.quantity)
            .ok_or_else(|| BotError::Invariant("close requested while flat".to_string()))?;

        let fill = self
            .executor
            .market_sell(&self.settings.symbol, quantity, reference_price)
            .await?;

        let trade = self.tracker.close_position_at(fill.price, reason, 0.0, now)?;
        self.record(&trade.to_event());
        Ok(trade)
    }

    /// Single best-effort attempt to flatten before the process exits.
    ///
    /// Errors are logged and swallowed; the attempt is bounded by a timeout.
    pub async fn close_on_exit(&mut self, reason: ExitReason) -> Option<ClosedTrade> {
        let position = self.tracker.current().cloned()?;
        tracing::warn!(
            "Closing open {} position before exit ({})",
            position.symbol,
            reason
        );

        let attempt = async {
            let price = match self.feed.current_price().await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!("No price for exit ({}), using entry price as reference", e);
                    position.entry_price
                }
            };
            self.close_position(reason, price, Utc::now()).await
        };

        match tokio::time::timeout(SHUTDOWN_CLOSE_TIMEOUT, attempt).await {
            Ok(Ok(trade)) => Some(trade),
            Ok(Err(e)) => {
                tracing::error!("Failed to close position on exit: {}", e);
                None
            }
            Err(_) => {
                tracing::error!(
                    "Timed out closing position after {:?}; position may still be open",
                    SHUTDOWN_CLOSE_TIMEOUT
                );
                None
            }
        }
    }

    /// Tick until `shutdown` resolves or a fatal error occurs, then make one
    /// attempt to close any open position.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), BotError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.settings.loop_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break Ok(());
                }
                _ = ticker.tick() => {
                    match self.run_tick().await {
                        Ok(outcome) => tracing::debug!("Tick: {:?}", outcome),
                        Err(e) if e.is_fatal() => {
                            tracing::error!("Fatal error, stopping: {}", e);
                            break Err(e);
                        }
                        Err(e) => tracing::warn!("Tick abandoned: {}", e),
                    }
                }
            }
        };

        let reason = if result.is_ok() {
            ExitReason::Shutdown
        } else {
            ExitReason::Error
        };
        self.close_on_exit(reason).await;

        tracing::info!("Trading bot stopped");
        result
    }

    fn record(&mut self, event: &TradeEvent) {
        if let Err(e) = self.recorder.record(event) {
            tracing::error!("Failed to record trade event: {:#}", e);
        }
    }
}

fn log_risk_metrics(metrics: &RiskMetrics) {
    tracing::info!("Risk metrics:");
    tracing::info!("  Risk per unit: {:.8}", metrics.risk_per_unit);
    tracing::info!("  Reward per unit: {:.8}", metrics.reward_per_unit);
    tracing::info!("  Risk amount: {:.2}", metrics.risk_amount);
    tracing::info!("  Reward amount: {:.2}", metrics.reward_amount);
    tracing::info!("  Risk:Reward ratio: 1:{:.2}", metrics.risk_reward_ratio);
    tracing::info!("  Potential loss: {:.2}%", metrics.potential_loss_pct);
    tracing::info!("  Potential profit: {:.2}%", metrics.potential_profit_pct);
}
