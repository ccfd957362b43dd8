use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick for one timeframe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a market order, real or simulated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub quantity: f64,
}

/// Raw lot/notional filters as reported by the exchange.
///
/// A `None` field means the exchange did not report that filter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SymbolFilters {
    pub min_notional: Option<f64>,
    pub step_size: Option<f64>,
}

/// Quantity constraints used for sizing, fixed for the whole run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeConstraints {
    pub min_notional: f64,
    pub step_size: f64,
}

impl ExchangeConstraints {
    /// Fill missing filters from the configured fallbacks
    pub fn from_filters(filters: SymbolFilters, fallback: ExchangeConstraints) -> Self {
        Self {
            min_notional: filters.min_notional.unwrap_or(fallback.min_notional),
            step_size: filters.step_size.unwrap_or(fallback.step_size),
        }
    }
}

/// The single open position, from entry fill until exit fill
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: f64,    // fixed at entry, not trailing
    pub take_profit: f64,
}

impl Position {
    /// Minutes elapsed since entry
    pub fn duration_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.entry_time).num_milliseconds() as f64 / 60_000.0
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeExit,
    EmergencyExit,
    Shutdown,
    Error,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::TimeExit => "TIME_EXIT",
            ExitReason::EmergencyExit => "EMERGENCY_EXIT",
            ExitReason::Shutdown => "SHUTDOWN",
            ExitReason::Error => "ERROR",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade lifecycle event handed to the trade recorder
#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Entry {
        symbol: String,
        side: Side,
        price: f64,
        quantity: f64,
        timestamp: DateTime<Utc>,
    },
    Exit {
        symbol: String,
        side: Side,
        entry_price: f64,
        exit_price: f64,
        quantity: f64,
        reason: ExitReason,
        duration_minutes: f64,
        pnl: f64,
        pnl_pct: f64,
        fee: f64,
        timestamp: DateTime<Utc>,
    },
}

impl TradeEvent {
    pub fn symbol(&self) -> &str {
        match self {
            TradeEvent::Entry { symbol, .. } | TradeEvent::Exit { symbol, .. } => symbol,
        }
    }
}
