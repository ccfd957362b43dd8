use chrono::{DateTime, Utc};

use crate::error::BotError;
use crate::models::{ExitReason, Position, Side, TradeEvent};
use crate::strategy::TpSl;

/// Realized outcome of a closed position
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub reason: ExitReason,
    pub duration_minutes: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fee: f64,
}

impl ClosedTrade {
    pub fn to_event(&self) -> TradeEvent {
        TradeEvent::Exit {
            symbol: self.position.symbol.clone(),
            side: Side::Sell,
            entry_price: self.position.entry_price,
            exit_price: self.exit_price,
            quantity: self.position.quantity,
            reason: self.reason,
            duration_minutes: self.duration_minutes,
            pnl: self.pnl,
            pnl_pct: self.pnl_pct,
            fee: self.fee,
            timestamp: self.exit_time,
        }
    }
}

/// `(pnl, pnl_pct)` for a long position; the fee is deducted from pnl only
pub fn calculate_pnl(entry_price: f64, exit_price: f64, quantity: f64, fee: f64) -> (f64, f64) {
    let pnl = (exit_price - entry_price) * quantity - fee;
    let pnl_pct = if entry_price > 0.0 {
        (exit_price - entry_price) / entry_price * 100.0
    } else {
        0.0
    };
    (pnl, pnl_pct)
}

/// Holds the single open position, if any
#[derive(Debug, Default)]
pub struct PositionTracker {
    position: Option<Position>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    pub fn open_count(&self) -> usize {
        usize::from(self.position.is_some())
    }

    /// Record a filled entry with an explicit entry time
    pub fn open_position_at(
        &mut self,
        symbol: &str,
        entry_price: f64,
        quantity: f64,
        levels: TpSl,
        entry_time: DateTime<Utc>,
    ) -> Result<&Position, BotError> {
        if let Some(existing) = &self.position {
            return Err(BotError::Invariant(format!(
                "attempted to open a second position on {} while {} is open",
                symbol, existing.symbol
            )));
        }
        if !(entry_price > 0.0 && quantity > 0.0) {
            return Err(BotError::Invariant(format!(
                "position needs positive price and quantity (got {} @ {})",
                quantity, entry_price
            )));
        }

        let position = Position {
            symbol: symbol.to_string(),
            entry_price,
            quantity,
            entry_time,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
        };

        tracing::info!(
            "Position opened: {} {:.8} @ {:.8} (SL {:.8}, TP {:.8})",
            position.symbol,
            position.quantity,
            position.entry_price,
            position.stop_loss,
            position.take_profit
        );

        Ok(self.position.insert(position))
    }

    /// Clear the position after a filled exit and report the realized result
    pub fn close_position_at(
        &mut self,
        exit_price: f64,
        reason: ExitReason,
        fee: f64,
        exit_time: DateTime<Utc>,
    ) -> Result<ClosedTrade, BotError> {
        let position = self
            .position
            .take()
            .ok_or_else(|| BotError::Invariant("no open position to close".to_string()))?;

        let duration_minutes = position.duration_minutes(exit_time);
        let (pnl, pnl_pct) = calculate_pnl(position.entry_price, exit_price, position.quantity, fee);

        tracing::info!(
            "Position closed: {} | {} | PnL: {:.4} ({:+.2}%) | duration {:.1}m",
            position.symbol,
            reason,
            pnl,
            pnl_pct,
            duration_minutes
        );

        Ok(ClosedTrade {
            position,
            exit_price,
            exit_time,
            reason,
            duration_minutes,
            pnl,
            pnl_pct,
            fee,
        })
    }
}
