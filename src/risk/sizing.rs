use serde::{Deserialize, Serialize};
use std::fmt;

/// Share of the balance an order may consume
const MAX_BALANCE_USAGE: f64 = 0.95;
/// Headroom added when bumping a quantity up to the exchange minimum
const MIN_NOTIONAL_BUFFER: f64 = 1.01;
/// How far above the configured risk a min-notional bump may go
const MIN_NOTIONAL_RISK_TOLERANCE: f64 = 1.5;

/// Risk limits, immutable for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_risk_per_trade_pct: f64,
    pub max_open_positions: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade_pct: 1.0, // 1% of balance per trade
            max_open_positions: 1,
        }
    }
}

/// Why a trade was declined. Not an error: the tick just skips the entry.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskRejection {
    InvalidInput(String),
    ZeroStopDistance,
    MinNotionalExceedsRisk { required_risk_pct: f64, max_risk_pct: f64 },
    InsufficientBalance { required: f64, available: f64 },
    QuantityRoundsToZero,
    InvalidQuantity(f64),
    InvalidPrice(f64),
    BelowMinNotional { notional: f64, min_notional: f64 },
    ExceedsBalance { required: f64, available: f64 },
}

impl fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskRejection::InvalidInput(what) => write!(f, "invalid sizing input: {}", what),
            RiskRejection::ZeroStopDistance => {
                write!(f, "invalid stop loss: distance to entry is zero")
            }
            RiskRejection::MinNotionalExceedsRisk {
                required_risk_pct,
                max_risk_pct,
            } => write!(
                f,
                "minimum notional requires {:.2}% risk, exceeds limit of {}%",
                required_risk_pct, max_risk_pct
            ),
            RiskRejection::InsufficientBalance {
                required,
                available,
            } => write!(
                f,
                "insufficient balance: required {:.2}, usable {:.2}",
                required, available
            ),
            RiskRejection::QuantityRoundsToZero => write!(f, "quantity rounds to zero"),
            RiskRejection::InvalidQuantity(q) => {
                write!(f, "invalid quantity {}: must be greater than 0", q)
            }
            RiskRejection::InvalidPrice(p) => {
                write!(f, "invalid price {}: must be greater than 0", p)
            }
            RiskRejection::BelowMinNotional {
                notional,
                min_notional,
            } => write!(
                f,
                "notional value {:.2} below minimum {:.2}",
                notional, min_notional
            ),
            RiskRejection::ExceedsBalance {
                required,
                available,
            } => write!(
                f,
                "insufficient balance: required {:.2}, available {:.2}",
                required, available
            ),
        }
    }
}

/// Outcome of position sizing
#[derive(Debug, Clone, PartialEq)]
pub enum Sizing {
    Trade { quantity: f64, notional: f64 },
    Reject(RiskRejection),
}

impl Sizing {
    /// Order quantity; 0 means do not trade
    pub fn quantity(&self) -> f64 {
        match self {
            Sizing::Trade { quantity, .. } => *quantity,
            Sizing::Reject(_) => 0.0,
        }
    }
}

/// Risk/reward figures for a planned trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskMetrics {
    pub risk_per_unit: f64,
    pub reward_per_unit: f64,
    pub risk_amount: f64,
    pub reward_amount: f64,
    pub risk_reward_ratio: f64,
    pub potential_loss_pct: f64,
    pub potential_profit_pct: f64,
}

/// Position sizing and pre-trade checks
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Size a long entry so that hitting the stop loses at most the configured
    /// share of the balance.
    ///
    /// # Arguments
    /// * `balance` - Free quote balance (e.g. USDT)
    /// * `entry_price` - Planned entry price
    /// * `stop_loss` - Stop loss price
    /// * `min_notional` - Exchange minimum order value
    /// * `step_size` - Exchange quantity increment
    pub fn calculate_position_size(
        &self,
        balance: f64,
        entry_price: f64,
        stop_loss: f64,
        min_notional: f64,
        step_size: f64,
    ) -> Sizing {
        if !(balance.is_finite() && balance > 0.0) {
            return Sizing::Reject(RiskRejection::InvalidInput(format!("balance {}", balance)));
        }
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Sizing::Reject(RiskRejection::InvalidInput(format!(
                "entry price {}",
                entry_price
            )));
        }
        if !stop_loss.is_finite() {
            return Sizing::Reject(RiskRejection::InvalidInput(format!("stop loss {}", stop_loss)));
        }

        let max_risk_pct = self.config.max_risk_per_trade_pct;
        let risk_amount = balance * (max_risk_pct / 100.0);

        let price_distance = (entry_price - stop_loss).abs();
        if price_distance == 0.0 {
            tracing::error!("Invalid stop loss: distance to entry is zero");
            return Sizing::Reject(RiskRejection::ZeroStopDistance);
        }

        // risk_amount = quantity * price_distance
        let mut quantity = round_to_step_size(risk_amount / price_distance, step_size);
        let mut notional = quantity * entry_price;

        if notional < min_notional {
            quantity = round_to_step_size((min_notional / entry_price) * MIN_NOTIONAL_BUFFER, step_size);
            notional = quantity * entry_price;

            tracing::info!(
                "Position size adjusted to meet min notional: {:.2}",
                min_notional
            );

            let actual_risk_pct = (quantity * price_distance / balance) * 100.0;
            if actual_risk_pct > max_risk_pct * MIN_NOTIONAL_RISK_TOLERANCE {
                tracing::warn!(
                    "Minimum notional requires {:.2}% risk, exceeds limit of {}%",
                    actual_risk_pct,
                    max_risk_pct
                );
                return Sizing::Reject(RiskRejection::MinNotionalExceedsRisk {
                    required_risk_pct: actual_risk_pct,
                    max_risk_pct,
                });
            }
        }

        let usable_balance = balance * MAX_BALANCE_USAGE;
        if notional > usable_balance {
            tracing::warn!(
                "Insufficient balance: required {:.2}, usable {:.2} of {:.2}",
                notional,
                usable_balance,
                balance
            );
            return Sizing::Reject(RiskRejection::InsufficientBalance {
                required: notional,
                available: usable_balance,
            });
        }

        if !(quantity.is_finite() && quantity > 0.0) {
            return Sizing::Reject(RiskRejection::QuantityRoundsToZero);
        }

        tracing::info!(
            "Position size calculated: {:.8} (notional: {:.2})",
            quantity,
            notional
        );
        Sizing::Trade { quantity, notional }
    }

    /// Check whether another position may be opened
    pub fn can_open_position(&self, current_positions: usize) -> bool {
        let can_open = current_positions < self.config.max_open_positions;
        if !can_open {
            tracing::info!(
                "Cannot open position: already at max ({})",
                self.config.max_open_positions
            );
        }
        can_open
    }

    /// Last gate before an order is submitted, independent of how the
    /// quantity was produced
    pub fn validate_trade(
        &self,
        quantity: f64,
        price: f64,
        balance: f64,
        min_notional: f64,
    ) -> Result<(), RiskRejection> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(RiskRejection::InvalidQuantity(quantity));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(RiskRejection::InvalidPrice(price));
        }

        let notional = quantity * price;
        if notional < min_notional {
            return Err(RiskRejection::BelowMinNotional {
                notional,
                min_notional,
            });
        }
        if notional > balance {
            return Err(RiskRejection::ExceedsBalance {
                required: notional,
                available: balance,
            });
        }

        Ok(())
    }

    /// Risk/reward figures for logging a planned entry
    pub fn calculate_risk_metrics(
        &self,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        quantity: f64,
    ) -> RiskMetrics {
        let risk_per_unit = (entry_price - stop_loss).abs();
        let reward_per_unit = (take_profit - entry_price).abs();

        RiskMetrics {
            risk_per_unit,
            reward_per_unit,
            risk_amount: risk_per_unit * quantity,
            reward_amount: reward_per_unit * quantity,
            risk_reward_ratio: if risk_per_unit > 0.0 {
                reward_per_unit / risk_per_unit
            } else {
                0.0
            },
            potential_loss_pct: (risk_per_unit / entry_price) * 100.0,
            potential_profit_pct: (reward_per_unit / entry_price) * 100.0,
        }
    }
}

/// Round a quantity down to a multiple of the exchange step size.
///
/// Never rounds up. A non-positive step leaves the quantity as is; a
/// non-positive or non-finite quantity becomes 0.
pub fn round_to_step_size(quantity: f64, step_size: f64) -> f64 {
    if !(quantity.is_finite() && quantity > 0.0) {
        return 0.0;
    }
    if !(step_size.is_finite() && step_size > 0.0) {
        return quantity;
    }

    let mut steps = (quantity / step_size).floor();
    let next = (steps + 1.0) * step_size;
    // quantity / step_size can land just under an integer (0.3 / 0.1)
    if next <= quantity || (next - quantity) / step_size < 1e-9 {
        return next.min(quantity);
    }
    while steps > 0.0 && steps * step_size > quantity {
        steps -= 1.0;
    }

    steps * step_size
}

/// Decimal places implied by a step size (0.001 -> 3)
pub fn step_precision(step_size: f64) -> usize {
    if !(step_size.is_finite() && step_size > 0.0) || step_size >= 1.0 {
        return 0;
    }
    (-step_size.log10()).round().max(0.0) as usize
}
