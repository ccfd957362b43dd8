use std::sync::Arc;

use crate::api::MarketClient;
use crate::error::BotError;
use crate::models::{Fill, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    /// Same decisions, simulated fills at the reference price
    DryRun,
}

impl ExecutionMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            ExecutionMode::DryRun
        } else {
            ExecutionMode::Live
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecutionMode::Live => "LIVE TRADING",
            ExecutionMode::DryRun => "DRY RUN",
        }
    }
}

/// Submits market orders, or simulates them in dry-run mode
pub struct OrderExecutor {
    client: Arc<dyn MarketClient>,
    mode: ExecutionMode,
    step_size: f64,
}

/// A fill must carry a positive, finite price and quantity
pub fn validate_fill(fill: Fill) -> Result<Fill, BotError> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(fill.price) || !valid(fill.quantity) {
        return Err(BotError::Execution(format!(
            "inconsistent fill: {} @ {}",
            fill.quantity, fill.price
        )));
    }
    Ok(fill)
}

/// Executed quantity must match the order to within half a lot step
pub fn check_fill_quantity(
    side: Side,
    requested: f64,
    fill: Fill,
    step_size: f64,
) -> Result<Fill, BotError> {
    if (fill.quantity - requested).abs() > step_size * 0.5 {
        tracing::error!(
            "{} fill of {} does not match order of {}; exchange balance needs reconciling",
            side,
            fill.quantity,
            requested
        );
        return Err(BotError::Execution(format!(
            "{} filled {} of {} requested",
            side, fill.quantity, requested
        )));
    }
    Ok(fill)
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn MarketClient>, mode: ExecutionMode, step_size: f64) -> Self {
        Self {
            client,
            mode,
            step_size,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub async fn market_buy(
        &self,
        symbol: &str,
        quantity: f64,
        reference_price: f64,
    ) -> Result<Fill, BotError> {
        self.execute(symbol, Side::Buy, quantity, reference_price).await
    }

    pub async fn market_sell(
        &self,
        symbol: &str,
        quantity: f64,
        reference_price: f64,
    ) -> Result<Fill, BotError> {
        self.execute(symbol, Side::Sell, quantity, reference_price).await
    }

    async fn execute(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
        reference_price: f64,
    ) -> Result<Fill, BotError> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(BotError::Execution(format!(
                "refusing {} order with quantity {}",
                side, quantity
            )));
        }

        match self.mode {
            ExecutionMode::DryRun => {
                let fill = validate_fill(Fill {
                    price: reference_price,
                    quantity,
                })?;
                tracing::info!(
                    "[DRY RUN] Would {} {:.8} {} @ {:.8}",
                    side,
                    quantity,
                    symbol,
                    fill.price
                );
                Ok(fill)
            }
            ExecutionMode::Live => {
                tracing::info!("Submitting MARKET {} {:.8} {}", side, quantity, symbol);

                let fill = self
                    .client
                    .submit_market_order(symbol, side, quantity)
                    .await
                    .map_err(|e| BotError::Execution(format!("{} order failed: {}", side, e)))?;
                let fill = validate_fill(fill)?;
                let fill = check_fill_quantity(side, quantity, fill, self.step_size)?;

                let slippage_pct = (fill.price - reference_price) / reference_price * 100.0;
                tracing::info!(
                    "{} filled: {:.8} @ {:.8} (slippage {:+.3}%)",
                    side,
                    fill.quantity,
                    fill.price,
                    slippage_pct
                );
                Ok(fill)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientError;
    use crate::models::{Candle, SymbolFilters};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Exchange stub that replays one order outcome and counts submissions
    struct StubExchange {
        outcome: Mutex<Option<Result<Fill, ClientError>>>,
        orders: Mutex<Vec<(Side, f64)>>,
    }

    impl StubExchange {
        fn new(outcome: Result<Fill, ClientError>) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(outcome)),
                orders: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MarketClient for StubExchange {
        async fn get_klines(&self, _: &str, _: &str, _: usize) -> Result<Vec<Candle>, ClientError> {
            Ok(Vec::new())
        }
        async fn get_current_price(&self, _: &str) -> Result<f64, ClientError> {
            Ok(100.0)
        }
        async fn get_balance(&self, _: &str) -> Result<f64, ClientError> {
            Ok(0.0)
        }
        async fn get_symbol_constraints(&self, _: &str) -> Result<SymbolFilters, ClientError> {
            Ok(SymbolFilters::default())
        }
        async fn submit_market_order(
            &self,
            _: &str,
            side: Side,
            quantity: f64,
        ) -> Result<Fill, ClientError> {
            self.orders.lock().unwrap().push((side, quantity));
            self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ClientError::Malformed("no scripted outcome".into())))
        }
    }

    #[tokio::test]
    async fn test_dry_run_fills_at_reference_without_submitting() {
        let stub = StubExchange::new(Err(ClientError::Malformed("unused".into())));
        let executor = OrderExecutor::new(stub.clone(), ExecutionMode::DryRun, 0.001);

        let fill = executor.market_buy("BTCUSDT", 0.5, 100.0).await.unwrap();

        assert_eq!(fill, Fill { price: 100.0, quantity: 0.5 });
        assert!(stub.orders.lock().unwrap().is_empty());
        assert_eq!(executor.mode(), ExecutionMode::DryRun);
    }

    #[tokio::test]
    async fn test_live_order_returns_exchange_fill() {
        let stub = StubExchange::new(Ok(Fill {
            price: 100.2,
            quantity: 0.5,
        }));
        let executor = OrderExecutor::new(stub.clone(), ExecutionMode::Live, 0.001);

        let fill = executor.market_sell("BTCUSDT", 0.5, 100.0).await.unwrap();

        assert_eq!(fill.price, 100.2);
        assert_eq!(*stub.orders.lock().unwrap(), vec![(Side::Sell, 0.5)]);
    }

    #[tokio::test]
    async fn test_live_failure_is_execution_error() {
        let stub = StubExchange::new(Err(ClientError::Api {
            code: -2010,
            msg: "insufficient balance".into(),
        }));
        let executor = OrderExecutor::new(stub, ExecutionMode::Live, 0.001);

        let err = executor.market_buy("BTCUSDT", 0.5, 100.0).await.unwrap_err();
        assert!(matches!(err, BotError::Execution(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_zero_price_fill_is_rejected() {
        let stub = StubExchange::new(Ok(Fill {
            price: 0.0,
            quantity: 0.5,
        }));
        let executor = OrderExecutor::new(stub, ExecutionMode::Live, 0.001);

        let err = executor.market_buy("BTCUSDT", 0.5, 100.0).await.unwrap_err();
        assert!(err.to_string().contains("inconsistent fill"));
    }

    #[tokio::test]
    async fn test_non_positive_quantity_never_submitted() {
        let stub = StubExchange::new(Ok(Fill {
            price: 100.0,
            quantity: 1.0,
        }));
        let executor = OrderExecutor::new(stub.clone(), ExecutionMode::Live, 0.001);

        assert!(executor.market_buy("BTCUSDT", 0.0, 100.0).await.is_err());
        assert!(executor.market_buy("BTCUSDT", f64::NAN, 100.0).await.is_err());
        assert!(stub.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_sell_is_execution_error() {
        let stub = StubExchange::new(Ok(Fill {
            price: 100.0,
            quantity: 0.25,
        }));
        let executor = OrderExecutor::new(stub, ExecutionMode::Live, 0.001);

        let err = executor.market_sell("BTCUSDT", 0.5, 100.0).await.unwrap_err();
        assert!(matches!(err, BotError::Execution(_)));
        assert!(err.to_string().contains("0.25 of 0.5"));
    }

    #[tokio::test]
    async fn test_partial_buy_is_execution_error() {
        let stub = StubExchange::new(Ok(Fill {
            price: 100.0,
            quantity: 0.25,
        }));
        let executor = OrderExecutor::new(stub, ExecutionMode::Live, 0.001);

        let err = executor.market_buy("BTCUSDT", 0.5, 100.0).await.unwrap_err();
        assert!(matches!(err, BotError::Execution(_)));
    }

    #[test]
    fn test_fill_quantity_tolerance() {
        let fill = |quantity| Fill {
            price: 100.0,
            quantity,
        };
        // Within half a step either way is the same order
        assert!(check_fill_quantity(Side::Sell, 1.0, fill(1.0004), 0.001).is_ok());
        assert!(check_fill_quantity(Side::Sell, 1.0, fill(0.9996), 0.001).is_ok());
        assert!(check_fill_quantity(Side::Sell, 1.0, fill(0.999), 0.001).is_err());
        assert!(check_fill_quantity(Side::Buy, 1.0, fill(1.002), 0.001).is_err());
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(ExecutionMode::from_dry_run(true), ExecutionMode::DryRun, "{}", 0.001);
        assert_eq!(ExecutionMode::from_dry_run(false).label(), "LIVE TRADING");
    }
}
