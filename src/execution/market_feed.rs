use std::sync::Arc;

use super::candle_window::{validate_series, window_capacity, CandleWindow};
use crate::api::{ClientError, MarketClient};
use crate::error::BotError;
use crate::models::Candle;

/// A symbol the exchange no longer lists cannot recover by retrying
fn fetch_error(what: &'static str, err: ClientError) -> BotError {
    match err {
        ClientError::SymbolNotFound(symbol) => {
            BotError::Configuration(format!("symbol {} is not listed on the exchange", symbol))
        }
        other => BotError::transient(what, other),
    }
}

/// Fetches klines for both timeframes of one symbol into bounded windows
pub struct MarketFeed {
    client: Arc<dyn MarketClient>,
    symbol: String,
    fast_interval: String,
    slow_interval: String,
    kline_limit: usize,
    fast: CandleWindow,
    slow: CandleWindow,
}

impl MarketFeed {
    pub fn new(
        client: Arc<dyn MarketClient>,
        symbol: &str,
        fast_interval: &str,
        slow_interval: &str,
        kline_limit: usize,
        min_history: usize,
    ) -> Self {
        let capacity = window_capacity(kline_limit, min_history);
        Self {
            client,
            symbol: symbol.to_string(),
            fast_interval: fast_interval.to_string(),
            slow_interval: slow_interval.to_string(),
            kline_limit,
            fast: CandleWindow::new(capacity),
            slow: CandleWindow::new(capacity),
        }
    }

    pub fn intervals(&self) -> (&str, &str) {
        (&self.fast_interval, &self.slow_interval)
    }

    /// Refresh the fast timeframe only (open-position management)
    pub async fn refresh_fast(&mut self) -> Result<&[Candle], BotError> {
        let candles = self
            .client
            .get_klines(&self.symbol, &self.fast_interval, self.kline_limit)
            .await
            .map_err(|e| fetch_error("klines", e))?;

        self.fast.replace(candles)?;
        tracing::debug!(
            "{} {}: {} bars",
            self.symbol,
            self.fast_interval,
            self.fast.len()
        );
        Ok(self.fast.candles())
    }

    /// Refresh both timeframes concurrently; either failure aborts both
    pub async fn refresh_both(&mut self) -> Result<(&[Candle], &[Candle]), BotError> {
        let (fast, slow) = tokio::try_join!(
            self.client
                .get_klines(&self.symbol, &self.fast_interval, self.kline_limit),
            self.client
                .get_klines(&self.symbol, &self.slow_interval, self.kline_limit),
        )
        .map_err(|e| fetch_error("klines", e))?;

        // Both or neither: a bad slow series must not leave a fresh fast one behind
        validate_series(&fast)?;
        validate_series(&slow)?;
        self.fast.store(fast);
        self.slow.store(slow);

        tracing::debug!(
            "{}: {} bars {} / {} bars {}",
            self.symbol,
            self.fast.len(),
            self.fast_interval,
            self.slow.len(),
            self.slow_interval
        );
        Ok((self.fast.candles(), self.slow.candles()))
    }

    pub async fn current_price(&self) -> Result<f64, BotError> {
        let price = self
            .client
            .get_current_price(&self.symbol)
            .await
            .map_err(|e| fetch_error("price", e))?;

        if !(price.is_finite() && price > 0.0) {
            return Err(BotError::InvalidData(format!(
                "ticker price {} for {}",
                price, self.symbol
            )));
        }
        Ok(price)
    }

    pub async fn balance(&self, asset: &str) -> Result<f64, BotError> {
        let balance = self
            .client
            .get_balance(asset)
            .await
            .map_err(|e| BotError::transient("balance", e))?;

        if !balance.is_finite() || balance < 0.0 {
            return Err(BotError::InvalidData(format!("{} balance {}", asset, balance)));
        }
        Ok(balance)
    }
}
