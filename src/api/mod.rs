pub mod binance;

pub use binance::{BinanceClient, Credentials};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Candle, Fill, Side, SymbolFilters};

/// Failures reported by the market data / execution collaborator
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exchange error {code}: {msg}")]
    Api { code: i64, msg: String },

    /// The exchange explicitly reported that the symbol does not exist
    #[error("symbol {0} not found")]
    SymbolNotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("API credentials are required for {0}")]
    MissingCredentials(&'static str),
}

/// Market data and order execution capabilities the trading loop relies on
#[async_trait]
pub trait MarketClient: Send + Sync {
    /// Most recent `limit` klines, oldest first
    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ClientError>;

    async fn get_current_price(&self, symbol: &str) -> Result<f64, ClientError>;

    /// Free balance of an asset; an asset absent from the account is 0
    async fn get_balance(&self, asset: &str) -> Result<f64, ClientError>;

    async fn get_symbol_constraints(&self, symbol: &str) -> Result<SymbolFilters, ClientError>;

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<Fill, ClientError>;
}
