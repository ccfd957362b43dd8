use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{ClientError, MarketClient};
use crate::models::{Candle, Fill, Side, SymbolFilters};
use crate::risk::step_precision;

const MAINNET_BASE_URL: &str = "https://api.binance.com";
const TESTNET_BASE_URL: &str = "https://testnet.binance.vision";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const REQUESTS_PER_SECOND: u32 = 10;
const RECV_WINDOW_MS: u64 = 5000;
const DEFAULT_QUANTITY_PRECISION: usize = 8;
const INVALID_SYMBOL_CODE: i64 = -1121;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// API key pair loaded from the environment
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("testnet", &self.testnet)
            .finish()
    }
}

impl Credentials {
    /// Read BINANCE_API_KEY / BINANCE_API_SECRET / BINANCE_TESTNET.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_key = non_empty_var("BINANCE_API_KEY");
        let api_secret = non_empty_var("BINANCE_API_SECRET");

        let (Some(api_key), Some(api_secret)) = (api_key, api_secret) else {
            return Err(ClientError::MissingCredentials(
                "BINANCE_API_KEY and BINANCE_API_SECRET",
            ));
        };

        let testnet = std::env::var("BINANCE_TESTNET")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            api_key,
            api_secret,
            testnet,
        })
    }

    pub fn base_url(&self) -> &'static str {
        if self.testnet {
            TESTNET_BASE_URL
        } else {
            MAINNET_BASE_URL
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Binance spot REST client with request signing and rate limiting
///
/// Cloneable; clones share the rate limiter and the quantity precision cache.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    rate_limiter: Arc<BinanceRateLimiter>,
    /// symbol -> decimals allowed by its LOT_SIZE step
    quantity_precision: Arc<RwLock<HashMap<String, usize>>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    min_notional: Option<String>,
    step_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    executed_qty: String,
    cummulative_quote_qty: String,
    #[serde(default)]
    status: String,
}

impl BinanceClient {
    pub fn new(credentials: Credentials) -> Result<Self, ClientError> {
        let base_url = credentials.base_url().to_string();
        Self::with_base_url(credentials, base_url)
    }

    /// Point the client at a custom endpoint (mock servers, regional hosts)
    pub fn with_base_url(
        credentials: Credentials,
        base_url: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            rate_limiter,
            quantity_precision: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn sign(&self, payload: &str) -> Result<String, ClientError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| ClientError::Malformed(format!("invalid API secret: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn public_get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ClientError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(params).send().await?;
        Self::read_json(response).await
    }

    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ClientError> {
        self.rate_limiter.until_ready().await;

        let mut query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>();
        query.push(format!("recvWindow={}", RECV_WINDOW_MS));
        query.push(format!("timestamp={}", Utc::now().timestamp_millis()));
        let query = query.join("&");
        let signature = self.sign(&query)?;

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn read_json(response: Response) -> Result<Value, ClientError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| ClientError::Malformed(format!("invalid JSON: {}", e)));
        }

        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => Err(ClientError::Api {
                code: err.code,
                msg: err.msg,
            }),
            Err(_) => Err(ClientError::Api {
                code: i64::from(status.as_u16()),
                msg: body,
            }),
        }
    }

    async fn precision_for(&self, symbol: &str) -> usize {
        self.quantity_precision
            .read()
            .await
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_QUANTITY_PRECISION)
    }
}

fn unknown_symbol(symbol: &str, err: ClientError) -> ClientError {
    match err {
        ClientError::Api { code, .. } if code == INVALID_SYMBOL_CODE => {
            ClientError::SymbolNotFound(symbol.to_string())
        }
        other => other,
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Malformed(format!("{}: {}", what, e)))
}

/// Binance encodes decimals as strings; accept plain numbers as well
fn parse_decimal(value: &Value, field: &str) -> Result<f64, ClientError> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ClientError::Malformed(format!("{} is not a number: {}", field, value)))
}

fn parse_str_decimal(value: &str, field: &str) -> Result<f64, ClientError> {
    parse_decimal(&Value::String(value.to_string()), field)
}

/// One kline row: `[open_time, open, high, low, close, volume, close_time, ...]`
fn parse_kline(row: &Value) -> Result<Candle, ClientError> {
    let fields = row
        .as_array()
        .filter(|f| f.len() >= 6)
        .ok_or_else(|| ClientError::Malformed(format!("unexpected kline row: {}", row)))?;

    let open_time = fields[0]
        .as_i64()
        .ok_or_else(|| ClientError::Malformed("kline open time".to_string()))?;
    let timestamp = Utc
        .timestamp_millis_opt(open_time)
        .single()
        .ok_or_else(|| ClientError::Malformed(format!("kline timestamp {}", open_time)))?;

    Ok(Candle {
        timestamp,
        open: parse_decimal(&fields[1], "open")?,
        high: parse_decimal(&fields[2], "high")?,
        low: parse_decimal(&fields[3], "low")?,
        close: parse_decimal(&fields[4], "close")?,
        volume: parse_decimal(&fields[5], "volume")?,
    })
}

fn parse_filters(info: &SymbolInfo) -> Result<SymbolFilters, ClientError> {
    let mut filters = SymbolFilters::default();
    let mut notional = None;
    let mut legacy_notional = None;

    for filter in &info.filters {
        match (filter.filter_type.as_str(), &filter.min_notional, &filter.step_size) {
            ("NOTIONAL", Some(value), _) => {
                notional = Some(parse_str_decimal(value, "minNotional")?);
            }
            ("MIN_NOTIONAL", Some(value), _) => {
                legacy_notional = Some(parse_str_decimal(value, "minNotional")?);
            }
            ("LOT_SIZE", _, Some(value)) => {
                filters.step_size = Some(parse_str_decimal(value, "stepSize")?);
            }
            _ => {}
        }
    }

    // MIN_NOTIONAL is the pre-2023 filter name, only consulted when NOTIONAL is absent
    filters.min_notional = notional.or(legacy_notional);

    // A zero step means "unrestricted" on Binance; treat it as not reported
    filters.step_size = filters.step_size.filter(|s| *s > 0.0);
    filters.min_notional = filters.min_notional.filter(|n| *n >= 0.0);

    Ok(filters)
}

/// Truncate (never round up) to the allowed number of decimals
pub fn format_quantity(quantity: f64, precision: usize) -> String {
    let factor = 10f64.powi(precision as i32);
    let scaled = quantity * factor;
    // Absorb multiplication error only (0.29 * 100 = 28.999999999999996)
    let truncated = (scaled + scaled.abs() * 1e-12).floor() / factor;
    format!("{:.*}", precision, truncated)
}

#[async_trait]
impl MarketClient for BinanceClient {
    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ClientError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self
            .public_get("/api/v3/klines", &params)
            .await
            .map_err(|e| unknown_symbol(symbol, e))?;

        let rows = body
            .as_array()
            .ok_or_else(|| ClientError::Malformed("klines response is not an array".to_string()))?;

        rows.iter().map(parse_kline).collect()
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64, ClientError> {
        let body = self
            .public_get("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await
            .map_err(|e| unknown_symbol(symbol, e))?;
        let ticker: TickerPrice = decode(body, "ticker")?;
        parse_str_decimal(&ticker.price, "price")
    }

    async fn get_balance(&self, asset: &str) -> Result<f64, ClientError> {
        let body = self.signed_request(Method::GET, "/api/v3/account", &[]).await?;
        let account: AccountInfo = decode(body, "account")?;

        match account.balances.iter().find(|b| b.asset == asset) {
            Some(balance) => parse_str_decimal(&balance.free, "free"),
            None => Ok(0.0),
        }
    }

    async fn get_symbol_constraints(&self, symbol: &str) -> Result<SymbolFilters, ClientError> {
        let body = self
            .public_get("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await
            .map_err(|e| unknown_symbol(symbol, e))?;

        let info: ExchangeInfo = decode(body, "exchangeInfo")?;
        let Some(symbol_info) = info.symbols.iter().find(|s| s.symbol == symbol) else {
            return Err(ClientError::SymbolNotFound(symbol.to_string()));
        };

        let filters = parse_filters(symbol_info)?;
        if let Some(step) = filters.step_size {
            self.quantity_precision
                .write()
                .await
                .insert(symbol.to_string(), step_precision(step));
        }

        tracing::debug!(
            "{} filters: min_notional={:?} step_size={:?}",
            symbol,
            filters.min_notional,
            filters.step_size
        );

        Ok(filters)
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<Fill, ClientError> {
        let precision = self.precision_for(symbol).await;
        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", format_quantity(quantity, precision)),
            ("newClientOrderId", uuid::Uuid::new_v4().simple().to_string()),
            ("newOrderRespType", "FULL".to_string()),
        ];

        let body = self
            .signed_request(Method::POST, "/api/v3/order", &params)
            .await?;
        let order: OrderResponse = decode(body, "order")?;

        let executed = parse_str_decimal(&order.executed_qty, "executedQty")?;
        let quote = parse_str_decimal(&order.cummulative_quote_qty, "cummulativeQuoteQty")?;

        if executed <= 0.0 {
            return Err(ClientError::Malformed(format!(
                "order not filled (status {})",
                order.status
            )));
        }
        if order.status != "FILLED" {
            tracing::warn!(
                "{} {} order ended {}: {} of {} executed",
                symbol,
                side,
                order.status,
                executed,
                quantity
            );
        }

        Ok(Fill {
            price: quote / executed,
            quantity: executed,
        })
    }
}
