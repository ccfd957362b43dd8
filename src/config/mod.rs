use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::BotError;
use crate::indicators::IndicatorSettings;
use crate::models::ExchangeConstraints;
use crate::risk::RiskConfig;
use crate::strategy::SignalConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yml";
const ENV_PREFIX: &str = "SPOTBOT";
const ENV_SEPARATOR: &str = "__";

/// Typed process configuration, validated once at load
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub trading: TradingSection,
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub risk: RiskSection,
    #[serde(default)]
    pub bot: LoopSection,
    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingSection {
    pub symbol: String,
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategySection {
    #[serde(default)]
    pub timeframes: Timeframes,
    #[serde(default)]
    pub indicators: IndicatorSettings,
    #[serde(default)]
    pub entry: EntrySection,
    #[serde(default)]
    pub exit: ExitSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timeframes {
    pub fast: String,
    pub slow: String,
}

impl Default for Timeframes {
    fn default() -> Self {
        Self {
            fast: "5m".to_string(),
            slow: "15m".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntrySection {
    pub rsi_min: f64,
    pub rsi_max: f64,
}

impl Default for EntrySection {
    fn default() -> Self {
        let signal = SignalConfig::default();
        Self {
            rsi_min: signal.rsi_min,
            rsi_max: signal.rsi_max,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExitSection {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub max_duration_minutes: f64,
}

impl Default for ExitSection {
    fn default() -> Self {
        let signal = SignalConfig::default();
        Self {
            take_profit_pct: signal.take_profit_pct,
            stop_loss_pct: signal.stop_loss_pct,
            max_duration_minutes: signal.max_duration_minutes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskSection {
    pub max_risk_per_trade_pct: f64,
    pub max_open_positions: usize,
    /// Used only when the exchange does not know the symbol or omits the filter
    #[serde(default = "default_fallback_min_notional")]
    pub fallback_min_notional: f64,
    #[serde(default = "default_fallback_step_size")]
    pub fallback_step_size: f64,
}

impl Default for RiskSection {
    fn default() -> Self {
        let risk = RiskConfig::default();
        Self {
            max_risk_per_trade_pct: risk.max_risk_per_trade_pct,
            max_open_positions: risk.max_open_positions,
            fallback_min_notional: default_fallback_min_notional(),
            fallback_step_size: default_fallback_step_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopSection {
    #[serde(default = "default_loop_interval")]
    pub loop_interval_seconds: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_kline_limit")]
    pub kline_limit: usize,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            loop_interval_seconds: default_loop_interval(),
            log_level: default_log_level(),
            kline_limit: default_kline_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_trade_log")]
    pub trade_log: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            trade_log: default_trade_log(),
        }
    }
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}
fn default_true() -> bool {
    true
}
fn default_fallback_min_notional() -> f64 {
    10.0
}
fn default_fallback_step_size() -> f64 {
    0.00001
}
fn default_loop_interval() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_kline_limit() -> usize {
    250
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_trade_log() -> PathBuf {
    PathBuf::from("logs/trades.csv")
}

impl BotConfig {
    /// Load `path` and layer `SPOTBOT__SECTION__KEY` environment overrides on top
    pub fn load(path: &Path) -> Result<Self, BotError> {
        if !path.exists() {
            return Err(BotError::Configuration(format!(
                "configuration file not found: {} (copy config/config.example.yml)",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| BotError::Configuration(e.to_string()))?;

        let config: BotConfig = settings
            .try_deserialize()
            .map_err(|e| BotError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse YAML text without environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<Self, BotError> {
        let config: BotConfig = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BotError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BotError> {
        let invalid = |msg: String| -> Result<(), BotError> { Err(BotError::Configuration(msg)) };

        if self.trading.symbol.trim().is_empty() {
            return invalid("trading.symbol must not be empty".into());
        }
        if self.trading.quote_asset.trim().is_empty() {
            return invalid("trading.quote_asset must not be empty".into());
        }
        if self.strategy.timeframes.fast.trim().is_empty()
            || self.strategy.timeframes.slow.trim().is_empty()
        {
            return invalid("strategy.timeframes must name both fast and slow".into());
        }

        let ind = &self.strategy.indicators;
        if ind.ema_fast == 0 || ind.ema_slow == 0 || ind.rsi_period == 0 || ind.volume_sma == 0 {
            return invalid(format!("indicator periods must be positive: {:?}", ind));
        }
        if ind.ema_fast >= ind.ema_slow {
            return invalid(format!(
                "ema_fast ({}) must be shorter than ema_slow ({})",
                ind.ema_fast, ind.ema_slow
            ));
        }

        let entry = &self.strategy.entry;
        let in_band = |v: f64| (0.0..=100.0).contains(&v);
        if !in_band(entry.rsi_min) || !in_band(entry.rsi_max) || entry.rsi_min > entry.rsi_max {
            return invalid(format!(
                "RSI band {}-{} must lie within 0-100 with min <= max",
                entry.rsi_min, entry.rsi_max
            ));
        }

        let exit = &self.strategy.exit;
        if !(exit.take_profit_pct > 0.0) {
            return invalid(format!("take_profit_pct must be positive: {}", exit.take_profit_pct));
        }
        if !(exit.stop_loss_pct > 0.0 && exit.stop_loss_pct < 100.0) {
            return invalid(format!(
                "stop_loss_pct must be within (0, 100): {}",
                exit.stop_loss_pct
            ));
        }
        if !(exit.max_duration_minutes > 0.0) {
            return invalid(format!(
                "max_duration_minutes must be positive: {}",
                exit.max_duration_minutes
            ));
        }

        let risk = &self.risk;
        if !(risk.max_risk_per_trade_pct > 0.0 && risk.max_risk_per_trade_pct <= 100.0) {
            return invalid(format!(
                "max_risk_per_trade_pct must be within (0, 100]: {}",
                risk.max_risk_per_trade_pct
            ));
        }
        if risk.max_open_positions == 0 {
            return invalid("max_open_positions must be at least 1".into());
        }
        if !(risk.fallback_min_notional > 0.0 && risk.fallback_step_size > 0.0) {
            return invalid("fallback_min_notional and fallback_step_size must be positive".into());
        }

        if self.bot.loop_interval_seconds == 0 {
            return invalid("loop_interval_seconds must be at least 1".into());
        }
        if self.bot.kline_limit < ind.min_history() {
            return invalid(format!(
                "kline_limit ({}) is below the minimum indicator history ({})",
                self.bot.kline_limit,
                ind.min_history()
            ));
        }
        // RSI has no value until bar `rsi_period`, so the window must be longer
        if self.bot.kline_limit <= ind.rsi_period {
            return invalid(format!(
                "kline_limit ({}) must exceed rsi_period ({})",
                self.bot.kline_limit, ind.rsi_period
            ));
        }

        Ok(())
    }

    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            indicators: self.strategy.indicators,
            rsi_min: self.strategy.entry.rsi_min,
            rsi_max: self.strategy.entry.rsi_max,
            take_profit_pct: self.strategy.exit.take_profit_pct,
            stop_loss_pct: self.strategy.exit.stop_loss_pct,
            max_duration_minutes: self.strategy.exit.max_duration_minutes,
        }
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            max_risk_per_trade_pct: self.risk.max_risk_per_trade_pct,
            max_open_positions: self.risk.max_open_positions,
        }
    }

    pub fn fallback_constraints(&self) -> ExchangeConstraints {
        ExchangeConstraints {
            min_notional: self.risk.fallback_min_notional,
            step_size: self.risk.fallback_step_size,
        }
    }
}
