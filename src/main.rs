use anyhow::{Context, Result};
use clap::Parser;
use spotbot::api::{BinanceClient, Credentials, MarketClient};
use spotbot::config::{BotConfig, DEFAULT_CONFIG_PATH};
use spotbot::execution::{resolve_constraints, BotSettings, ExecutionMode, TradingBot};
use spotbot::persistence::CsvTradeLog;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "spotbot", about = "Multi-timeframe trend-following spot trading bot")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Simulate orders regardless of the config file
    #[arg(long, conflicts_with = "live")]
    dry_run: bool,

    /// Submit real orders regardless of the config file
    #[arg(long)]
    live: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config = BotConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let _log_guard = spotbot::logging::init(&config.paths.log_dir, &config.bot.log_level)
        .context("Failed to initialise logging")?;

    tracing::info!("🚀 spotbot starting");

    let mut settings = BotSettings::from_config(&config);
    if cli.dry_run {
        settings.mode = ExecutionMode::DryRun;
    } else if cli.live {
        settings.mode = ExecutionMode::Live;
    }
    if settings.mode == ExecutionMode::Live {
        tracing::warn!("⚠️  LIVE TRADING: real orders will be submitted");
    }

    let credentials = Credentials::from_env().context("Missing exchange credentials")?;
    if credentials.testnet {
        tracing::info!("Using Binance spot testnet");
    }
    let client: Arc<dyn MarketClient> =
        Arc::new(BinanceClient::new(credentials).context("Failed to build exchange client")?);

    let constraints = resolve_constraints(
        client.as_ref(),
        &settings.symbol,
        config.fallback_constraints(),
    )
    .await
    .context("Failed to load symbol constraints")?;

    let trade_log = CsvTradeLog::new(&config.paths.trade_log).context("Failed to open trade log")?;

    let mut bot = TradingBot::new(settings, client, constraints, Box::new(trade_log));
    bot.log_startup();
    tracing::info!("Press Ctrl+C to stop...");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("⚠️  Received Ctrl+C, shutting down...");
    };

    let result = bot.run(shutdown).await;
    tracing::info!("👋 spotbot stopped");

    result.context("Trading loop stopped on a fatal error")
}
