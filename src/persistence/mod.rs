use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::models::TradeEvent;

/// Sink for trade lifecycle events
///
/// Failures here never undo a trade; callers log and continue.
pub trait TradeRecorder: Send {
    fn record(&mut self, event: &TradeEvent) -> Result<()>;
}

/// One CSV row. Entry rows leave the exit-only columns empty.
#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    timestamp: String,
    symbol: &'a str,
    side: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    entry_price: f64,
    exit_price: Option<f64>,
    quantity: f64,
    pnl: Option<f64>,
    pnl_pct: Option<f64>,
    fee: Option<f64>,
    reason: Option<&'static str>,
    duration_minutes: Option<f64>,
}

const HEADER: [&str; 12] = [
    "timestamp",
    "symbol",
    "side",
    "type",
    "entry_price",
    "exit_price",
    "quantity",
    "pnl",
    "pnl_pct",
    "fee",
    "reason",
    "duration_minutes",
];

fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

impl<'a> TradeRow<'a> {
    fn from_event(event: &'a TradeEvent) -> Self {
        match event {
            TradeEvent::Entry {
                symbol,
                side,
                price,
                quantity,
                timestamp,
            } => TradeRow {
                timestamp: timestamp.to_rfc3339(),
                symbol,
                side: side.as_str(),
                kind: "ENTRY",
                entry_price: *price,
                exit_price: None,
                quantity: *quantity,
                pnl: None,
                pnl_pct: None,
                fee: None,
                reason: None,
                duration_minutes: None,
            },
            TradeEvent::Exit {
                symbol,
                side,
                entry_price,
                exit_price,
                quantity,
                reason,
                duration_minutes,
                pnl,
                pnl_pct,
                fee,
                timestamp,
            } => TradeRow {
                timestamp: timestamp.to_rfc3339(),
                symbol,
                side: side.as_str(),
                kind: "EXIT",
                entry_price: *entry_price,
                exit_price: Some(*exit_price),
                quantity: *quantity,
                pnl: Some(round_dp(*pnl, 8)),
                pnl_pct: Some(round_dp(*pnl_pct, 2)),
                fee: Some(*fee),
                reason: Some(reason.as_str()),
                duration_minutes: Some(round_dp(*duration_minutes, 2)),
            },
        }
    }
}

/// Append-only CSV trade history
#[derive(Debug, Clone)]
pub struct CsvTradeLog {
    path: PathBuf,
}

impl CsvTradeLog {
    /// Open (or create with a header row) the trade log at `path`
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let needs_header = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        if needs_header {
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("Failed to create trade log {}", path.display()))?;
            writer.write_record(HEADER)?;
            writer.flush()?;
            tracing::info!("Created trade log at {}", path.display());
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TradeRecorder for CsvTradeLog {
    fn record(&mut self, event: &TradeEvent) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open trade log {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(TradeRow::from_event(event))?;
        writer.flush()?;

        tracing::debug!("Trade event for {} written to {}", event.symbol(), self.path.display());

        Ok(())
    }
}
