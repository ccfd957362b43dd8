use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::BotError;

const LOG_FILE_PREFIX: &str = "bot.log";
const FILE_FILTER: &str = "spotbot=debug,warn";

/// Console directive when RUST_LOG is not set
pub fn default_filter(level: &str) -> String {
    format!("spotbot={level},warn")
}

/// Install the global subscriber: stdout at `level` (or RUST_LOG) plus a
/// daily-rotated debug file in `log_dir`.
///
/// Keep the returned guard alive for the life of the process or buffered
/// file output is lost.
pub fn init(log_dir: &Path, level: &str) -> Result<WorkerGuard, BotError> {
    std::fs::create_dir_all(log_dir).map_err(|e| {
        BotError::Configuration(format!("cannot create log dir {}: {}", log_dir.display(), e))
    })?;

    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(level)))
        .map_err(|e| BotError::Configuration(format!("invalid log level {:?}: {}", level, e)))?;
    let file_filter = EnvFilter::try_new(FILE_FILTER)
        .map_err(|e| BotError::Configuration(format!("invalid file log filter: {}", e)))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(console_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(file_filter),
        )
        .try_init()
        .map_err(|e| BotError::Configuration(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}
