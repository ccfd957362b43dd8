use thiserror::Error;

use crate::api::ClientError;

/// Failure taxonomy of the trading loop.
///
/// Risk rejections are not errors; they travel as [`crate::risk::RiskRejection`].
#[derive(Error, Debug)]
pub enum BotError {
    /// Price, kline or balance fetch failed. The tick is abandoned, state untouched.
    #[error("market data unavailable ({what}): {source}")]
    TransientData {
        what: &'static str,
        #[source]
        source: ClientError,
    },

    /// A fetched series could not be used (unordered, duplicated bars).
    #[error("invalid market data: {0}")]
    InvalidData(String),

    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Order submission failed or returned an inconsistent fill.
    #[error("execution failed: {0}")]
    Execution(String),

    /// A programming-level invariant was broken (e.g. a second open position).
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl BotError {
    pub fn transient(what: &'static str, source: ClientError) -> Self {
        BotError::TransientData { what, source }
    }

    /// Fatal errors stop the run loop; everything else is recovered at the tick boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::Configuration(_) | BotError::Invariant(_))
    }
}
