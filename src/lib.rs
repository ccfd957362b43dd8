// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{ClientError, MarketClient};
pub use error::BotError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
