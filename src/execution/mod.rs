// Order execution, market data windows and the trading loop
pub mod candle_window;
pub mod executor;
pub mod market_feed;
pub mod position_tracker;
pub mod trader;

pub use candle_window::{validate_series, CandleWindow};
pub use executor::{ExecutionMode, OrderExecutor};
pub use market_feed::MarketFeed;
pub use position_tracker::{calculate_pnl, ClosedTrade, PositionTracker};
pub use trader::{resolve_constraints, BotSettings, TickOutcome, TradingBot};
