// Risk management module
pub mod sizing;

pub use sizing::{
    round_to_step_size, step_precision, RiskConfig, RiskManager, RiskMetrics, RiskRejection,
    Sizing,
};
