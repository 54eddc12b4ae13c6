use market_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    #[error("Invalid backtest request: {0}")]
    Config(#[from] ConfigError),
}
