use chrono::NaiveDate;
use thiserror::Error;

/// Per-symbol data failure. Never fatal to a ranking or backtest batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("No data for {0}")]
    NotFound(String),

    #[error("Insufficient history for {symbol}: {available} bars")]
    InsufficientHistory { symbol: String, available: usize },

    #[error("Fetch timed out for {0}")]
    Timeout(String),
}

/// Programming or configuration mistake, surfaced at the boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown lookback period: {0}")]
    UnknownPeriod(String),

    #[error("Scoring weights must be non-negative and sum to 1.0 (got {0})")]
    InvalidWeights(f64),

    #[error("Negative quota {value} for sector rank {rank}")]
    NegativeQuota { rank: usize, value: i64 },

    #[error("Malformed date range: {start} .. {end}")]
    MalformedDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Rebalance interval must be positive (got {0} days)")]
    InvalidInterval(i64),

    #[error("Invalid sector universe: {0}")]
    InvalidUniverse(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
