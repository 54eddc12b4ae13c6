use market_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RankingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Every configured sector failed to fetch. Distinct from an empty result.
    #[error("Market data unavailable: no sector could be fetched")]
    DataUnavailable,
}
