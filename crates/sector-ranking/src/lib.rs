//! Sector Ranking
//!
//! Ranks sectors by price or money-flow performance, scores each sector's
//! constituents with a weighted multi-criterion heuristic, and allocates a
//! cross-sector pick list under per-sector quotas.

pub mod allocator;
pub mod error;
pub mod fetch;
pub mod market_health;
pub mod metrics;
pub mod normalizer;
pub mod period;
pub mod picks;
pub mod risk;
pub mod scorer;
pub mod sector_ranker;
pub mod universe;

pub use allocator::{HomeSectorRule, Pick, QuotaAllocator, QuotaPolicy};
pub use error::RankingError;
pub use fetch::FetchSettings;
pub use market_health::{MarketHealth, MarketHealthChecker, MarketStance, MarketStatus};
pub use metrics::{LiveMetricProvider, MetricProvider, MetricSet};
pub use normalizer::normalize;
pub use period::Period;
pub use picks::{score_participating_sectors, PickEngine, PickReport};
pub use risk::RiskTier;
pub use scorer::{NormalizedMetrics, ScoredCandidate, ScoringWeights, StockScorer};
pub use sector_ranker::{SectorPerformance, SectorRanker, SectorSortKey};
pub use universe::{SectorDefinition, SectorUniverse};
