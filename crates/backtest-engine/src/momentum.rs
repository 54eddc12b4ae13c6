//! Metric providers pinned to a past date, and the momentum scorer.
//!
//! Every provider here only reads data dated on or before its `as_of` date,
//! so scores computed at a checkpoint never see the holding period.

use async_trait::async_trait;
use chrono::NaiveDate;
use market_core::{
    DailyBar, FetchError, Fundamentals, HistoricalFundamentalsProvider, HistoryRange,
    PriceHistoryProvider,
};
use sector_ranking::metrics::METRIC_HISTORY_DAYS;
use sector_ranking::{FetchSettings, MetricProvider, MetricSet, ScoredCandidate, StockScorer};
use std::sync::Arc;

async fn bars_as_of(
    prices: &dyn PriceHistoryProvider,
    symbol: &str,
    as_of: NaiveDate,
) -> Result<Vec<DailyBar>, FetchError> {
    let bars = prices
        .get_history(symbol, HistoryRange::ending_at(as_of, METRIC_HISTORY_DAYS))
        .await?;
    if bars.len() < 2 {
        return Err(FetchError::InsufficientHistory {
            symbol: symbol.to_string(),
            available: bars.len(),
        });
    }
    Ok(bars)
}

/// Price-only metrics as of a date; fundamentals stay neutral.
pub struct MomentumMetricProvider {
    prices: Arc<dyn PriceHistoryProvider>,
    as_of: NaiveDate,
}

impl MomentumMetricProvider {
    pub fn new(prices: Arc<dyn PriceHistoryProvider>, as_of: NaiveDate) -> Self {
        Self { prices, as_of }
    }
}

#[async_trait]
impl MetricProvider for MomentumMetricProvider {
    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricSet, FetchError> {
        let bars = bars_as_of(self.prices.as_ref(), symbol, self.as_of).await?;
        Ok(MetricSet::from_prices(symbol, &bars))
    }
}

/// Prices and the fundamentals that had been reported by the date.
pub struct PointInTimeMetricProvider {
    prices: Arc<dyn PriceHistoryProvider>,
    fundamentals: Arc<dyn HistoricalFundamentalsProvider>,
    as_of: NaiveDate,
}

impl PointInTimeMetricProvider {
    pub fn new(
        prices: Arc<dyn PriceHistoryProvider>,
        fundamentals: Arc<dyn HistoricalFundamentalsProvider>,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            prices,
            fundamentals,
            as_of,
        }
    }
}

#[async_trait]
impl MetricProvider for PointInTimeMetricProvider {
    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricSet, FetchError> {
        let (bars, fundamentals) = tokio::join!(
            bars_as_of(self.prices.as_ref(), symbol, self.as_of),
            self.fundamentals.get_fundamentals_as_of(symbol, self.as_of),
        );
        let bars = bars?;
        let fundamentals = fundamentals.unwrap_or_else(|e| {
            tracing::debug!("No fundamentals for {} as of {}: {}", symbol, self.as_of, e);
            Fundamentals::default()
        });
        Ok(MetricSet::from_parts(symbol, &bars, &fundamentals))
    }
}

/// Stock scorer with momentum-only weights over `MomentumMetricProvider`.
pub struct MomentumScorer {
    scorer: StockScorer,
    prices: Arc<dyn PriceHistoryProvider>,
}

impl MomentumScorer {
    pub fn new(prices: Arc<dyn PriceHistoryProvider>) -> Self {
        Self {
            scorer: StockScorer::momentum_only(),
            prices,
        }
    }

    pub fn with_fetch_settings(mut self, fetch: FetchSettings) -> Self {
        self.scorer = self.scorer.with_fetch_settings(fetch);
        self
    }

    pub fn scorer(&self) -> &StockScorer {
        &self.scorer
    }

    pub fn provider_as_of(&self, as_of: NaiveDate) -> MomentumMetricProvider {
        MomentumMetricProvider::new(self.prices.clone(), as_of)
    }

    pub async fn score_sector_as_of(
        &self,
        sector: &str,
        symbols: &[String],
        as_of: NaiveDate,
    ) -> Vec<ScoredCandidate> {
        let provider = self.provider_as_of(as_of);
        self.scorer.score_sector(sector, symbols, &provider).await
    }
}
