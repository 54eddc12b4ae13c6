//! Live pick pipeline: rank sectors, score the leaders, allocate picks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::allocator::{Pick, QuotaAllocator};
use crate::error::RankingError;
use crate::metrics::MetricProvider;
use crate::period::Period;
use crate::scorer::{ScoredCandidate, StockScorer};
use crate::sector_ranker::{SectorPerformance, SectorRanker, SectorSortKey};
use crate::universe::SectorUniverse;

/// The three tables behind a morning report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickReport {
    pub period: Period,
    pub sort_key: SectorSortKey,
    pub sectors: Vec<SectorPerformance>,
    pub candidates_by_sector: HashMap<String, Vec<ScoredCandidate>>,
    pub picks: Vec<Pick>,
    pub generated_at: DateTime<Utc>,
}

/// Score the constituents of the first `participating` sectors of `ranked`.
pub async fn score_participating_sectors<S: AsRef<str>>(
    universe: &SectorUniverse,
    ranked: &[S],
    participating: usize,
    scorer: &StockScorer,
    provider: &dyn MetricProvider,
) -> HashMap<String, Vec<ScoredCandidate>> {
    let mut candidates = HashMap::new();
    for sector in ranked.iter().take(participating).map(|s| s.as_ref()) {
        let Some(def) = universe.sector(sector) else {
            tracing::warn!("Ranked sector {} missing from universe {}", sector, universe.market);
            continue;
        };
        let scored = scorer.score_sector(sector, &def.constituents, provider).await;
        tracing::debug!("{}: {} candidates scored", sector, scored.len());
        candidates.insert(sector.to_string(), scored);
    }
    candidates
}

pub struct PickEngine {
    ranker: SectorRanker,
    scorer: StockScorer,
    allocator: QuotaAllocator,
    metrics: Arc<dyn MetricProvider>,
}

impl PickEngine {
    pub fn new(
        ranker: SectorRanker,
        scorer: StockScorer,
        allocator: QuotaAllocator,
        metrics: Arc<dyn MetricProvider>,
    ) -> Self {
        Self {
            ranker,
            scorer,
            allocator,
            metrics,
        }
    }

    pub async fn build_picks(
        &self,
        period: Period,
        sort_key: SectorSortKey,
    ) -> Result<PickReport, RankingError> {
        let sectors = self.ranker.rank_sectors(period, sort_key).await?;

        let candidates_by_sector = score_participating_sectors(
            self.ranker.universe(),
            &sectors,
            self.allocator.policy().participating(),
            &self.scorer,
            self.metrics.as_ref(),
        )
        .await;

        let picks = self.allocator.allocate(&sectors, &candidates_by_sector);
        tracing::info!(
            "Built {} picks from {} sectors ({} by {})",
            picks.len(),
            sectors.len(),
            period,
            sort_key
        );

        Ok(PickReport {
            period,
            sort_key,
            sectors,
            candidates_by_sector,
            picks,
            generated_at: Utc::now(),
        })
    }
}
