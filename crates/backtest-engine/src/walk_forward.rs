//! Walk-forward replay of the sector pick pipeline.
//!
//! At each checkpoint sectors are ranked and candidates scored with data that
//! ends the day before the checkpoint. The picks are then held until the next
//! checkpoint and the portfolio compounds their equal-weighted mean return.

use chrono::NaiveDate;
use market_core::{
    ConfigError, DailyBar, FetchError, HistoricalFundamentalsProvider, HistoryRange,
    PriceHistoryProvider,
};
use sector_ranking::fetch::fetch_all;
use sector_ranking::{
    score_participating_sectors, FetchSettings, Pick, QuotaAllocator, RankingError, ScoringWeights,
    SectorRanker, SectorUniverse, StockScorer,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::BacktestError;
use crate::models::*;
use crate::momentum::{MomentumScorer, PointInTimeMetricProvider};

pub struct WalkForwardBacktester {
    universe: Arc<SectorUniverse>,
    prices: Arc<dyn PriceHistoryProvider>,
    fundamentals: Option<Arc<dyn HistoricalFundamentalsProvider>>,
    momentum: MomentumScorer,
    point_in_time: StockScorer,
    allocator: QuotaAllocator,
    fetch: FetchSettings,
    time_budget: Option<std::time::Duration>,
}

impl WalkForwardBacktester {
    pub fn new(universe: Arc<SectorUniverse>, prices: Arc<dyn PriceHistoryProvider>) -> Self {
        Self {
            universe,
            momentum: MomentumScorer::new(prices.clone()),
            prices,
            fundamentals: None,
            point_in_time: StockScorer::five_criteria(),
            allocator: QuotaAllocator::default(),
            fetch: FetchSettings::default(),
            time_budget: None,
        }
    }

    /// Score with the five-criterion weights over fundamentals known at each checkpoint.
    pub fn with_fundamentals(self, fundamentals: Arc<dyn HistoricalFundamentalsProvider>) -> Self {
        self.with_point_in_time_scorer(fundamentals, StockScorer::five_criteria())
    }

    pub fn with_point_in_time_weights(
        self,
        fundamentals: Arc<dyn HistoricalFundamentalsProvider>,
        weights: ScoringWeights,
    ) -> Result<Self, ConfigError> {
        let scorer = StockScorer::new(weights)?;
        Ok(self.with_point_in_time_scorer(fundamentals, scorer))
    }

    fn with_point_in_time_scorer(
        mut self,
        fundamentals: Arc<dyn HistoricalFundamentalsProvider>,
        scorer: StockScorer,
    ) -> Self {
        self.fundamentals = Some(fundamentals);
        self.point_in_time = scorer.with_fetch_settings(self.fetch);
        self
    }

    pub fn with_allocator(mut self, allocator: QuotaAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_fetch_settings(mut self, fetch: FetchSettings) -> Self {
        self.fetch = fetch;
        self.momentum = self.momentum.with_fetch_settings(fetch);
        self.point_in_time = self.point_in_time.with_fetch_settings(fetch);
        self
    }

    /// Stop after this much wall-clock time, keeping the steps done so far.
    pub fn with_time_budget(mut self, budget: std::time::Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn scoring_mode(&self) -> ScoringMode {
        if self.fundamentals.is_some() {
            ScoringMode::PointInTime
        } else {
            ScoringMode::Momentum
        }
    }

    /// Replay checkpoints from `start_date` until `today`.
    ///
    /// Cancellation and the time budget are honored between checkpoints and
    /// while a step is in flight; either returns the steps recorded so far with
    /// `completed = false`.
    pub async fn run(
        &self,
        request: BacktestRequest,
        cancel: &CancellationToken,
    ) -> Result<BacktestReport, BacktestError> {
        request.validate()?;

        tracing::info!(
            "Backtest {} -> {} every {} days, {} lookback, {:?} scoring",
            request.start_date,
            request.today,
            request.rebalance_interval_days,
            request.lookback_period,
            self.scoring_mode()
        );

        let started = Instant::now();
        let mut portfolio_value = INITIAL_PORTFOLIO_VALUE;
        let mut current = request.start_date;
        let mut steps = Vec::new();
        let mut completed = true;

        while current < request.today {
            if let Some(budget) = self.time_budget {
                if started.elapsed() >= budget {
                    tracing::warn!("Backtest time budget exhausted at {}", current);
                    completed = false;
                    break;
                }
            }

            let next = request.next_checkpoint(current);
            let holdings = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                holdings = self.hold_period(&request, current, next) => Some(holdings),
            };
            let Some(holdings) = holdings else {
                tracing::info!("Backtest cancelled at {} after {} steps", current, steps.len());
                completed = false;
                break;
            };

            let step_return_pct = mean_available_return(&holdings);
            portfolio_value *= 1.0 + step_return_pct / 100.0;

            tracing::debug!(
                "{} -> {}: {} holdings, {:+.2}%, value {:.2}",
                current,
                next,
                holdings.len(),
                step_return_pct,
                portfolio_value
            );

            steps.push(BacktestStep {
                checkpoint_date: current,
                next_checkpoint: next,
                portfolio_value,
                step_return_pct,
                symbol_count: holdings.len(),
                holdings,
            });

            current = next;
        }

        let summary = BacktestSummary::from_steps(INITIAL_PORTFOLIO_VALUE, &steps);
        tracing::info!(
            "Backtest finished: {} steps, final value {:.2} ({:+.2}%)",
            summary.steps,
            summary.final_value,
            summary.total_return_pct
        );

        Ok(BacktestReport {
            request,
            scoring: self.scoring_mode(),
            steps,
            summary,
            completed,
        })
    }

    /// Picks made at `checkpoint` with their realized returns up to `next`.
    async fn hold_period(
        &self,
        request: &BacktestRequest,
        checkpoint: NaiveDate,
        next: NaiveDate,
    ) -> Vec<Holding> {
        let picks = self.picks_at(request, checkpoint).await;
        if picks.is_empty() {
            return Vec::new();
        }

        let symbols: Vec<String> = picks.iter().map(|p| p.symbol.clone()).collect();
        let prices = &self.prices;
        let range = HistoryRange::Between {
            start: checkpoint,
            end: next,
        };
        let fetched = fetch_all(&symbols, &self.fetch, |symbol| async move {
            prices.get_history(&symbol, range).await
        })
        .await;

        picks
            .into_iter()
            .zip(fetched)
            .map(|(pick, (_, bars))| Holding {
                return_pct: realized_return(&pick.symbol, bars),
                symbol: pick.symbol,
                sector: pick.sector,
                composite_score: pick.composite_score,
            })
            .collect()
    }

    /// Rank, score, and allocate using data up to the day before `checkpoint`.
    async fn picks_at(&self, request: &BacktestRequest, checkpoint: NaiveDate) -> Vec<Pick> {
        let Some(as_of) = checkpoint.pred_opt() else {
            return Vec::new();
        };

        let ranker = SectorRanker::new(self.universe.clone(), self.prices.clone())
            .with_fetch_settings(self.fetch);
        let ranked = match ranker
            .rank_sectors_as_of(request.lookback_period, request.sort_key, as_of)
            .await
        {
            Ok(ranked) => ranked,
            Err(RankingError::DataUnavailable) => {
                tracing::debug!("No sector data as of {}", as_of);
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Sector ranking failed as of {}: {}", as_of, e);
                return Vec::new();
            }
        };

        let participating = self.allocator.policy().participating();
        let candidates = match &self.fundamentals {
            Some(fundamentals) => {
                let provider = PointInTimeMetricProvider::new(
                    self.prices.clone(),
                    fundamentals.clone(),
                    as_of,
                );
                score_participating_sectors(
                    &self.universe,
                    &ranked,
                    participating,
                    &self.point_in_time,
                    &provider,
                )
                .await
            }
            None => {
                let provider = self.momentum.provider_as_of(as_of);
                score_participating_sectors(
                    &self.universe,
                    &ranked,
                    participating,
                    self.momentum.scorer(),
                    &provider,
                )
                .await
            }
        };

        self.allocator.allocate(&ranked, &candidates)
    }
}

/// Close-to-close return over the bars of one holding period.
///
/// Needs at least two bars; anything less is unavailable.
pub fn realized_return(symbol: &str, bars: Result<Vec<DailyBar>, FetchError>) -> Option<f64> {
    let bars = match bars {
        Ok(bars) => bars,
        Err(e) => {
            tracing::debug!("No holding-period prices for {}: {}", symbol, e);
            return None;
        }
    };
    if bars.len() < 2 {
        return None;
    }
    let entry = bars.first()?.close;
    let exit = bars.last()?.close;
    if entry <= 0.0 {
        return None;
    }
    Some((exit - entry) / entry * 100.0)
}

/// Equal-weighted mean of the available returns; 0 when none.
pub fn mean_available_return(holdings: &[Holding]) -> f64 {
    let available: Vec<f64> = holdings.iter().filter_map(|h| h.return_pct).collect();
    if available.is_empty() {
        return 0.0;
    }
    available.iter().sum::<f64>() / available.len() as f64
}
