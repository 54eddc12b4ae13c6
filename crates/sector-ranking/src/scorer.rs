//! Stock Scorer
//!
//! Scores the constituents of one sector. Each raw metric is normalized
//! within the sector's candidate set, then combined with configurable weights.

use market_core::{ConfigError, FetchError};
use serde::{Deserialize, Serialize};

use crate::fetch::{fetch_all, FetchSettings};
use crate::metrics::{MetricProvider, MetricSet};
use crate::normalizer::normalize;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Weights for the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub valuation: f64,
    pub growth: f64,
    pub profitability: f64,
    pub momentum: f64,
    #[serde(default)]
    pub revision: f64,
    #[serde(default)]
    pub money_flow: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::five_criteria()
    }
}

impl ScoringWeights {
    /// Valuation, growth, profitability, momentum at 25% each
    pub fn four_criteria() -> Self {
        Self {
            valuation: 0.25,
            growth: 0.25,
            profitability: 0.25,
            momentum: 0.25,
            revision: 0.0,
            money_flow: 0.0,
        }
    }

    /// Four criteria plus analyst revision, 20% each
    pub fn five_criteria() -> Self {
        Self {
            valuation: 0.20,
            growth: 0.20,
            profitability: 0.20,
            momentum: 0.20,
            revision: 0.20,
            money_flow: 0.0,
        }
    }

    pub fn momentum_only() -> Self {
        Self {
            valuation: 0.0,
            growth: 0.0,
            profitability: 0.0,
            momentum: 1.0,
            revision: 0.0,
            money_flow: 0.0,
        }
    }

    /// Preset by name: "four", "five", "momentum"
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "four" | "four_criteria" | "4" => Some(Self::four_criteria()),
            "five" | "five_criteria" | "5" => Some(Self::five_criteria()),
            "momentum" | "momentum_only" => Some(Self::momentum_only()),
            _ => None,
        }
    }

    pub fn sum(&self) -> f64 {
        self.valuation
            + self.growth
            + self.profitability
            + self.momentum
            + self.revision
            + self.money_flow
    }

    /// Weights must be non-negative and sum to 1.0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            self.valuation,
            self.growth,
            self.profitability,
            self.momentum,
            self.revision,
            self.money_flow,
        ];
        let sum = self.sum();
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) || (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::InvalidWeights(sum));
        }
        Ok(())
    }
}

/// Per-metric scores after within-sector normalization, each 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMetrics {
    pub valuation: f64,
    pub growth: f64,
    pub profitability: f64,
    pub momentum: f64,
    pub revision: f64,
    pub money_flow: f64,
}

impl NormalizedMetrics {
    fn composite(&self, w: &ScoringWeights) -> f64 {
        let score = self.valuation * w.valuation
            + self.growth * w.growth
            + self.profitability * w.profitability
            + self.momentum * w.momentum
            + self.revision * w.revision
            + self.money_flow * w.money_flow;
        score.clamp(0.0, 100.0)
    }
}

/// A scored constituent of one sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub symbol: String,
    pub sector: String,
    pub metrics: MetricSet,
    pub normalized: NormalizedMetrics,
    /// Full precision; use `display_score` for output
    pub composite_score: f64,
}

impl ScoredCandidate {
    pub fn display_score(&self) -> f64 {
        (self.composite_score * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone)]
pub struct StockScorer {
    weights: ScoringWeights,
    fetch: FetchSettings,
}

impl StockScorer {
    pub fn new(weights: ScoringWeights) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self {
            weights,
            fetch: FetchSettings::default(),
        })
    }

    /// Scorer ranking on price momentum alone
    pub fn momentum_only() -> Self {
        Self::preset(ScoringWeights::momentum_only())
    }

    pub fn five_criteria() -> Self {
        Self::preset(ScoringWeights::five_criteria())
    }

    fn preset(weights: ScoringWeights) -> Self {
        Self {
            weights,
            fetch: FetchSettings::default(),
        }
    }

    pub fn with_fetch_settings(mut self, fetch: FetchSettings) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Fetch metrics for `symbols` and score them, best first.
    ///
    /// Symbols whose metrics cannot be fetched are dropped.
    pub async fn score_sector(
        &self,
        sector: &str,
        symbols: &[String],
        provider: &dyn MetricProvider,
    ) -> Vec<ScoredCandidate> {
        let fetched = fetch_all(symbols, &self.fetch, |symbol| async move {
            provider.fetch_metrics(&symbol).await
        })
        .await;
        self.score_fetched(sector, fetched)
    }

    /// Drop failed fetches and score the rest.
    pub fn score_fetched(
        &self,
        sector: &str,
        fetched: Vec<(String, Result<MetricSet, FetchError>)>,
    ) -> Vec<ScoredCandidate> {
        let total = fetched.len();
        let metrics: Vec<MetricSet> = fetched
            .into_iter()
            .filter_map(|(symbol, result)| match result {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::debug!("Dropping {} from {}: {}", symbol, sector, e);
                    None
                }
            })
            .collect();

        if metrics.len() < total {
            tracing::warn!("{}: scored {} of {} constituents", sector, metrics.len(), total);
        }

        self.score_metrics(sector, metrics)
    }

    /// Normalize within the set and rank by composite score.
    pub fn score_metrics(&self, sector: &str, metrics: Vec<MetricSet>) -> Vec<ScoredCandidate> {
        if metrics.is_empty() {
            return Vec::new();
        }

        let column =
            |f: fn(&MetricSet) -> f64| normalize(&metrics.iter().map(f).collect::<Vec<_>>());
        let valuation = column(|m| m.valuation_raw);
        let growth = column(|m| m.growth_raw);
        let profitability = column(|m| m.profitability_raw);
        let momentum = column(|m| m.momentum_raw);
        let revision = column(|m| m.revision_raw);
        let money_flow = column(|m| m.money_flow_raw);

        let mut scored: Vec<ScoredCandidate> = metrics
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                let normalized = NormalizedMetrics {
                    valuation: valuation[i],
                    growth: growth[i],
                    profitability: profitability[i],
                    momentum: momentum[i],
                    revision: revision[i],
                    money_flow: money_flow[i],
                };
                ScoredCandidate {
                    symbol: m.symbol.clone(),
                    sector: sector.to_string(),
                    composite_score: normalized.composite(&self.weights),
                    normalized,
                    metrics: m,
                }
            })
            .collect();

        // Stable: ties keep fetch order
        scored.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }
}
