//! Raw per-symbol metrics
//!
//! Turns price history and fundamentals into the six raw inputs the stock
//! scorer normalizes. Missing inputs fall back to neutral values.

use crate::risk::daily_volatility_pct;
use async_trait::async_trait;
use market_core::{
    DailyBar, FetchError, Fundamentals, FundamentalsProvider, HistoryRange, PriceHistoryProvider,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Trading days in a week / month for momentum blending
pub const WEEK_LOOKBACK: usize = 5;
pub const MONTH_LOOKBACK: usize = 21;

/// Calendar days of history needed to cover `MONTH_LOOKBACK`
pub const METRIC_HISTORY_DAYS: u32 = 45;

/// Neutral revision score when no analyst data exists
pub const NEUTRAL_REVISION: f64 = 50.0;

/// Upper cap for the inverted P/E
pub const VALUATION_CAP: f64 = 100.0;

/// Raw, un-normalized inputs for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub symbol: String,
    /// Earnings yield from the P/E, capped at 100
    pub valuation_raw: f64,
    /// Revenue growth in percent
    pub growth_raw: f64,
    /// Profit margin in percent
    pub profitability_raw: f64,
    /// Blended weekly/monthly price change in percent
    pub momentum_raw: f64,
    /// Analyst recommendation mapped to 0..=100
    pub revision_raw: f64,
    /// Weekly change scaled by relative volume
    pub money_flow_raw: f64,
    pub last_close: Option<f64>,
    pub daily_change_pct: Option<f64>,
    /// Standard deviation of daily returns in percent
    #[serde(default)]
    pub volatility_pct: Option<f64>,
}

impl MetricSet {
    /// Build from price history (ascending) and fundamentals.
    pub fn from_parts(symbol: &str, bars: &[DailyBar], fundamentals: &Fundamentals) -> Self {
        let has_series = bars.len() >= 2;

        let momentum_raw = if has_series {
            0.4 * change_pct(bars, WEEK_LOOKBACK).unwrap_or(0.0)
                + 0.6 * change_pct(bars, MONTH_LOOKBACK).unwrap_or(0.0)
        } else {
            0.0
        };

        let money_flow_raw = if has_series {
            change_pct(bars, WEEK_LOOKBACK).unwrap_or(0.0) * relative_volume(bars)
        } else {
            0.0
        };

        Self {
            symbol: symbol.to_string(),
            valuation_raw: valuation_score(fundamentals.forward_pe),
            growth_raw: finite_or(fundamentals.revenue_growth.map(|g| g * 100.0), 0.0),
            profitability_raw: finite_or(fundamentals.profit_margin.map(|m| m * 100.0), 0.0),
            momentum_raw: finite_or(Some(momentum_raw), 0.0),
            revision_raw: revision_score(fundamentals.analyst_recommendation_mean),
            money_flow_raw: finite_or(Some(money_flow_raw), 0.0),
            last_close: bars.last().map(|b| b.close),
            daily_change_pct: if has_series { change_pct(bars, 1) } else { None },
            volatility_pct: daily_volatility_pct(bars),
        }
    }

    /// Metrics from price history alone; fundamentals sit at their neutral values.
    pub fn from_prices(symbol: &str, bars: &[DailyBar]) -> Self {
        Self::from_parts(symbol, bars, &Fundamentals::default())
    }
}

/// Percent change from the close `lookback` bars back to the latest close.
///
/// With fewer bars than the lookback the earliest bar is the baseline.
/// Returns `None` for an empty series or a non-positive baseline.
pub fn change_pct(bars: &[DailyBar], lookback: usize) -> Option<f64> {
    let last = bars.last()?;
    let base_idx = if bars.len() > lookback { bars.len() - 1 - lookback } else { 0 };
    let base = bars[base_idx].close;
    if base <= 0.0 {
        return None;
    }
    Some((last.close - base) / base * 100.0)
}

/// Mean volume of the last week relative to the last month. 1.0 when undefined.
pub fn relative_volume(bars: &[DailyBar]) -> f64 {
    let recent = mean_volume(tail(bars, WEEK_LOOKBACK));
    let month = mean_volume(tail(bars, MONTH_LOOKBACK));
    match (recent, month) {
        (Some(r), Some(m)) if m > 0.0 => r / m,
        _ => 1.0,
    }
}

pub(crate) fn tail(bars: &[DailyBar], n: usize) -> &[DailyBar] {
    &bars[bars.len().saturating_sub(n)..]
}

pub(crate) fn mean_volume(bars: &[DailyBar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    Some(bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64)
}

fn valuation_score(pe: Option<f64>) -> f64 {
    match pe {
        Some(pe) if pe > 0.0 && pe.is_finite() => (100.0 / pe).min(VALUATION_CAP),
        _ => 0.0,
    }
}

fn revision_score(recommendation_mean: Option<f64>) -> f64 {
    match recommendation_mean {
        Some(mean) if mean.is_finite() => ((5.0 - mean) / 4.0 * 100.0).clamp(0.0, 100.0),
        _ => NEUTRAL_REVISION,
    }
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

/// Supplies a `MetricSet` per symbol
#[async_trait]
pub trait MetricProvider: Send + Sync {
    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricSet, FetchError>;
}

/// Current metrics from live price and fundamentals providers
pub struct LiveMetricProvider {
    prices: Arc<dyn PriceHistoryProvider>,
    fundamentals: Arc<dyn FundamentalsProvider>,
}

impl LiveMetricProvider {
    pub fn new(
        prices: Arc<dyn PriceHistoryProvider>,
        fundamentals: Arc<dyn FundamentalsProvider>,
    ) -> Self {
        Self { prices, fundamentals }
    }
}

#[async_trait]
impl MetricProvider for LiveMetricProvider {
    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricSet, FetchError> {
        let (bars, fundamentals) = tokio::join!(
            self.prices.get_history(symbol, HistoryRange::Recent { days: METRIC_HISTORY_DAYS }),
            self.fundamentals.get_fundamentals(symbol),
        );

        let bars = bars?;
        if bars.len() < 2 {
            return Err(FetchError::InsufficientHistory {
                symbol: symbol.to_string(),
                available: bars.len(),
            });
        }

        let fundamentals = fundamentals.unwrap_or_else(|e| {
            tracing::debug!("Fundamentals unavailable for {}, using neutral values: {}", symbol, e);
            Fundamentals::default()
        });

        Ok(MetricSet::from_parts(symbol, &bars, &fundamentals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use market_core::InMemoryMarketData;

    fn series(closes: &[f64]) -> Vec<DailyBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| DailyBar::flat(start + Duration::days(i as i64), *c, 1000.0))
            .collect()
    }

    #[test]
    fn test_change_pct_full_lookback() {
        let bars = series(&[100.0, 90.0, 95.0, 110.0]);
        assert!((change_pct(&bars, 2).unwrap() - 22.222222222).abs() < 1e-6);
        assert!((change_pct(&bars, 1).unwrap() - 15.789473684).abs() < 1e-6);
    }

    #[test]
    fn test_change_pct_falls_back_to_earliest() {
        // 40 bars available for a 252-day lookback
        let closes: Vec<f64> = (0..40).map(|i| 50.0 + i as f64).collect();
        let bars = series(&closes);
        let change = change_pct(&bars, 252).unwrap();
        assert!((change - (89.0 - 50.0) / 50.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_change_pct_edge_cases() {
        assert!(change_pct(&[], 5).is_none());
        assert_eq!(change_pct(&series(&[10.0]), 5), Some(0.0));
        assert!(change_pct(&series(&[0.0, 1.0]), 1).is_none());
    }

    #[test]
    fn test_neutral_defaults() {
        let m = MetricSet::from_parts("X", &series(&[10.0]), &Fundamentals::default());
        assert_eq!(m.valuation_raw, 0.0);
        assert_eq!(m.growth_raw, 0.0);
        assert_eq!(m.profitability_raw, 0.0);
        assert_eq!(m.momentum_raw, 0.0);
        assert_eq!(m.revision_raw, NEUTRAL_REVISION);
        assert_eq!(m.money_flow_raw, 0.0);
        assert_eq!(m.last_close, Some(10.0));
        assert!(m.daily_change_pct.is_none());
        assert!(m.volatility_pct.is_none());
    }

    #[test]
    fn test_fundamental_mappings() {
        let f = Fundamentals {
            forward_pe: Some(20.0),
            revenue_growth: Some(0.15),
            profit_margin: Some(0.3),
            analyst_recommendation_mean: Some(2.0),
        };
        let m = MetricSet::from_parts("X", &series(&[10.0, 11.0]), &f);
        assert!((m.valuation_raw - 5.0).abs() < 1e-9);
        assert!((m.growth_raw - 15.0).abs() < 1e-9);
        assert!((m.profitability_raw - 30.0).abs() < 1e-9);
        assert!((m.revision_raw - 75.0).abs() < 1e-9);

        // Tiny P/E is capped, negative P/E is neutral
        let cheap = Fundamentals { forward_pe: Some(0.5), ..Default::default() };
        assert_eq!(MetricSet::from_prices("X", &[]).valuation_raw, 0.0);
        assert_eq!(MetricSet::from_parts("X", &[], &cheap).valuation_raw, VALUATION_CAP);
        let loss = Fundamentals { forward_pe: Some(-8.0), ..Default::default() };
        assert_eq!(MetricSet::from_parts("X", &[], &loss).valuation_raw, 0.0);
    }

    #[test]
    fn test_momentum_blend() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = series(&closes);
        let week = change_pct(&bars, 5).unwrap();
        let month = change_pct(&bars, 21).unwrap();
        let m = MetricSet::from_prices("X", &bars);
        assert!((m.momentum_raw - (0.4 * week + 0.6 * month)).abs() < 1e-9);
        // Flat volume -> relative volume 1.0
        assert!((m.money_flow_raw - week).abs() < 1e-9);
        // Steady one-point steps are well under 1% a day
        assert!(m.volatility_pct.unwrap() < 1.0);
    }

    #[test]
    fn test_relative_volume_spike() {
        let mut bars = series(&[10.0; 21]);
        for bar in bars.iter_mut().rev().take(5) {
            bar.volume = 3000.0;
        }
        // last 5 avg 3000, 21 avg (16*1000 + 5*3000)/21
        let expected = 3000.0 / (31000.0 / 21.0);
        assert!((relative_volume(&bars) - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_live_provider_tolerates_missing_fundamentals() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
        let data = Arc::new(
            InMemoryMarketData::new()
                .with_today(today)
                .with_bars("AAA", series(&[10.0, 11.0, 12.0]))
                .with_bars("ONE", series(&[10.0])),
        );
        let provider = LiveMetricProvider::new(data.clone(), data);

        let m = provider.fetch_metrics("AAA").await.unwrap();
        assert_eq!(m.revision_raw, NEUTRAL_REVISION);
        assert_eq!(m.last_close, Some(12.0));

        assert!(matches!(
            provider.fetch_metrics("ONE").await,
            Err(FetchError::InsufficientHistory { available: 1, .. })
        ));
        assert!(provider.fetch_metrics("NONE").await.is_err());
    }
}
