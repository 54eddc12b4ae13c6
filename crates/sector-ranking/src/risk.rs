//! Risk tier and suggested stop-loss for a pick, from realized volatility.

use market_core::DailyBar;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

/// Daily volatility below this is low risk, in percent
pub const LOW_RISK_MAX_VOLATILITY: f64 = 2.0;
/// Daily volatility below this (and above the low band) is medium risk
pub const MEDIUM_RISK_MAX_VOLATILITY: f64 = 3.5;

/// Stop-loss distance in daily standard deviations
const STOP_LOSS_SIGMAS: f64 = 3.0;
const MIN_STOP_LOSS_PCT: f64 = 5.0;
const MAX_STOP_LOSS_PCT: f64 = 20.0;
/// Used when there is too little history to measure volatility
const DEFAULT_STOP_LOSS_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Tier for a daily volatility in percent. Unknown volatility is medium.
    pub fn from_volatility(volatility_pct: Option<f64>) -> Self {
        match volatility_pct {
            Some(v) if v < LOW_RISK_MAX_VOLATILITY => RiskTier::Low,
            Some(v) if v < MEDIUM_RISK_MAX_VOLATILITY => RiskTier::Medium,
            Some(_) => RiskTier::High,
            None => RiskTier::Medium,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        };
        f.pad(label)
    }
}

/// Sample standard deviation of close-to-close returns, in percent.
///
/// Needs at least two returns (three bars) with positive closes.
pub fn daily_volatility_pct(bars: &[DailyBar]) -> Option<f64> {
    let returns: Vec<f64> = bars
        .windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| (w[1].close / w[0].close - 1.0) * 100.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }
    Some(returns.iter().std_dev()).filter(|v| v.is_finite())
}

/// Suggested stop-loss as a negative percent below the entry price.
pub fn stop_loss_pct(volatility_pct: Option<f64>) -> f64 {
    let distance = match volatility_pct {
        Some(v) => (v * STOP_LOSS_SIGMAS).clamp(MIN_STOP_LOSS_PCT, MAX_STOP_LOSS_PCT),
        None => DEFAULT_STOP_LOSS_PCT,
    };
    -distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series(closes: &[f64]) -> Vec<DailyBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| DailyBar::flat(start + Duration::days(i as i64), *c, 1000.0))
            .collect()
    }

    #[test]
    fn test_tier_bands() {
        assert_eq!(RiskTier::from_volatility(Some(0.8)), RiskTier::Low);
        assert_eq!(RiskTier::from_volatility(Some(2.0)), RiskTier::Medium);
        assert_eq!(RiskTier::from_volatility(Some(3.49)), RiskTier::Medium);
        assert_eq!(RiskTier::from_volatility(Some(3.5)), RiskTier::High);
        assert_eq!(RiskTier::from_volatility(None), RiskTier::Medium);
    }

    #[test]
    fn test_volatility_of_alternating_moves() {
        // +10%, -10%, +10%, -10%
        let bars = series(&[100.0, 110.0, 99.0, 108.9, 98.01]);
        let vol = daily_volatility_pct(&bars).unwrap();
        // sample std dev of [10, -10, 10, -10] is sqrt(400/3)
        assert!((vol - (400.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(RiskTier::from_volatility(Some(vol)), RiskTier::High);

        assert_eq!(daily_volatility_pct(&series(&[10.0; 10])), Some(0.0));
        assert!(daily_volatility_pct(&series(&[10.0, 11.0])).is_none());
    }

    #[test]
    fn test_stop_loss_bounds() {
        assert_eq!(stop_loss_pct(Some(0.5)), -5.0);
        assert!((stop_loss_pct(Some(2.5)) + 7.5).abs() < 1e-9);
        assert_eq!(stop_loss_pct(Some(12.0)), -20.0);
        assert_eq!(stop_loss_pct(None), -10.0);
    }

    #[test]
    fn test_serde_and_display() {
        assert_eq!(serde_json::to_string(&RiskTier::High).unwrap(), "\"high\"");
        assert_eq!(RiskTier::Low.to_string(), "low");
    }
}
