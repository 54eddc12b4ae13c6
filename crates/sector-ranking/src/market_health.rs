//! Market health gauge based on the volatility index.

use market_core::{FetchError, HistoryRange, PriceHistoryProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_VOLATILITY_SYMBOL: &str = "I:VIX";
pub const DEFAULT_RISK_THRESHOLD: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Safe,
    Risky,
}

/// Suggested posture for new positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStance {
    Accumulate,
    RaiseCash,
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Safe => write!(f, "SAFE"),
            MarketStatus::Risky => write!(f, "RISKY"),
        }
    }
}

impl fmt::Display for MarketStance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStance::Accumulate => write!(f, "Buying allowed"),
            MarketStance::RaiseCash => write!(f, "Move to cash"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHealth {
    pub symbol: String,
    pub vix: f64,
    pub status: MarketStatus,
    pub stance: MarketStance,
}

impl MarketHealth {
    /// Below the threshold is safe; at or above it is risky.
    pub fn classify(symbol: &str, vix: f64, threshold: f64) -> Self {
        let (status, stance) = if vix < threshold {
            (MarketStatus::Safe, MarketStance::Accumulate)
        } else {
            (MarketStatus::Risky, MarketStance::RaiseCash)
        };
        Self {
            symbol: symbol.to_string(),
            vix,
            status,
            stance,
        }
    }
}

pub struct MarketHealthChecker {
    prices: Arc<dyn PriceHistoryProvider>,
    symbol: String,
    threshold: f64,
}

impl MarketHealthChecker {
    pub fn new(prices: Arc<dyn PriceHistoryProvider>) -> Self {
        Self {
            prices,
            symbol: DEFAULT_VOLATILITY_SYMBOL.to_string(),
            threshold: DEFAULT_RISK_THRESHOLD,
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = symbol.to_string();
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub async fn check(&self) -> Result<MarketHealth, FetchError> {
        // A week covers weekends and holidays
        let bars = self.prices.get_history(&self.symbol, HistoryRange::Recent { days: 7 }).await?;
        let last = bars.last().ok_or_else(|| FetchError::NotFound(self.symbol.clone()))?;

        let health = MarketHealth::classify(&self.symbol, last.close, self.threshold);
        tracing::info!("{} at {:.2}: {}", self.symbol, health.vix, health.status);
        Ok(health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use market_core::{DailyBar, InMemoryMarketData};

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(MarketHealth::classify("I:VIX", 14.2, 25.0).status, MarketStatus::Safe);
        let at = MarketHealth::classify("I:VIX", 25.0, 25.0);
        assert_eq!(at.status, MarketStatus::Risky);
        assert_eq!(at.stance, MarketStance::RaiseCash);
    }

    #[tokio::test]
    async fn test_check_uses_latest_close() {
        let today = NaiveDate::from_ymd_opt(2024, 8, 6).unwrap();
        let data = InMemoryMarketData::new().with_today(today).with_bars(
            "I:VIX",
            vec![
                DailyBar::flat(NaiveDate::from_ymd_opt(2024, 8, 5).unwrap(), 38.6, 0.0),
                DailyBar::flat(NaiveDate::from_ymd_opt(2024, 8, 2).unwrap(), 23.4, 0.0),
            ],
        );
        let checker = MarketHealthChecker::new(Arc::new(data));

        let health = checker.check().await.unwrap();
        assert_eq!(health.vix, 38.6);
        assert_eq!(health.stance, MarketStance::RaiseCash);

        let calmer = checker.with_threshold(40.0).check().await.unwrap();
        assert_eq!(calmer.status, MarketStatus::Safe);
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces() {
        let data = InMemoryMarketData::new().with_failure("I:VIX");
        let checker = MarketHealthChecker::new(Arc::new(data));
        assert!(matches!(checker.check().await, Err(FetchError::Network(_))));
    }
}
