//! In-memory market data provider.
//!
//! Serves pre-loaded bars and fundamentals. Used as the test double across the
//! workspace and for offline runs from snapshot files.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    DailyBar, FetchError, Fundamentals, FundamentalsProvider, HistoricalFundamentalsProvider,
    HistoryRange, PriceHistoryProvider,
};

/// Serializable snapshot of market data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub bars: HashMap<String, Vec<DailyBar>>,
    #[serde(default)]
    pub fundamentals: HashMap<String, Fundamentals>,
    /// Dated reports for point-in-time lookups
    #[serde(default)]
    pub fundamentals_history: HashMap<String, Vec<(NaiveDate, Fundamentals)>>,
    /// Date the snapshot was taken; relative ranges resolve against it
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Default)]
pub struct InMemoryMarketData {
    bars: HashMap<String, Vec<DailyBar>>,
    fundamentals: HashMap<String, Fundamentals>,
    /// Dated fundamentals reports per symbol, ascending
    fundamentals_history: HashMap<String, Vec<(NaiveDate, Fundamentals)>>,
    failing: HashSet<String>,
    today: Option<NaiveDate>,
    history_calls: AtomicUsize,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: MarketSnapshot) -> Self {
        let mut data = Self::new();
        for (symbol, bars) in snapshot.bars {
            data = data.with_bars(&symbol, bars);
        }
        for (symbol, reports) in snapshot.fundamentals_history {
            for (reported, fundamentals) in reports {
                data = data.with_fundamentals_report(&symbol, reported, fundamentals);
            }
        }
        data.fundamentals = snapshot.fundamentals;
        data.today = snapshot.as_of;
        data
    }

    /// Register bars for a symbol (sorted by date on insert)
    pub fn with_bars(mut self, symbol: &str, mut bars: Vec<DailyBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_fundamentals(mut self, symbol: &str, fundamentals: Fundamentals) -> Self {
        self.fundamentals.insert(symbol.to_string(), fundamentals);
        self
    }

    /// Register a fundamentals report that becomes visible on `reported`
    pub fn with_fundamentals_report(
        mut self,
        symbol: &str,
        reported: NaiveDate,
        fundamentals: Fundamentals,
    ) -> Self {
        let reports = self.fundamentals_history.entry(symbol.to_string()).or_default();
        reports.push((reported, fundamentals));
        reports.sort_by_key(|(date, _)| *date);
        self
    }

    /// Make every request for `symbol` fail with a network error
    pub fn with_failure(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    /// Pin "today" for relative history ranges
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Number of `get_history` calls served so far
    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::Relaxed)
    }

    fn check_failure(&self, symbol: &str) -> Result<(), FetchError> {
        if self.failing.contains(symbol) {
            return Err(FetchError::Network(format!("simulated failure for {}", symbol)));
        }
        Ok(())
    }
}

#[async_trait]
impl PriceHistoryProvider for InMemoryMarketData {
    async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<DailyBar>, FetchError> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);
        self.check_failure(symbol)?;

        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let (start, end) = range.resolve(today);

        let bars: Vec<DailyBar> = self
            .bars
            .get(symbol)
            .map(|all| {
                all.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if bars.is_empty() {
            return Err(FetchError::NotFound(symbol.to_string()));
        }
        Ok(bars)
    }
}

#[async_trait]
impl FundamentalsProvider for InMemoryMarketData {
    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError> {
        self.check_failure(symbol)?;
        self.fundamentals
            .get(symbol)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(symbol.to_string()))
    }
}

#[async_trait]
impl HistoricalFundamentalsProvider for InMemoryMarketData {
    async fn get_fundamentals_as_of(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Fundamentals, FetchError> {
        self.check_failure(symbol)?;
        self.fundamentals_history
            .get(symbol)
            .and_then(|reports| reports.iter().rev().find(|(reported, _)| *reported <= date))
            .map(|(_, f)| f.clone())
            .ok_or_else(|| FetchError::NotFound(symbol.to_string()))
    }
}
