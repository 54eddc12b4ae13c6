//! Sector Ranker
//!
//! Ranks every configured sector by price change or money flow over a
//! lookback period. Sectors are measured through their tracking instrument,
//! or through the average of a fixed sample of members when they have none.
//! A sector whose data cannot be fetched stays in the table with a zero change
//! so downstream quota allocation always sees every sector.

use chrono::NaiveDate;
use market_core::{ConfigError, DailyBar, FetchError, HistoryRange, PriceHistoryProvider};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::RankingError;
use crate::fetch::{fetch_all, FetchSettings};
use crate::metrics::{change_pct, mean_volume, tail};
use crate::period::Period;
use crate::universe::{SectorDefinition, SectorUniverse};

/// Members averaged for sectors without a tracking instrument
pub const DEFAULT_MEMBER_SAMPLE_SIZE: usize = 5;

/// Column the sector table is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorSortKey {
    #[default]
    PriceChange,
    MoneyFlow,
}

impl fmt::Display for SectorSortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectorSortKey::PriceChange => write!(f, "price_change"),
            SectorSortKey::MoneyFlow => write!(f, "money_flow"),
        }
    }
}

impl FromStr for SectorSortKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "price" | "change" | "price_change" => Ok(SectorSortKey::PriceChange),
            "flow" | "money_flow" => Ok(SectorSortKey::MoneyFlow),
            other => Err(ConfigError::Parse(format!("unknown sort key: {}", other))),
        }
    }
}

/// One row of the sector table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub sector: String,
    pub tracking_symbol: Option<String>,
    pub price_change_pct: f64,
    pub volume_change_pct: Option<f64>,
    /// Signed share of traded value on up days, -100..=100
    pub money_flow_pct: Option<f64>,
    pub data_available: bool,
    /// Instruments that contributed to the figures
    pub instruments_used: usize,
}

impl SectorPerformance {
    fn unavailable(def: &SectorDefinition) -> Self {
        Self {
            sector: def.name.clone(),
            tracking_symbol: def.tracking_symbol.clone(),
            price_change_pct: 0.0,
            volume_change_pct: None,
            money_flow_pct: None,
            data_available: false,
            instruments_used: 0,
        }
    }

    fn sort_value(&self, key: SectorSortKey) -> f64 {
        match key {
            SectorSortKey::PriceChange => self.price_change_pct,
            SectorSortKey::MoneyFlow => self.money_flow_pct.unwrap_or(f64::NEG_INFINITY),
        }
    }
}

impl AsRef<str> for SectorPerformance {
    fn as_ref(&self) -> &str {
        &self.sector
    }
}

/// Period statistics for a single instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectorStats {
    pub price_change_pct: f64,
    pub volume_change_pct: Option<f64>,
    pub money_flow_pct: Option<f64>,
}

/// Compute period statistics from ascending bars.
///
/// Falls back to the earliest bar when history is shorter than `lookback`.
/// `None` when the series has no usable baseline.
pub fn sector_stats(bars: &[DailyBar], lookback: usize) -> Option<SectorStats> {
    let price_change_pct = change_pct(bars, lookback)?;
    Some(SectorStats {
        price_change_pct,
        volume_change_pct: volume_change_pct(bars, lookback),
        money_flow_pct: money_flow_pct(bars, lookback),
    })
}

/// Mean volume of the last `lookback` bars against the `lookback` bars before them.
fn volume_change_pct(bars: &[DailyBar], lookback: usize) -> Option<f64> {
    let lookback = lookback.max(1);
    let split = bars.len().checked_sub(lookback)?;
    let recent = mean_volume(&bars[split..])?;
    let previous = mean_volume(&bars[split.saturating_sub(lookback)..split])?;
    if previous <= 0.0 {
        return None;
    }
    Some((recent - previous) / previous * 100.0)
}

/// Σ sign(Δclose)·close·volume / Σ close·volume over the lookback window.
fn money_flow_pct(bars: &[DailyBar], lookback: usize) -> Option<f64> {
    let window = tail(bars, lookback.max(1) + 1);
    let mut signed = 0.0;
    let mut total = 0.0;
    for pair in window.windows(2) {
        let traded = pair[1].close * pair[1].volume;
        let delta = pair[1].close - pair[0].close;
        if delta > 0.0 {
            signed += traded;
        } else if delta < 0.0 {
            signed -= traded;
        }
        total += traded;
    }
    if total <= 0.0 {
        return None;
    }
    Some(signed / total * 100.0)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub struct SectorRanker {
    universe: Arc<SectorUniverse>,
    prices: Arc<dyn PriceHistoryProvider>,
    fetch: FetchSettings,
    member_sample_size: usize,
}

impl SectorRanker {
    pub fn new(universe: Arc<SectorUniverse>, prices: Arc<dyn PriceHistoryProvider>) -> Self {
        Self {
            universe,
            prices,
            fetch: FetchSettings::default(),
            member_sample_size: DEFAULT_MEMBER_SAMPLE_SIZE,
        }
    }

    pub fn with_fetch_settings(mut self, fetch: FetchSettings) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_member_sample_size(mut self, size: usize) -> Self {
        self.member_sample_size = size.max(1);
        self
    }

    pub fn universe(&self) -> &SectorUniverse {
        &self.universe
    }

    /// Rank sectors over the most recent `period`.
    pub async fn rank_sectors(
        &self,
        period: Period,
        key: SectorSortKey,
    ) -> Result<Vec<SectorPerformance>, RankingError> {
        let range = HistoryRange::Recent {
            days: period.fetch_window_days(),
        };
        self.rank_over(range, period, key).await
    }

    /// Rank sectors over `period` ending at `end` (inclusive).
    pub async fn rank_sectors_as_of(
        &self,
        period: Period,
        key: SectorSortKey,
        end: NaiveDate,
    ) -> Result<Vec<SectorPerformance>, RankingError> {
        let range = HistoryRange::ending_at(end, period.fetch_window_days());
        self.rank_over(range, period, key).await
    }

    async fn rank_over(
        &self,
        range: HistoryRange,
        period: Period,
        key: SectorSortKey,
    ) -> Result<Vec<SectorPerformance>, RankingError> {
        let sectors = self.universe.sectors();
        if sectors.is_empty() {
            return Ok(Vec::new());
        }

        let symbols = self.symbols_to_fetch();
        let prices = &self.prices;
        let fetched = fetch_all(&symbols, &self.fetch, |symbol| async move {
            prices.get_history(&symbol, range).await
        })
        .await;
        let series: HashMap<String, Result<Vec<DailyBar>, FetchError>> =
            fetched.into_iter().collect();

        let lookback = period.lookback();
        let mut table: Vec<SectorPerformance> = sectors
            .iter()
            .map(|def| self.measure(def, &series, lookback))
            .collect();

        if table.iter().all(|row| !row.data_available) {
            tracing::warn!("No sector data for {} ({})", period, range.cache_key());
            return Err(RankingError::DataUnavailable);
        }

        table.sort_by(|a, b| {
            b.sort_value(key)
                .partial_cmp(&a.sort_value(key))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            "Ranked {} sectors for {} by {}, {} with data",
            table.len(),
            period,
            key,
            table.iter().filter(|row| row.data_available).count()
        );
        Ok(table)
    }

    /// Tracking symbols plus member samples, deduplicated in universe order
    fn symbols_to_fetch(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        for def in self.universe.sectors() {
            let wanted: Vec<&String> = match &def.tracking_symbol {
                Some(tracking) => vec![tracking],
                None => def.constituents.iter().take(self.member_sample_size).collect(),
            };
            for symbol in wanted {
                if seen.insert(symbol.clone()) {
                    symbols.push(symbol.clone());
                }
            }
        }
        symbols
    }

    fn measure(
        &self,
        def: &SectorDefinition,
        series: &HashMap<String, Result<Vec<DailyBar>, FetchError>>,
        lookback: usize,
    ) -> SectorPerformance {
        let stats_for = |symbol: &str| -> Option<SectorStats> {
            match series.get(symbol) {
                Some(Ok(bars)) => sector_stats(bars, lookback),
                Some(Err(e)) => {
                    tracing::debug!("{} unavailable for {}: {}", symbol, def.name, e);
                    None
                }
                None => None,
            }
        };

        if let Some(tracking) = &def.tracking_symbol {
            return match stats_for(tracking.as_str()) {
                Some(stats) => SectorPerformance {
                    sector: def.name.clone(),
                    tracking_symbol: Some(tracking.clone()),
                    price_change_pct: stats.price_change_pct,
                    volume_change_pct: stats.volume_change_pct,
                    money_flow_pct: stats.money_flow_pct,
                    data_available: true,
                    instruments_used: 1,
                },
                None => {
                    tracing::warn!(
                        "Tracking instrument {} failed, {} reported flat",
                        tracking,
                        def.name
                    );
                    SectorPerformance::unavailable(def)
                }
            };
        }

        let members: Vec<SectorStats> = def
            .constituents
            .iter()
            .take(self.member_sample_size)
            .filter_map(|symbol| stats_for(symbol.as_str()))
            .collect();

        if members.is_empty() {
            tracing::warn!("No member of {} could be fetched, reported flat", def.name);
            return SectorPerformance::unavailable(def);
        }

        SectorPerformance {
            sector: def.name.clone(),
            tracking_symbol: None,
            price_change_pct: mean(members.iter().map(|s| s.price_change_pct)).unwrap_or(0.0),
            volume_change_pct: mean(members.iter().filter_map(|s| s.volume_change_pct)),
            money_flow_pct: mean(members.iter().filter_map(|s| s.money_flow_pct)),
            data_available: true,
            instruments_used: members.len(),
        }
    }
}
