use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl DailyBar {
    /// Bar with the same open/high/low/close, handy for synthetic series.
    pub fn flat(date: NaiveDate, close: f64, volume: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }
}

/// Window of history requested from a price provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    /// The last `days` calendar days up to today
    Recent { days: u32 },
    /// Explicit inclusive date range
    Between { start: NaiveDate, end: NaiveDate },
}

impl HistoryRange {
    /// Range of `days` calendar days ending at `end` (inclusive).
    pub fn ending_at(end: NaiveDate, days: u32) -> Self {
        HistoryRange::Between {
            start: end - Duration::days(days as i64),
            end,
        }
    }

    /// Resolve to concrete dates, using `today` for relative ranges.
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            HistoryRange::Recent { days } => (today - Duration::days(days as i64), today),
            HistoryRange::Between { start, end } => (start, end),
        }
    }

    /// Stable key for caches
    pub fn cache_key(&self) -> String {
        match self {
            HistoryRange::Recent { days } => format!("recent:{}", days),
            HistoryRange::Between { start, end } => format!("{}..{}", start, end),
        }
    }
}

/// Company fundamentals used by the stock scorer.
///
/// Every field is optional; the scorer substitutes a documented neutral
/// value for anything the provider could not supply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Forward P/E, or trailing P/E when the provider has no estimate
    pub forward_pe: Option<f64>,
    /// Revenue growth as a fraction (0.12 = 12%)
    pub revenue_growth: Option<f64>,
    /// Net profit margin as a fraction
    pub profit_margin: Option<f64>,
    /// Analyst recommendation mean, 1 = strong buy .. 5 = strong sell
    pub analyst_recommendation_mean: Option<f64>,
}
