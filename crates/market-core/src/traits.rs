use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::{DailyBar, FetchError, Fundamentals, HistoryRange};

/// Source of daily price/volume history
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// Bars in ascending date order. An empty series is reported as `NotFound`.
    async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<DailyBar>, FetchError>;
}

/// Source of current fundamentals
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError>;
}

/// Source of point-in-time fundamentals for backtesting
#[async_trait]
pub trait HistoricalFundamentalsProvider: Send + Sync {
    async fn get_fundamentals_as_of(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Fundamentals, FetchError>;
}

#[async_trait]
impl<T: PriceHistoryProvider + ?Sized> PriceHistoryProvider for Arc<T> {
    async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<DailyBar>, FetchError> {
        (**self).get_history(symbol, range).await
    }
}

#[async_trait]
impl<T: FundamentalsProvider + ?Sized> FundamentalsProvider for Arc<T> {
    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError> {
        (**self).get_fundamentals(symbol).await
    }
}

#[async_trait]
impl<T: HistoricalFundamentalsProvider + ?Sized> HistoricalFundamentalsProvider for Arc<T> {
    async fn get_fundamentals_as_of(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Fundamentals, FetchError> {
        (**self).get_fundamentals_as_of(symbol, date).await
    }
}
