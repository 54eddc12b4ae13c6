//! TTL cache decorator for data providers.
//!
//! Wraps any provider and memoizes successful responses. Failures are never
//! cached so a transient error does not stick for the whole TTL.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;

use crate::{
    DailyBar, FetchError, Fundamentals, FundamentalsProvider, HistoricalFundamentalsProvider,
    HistoryRange, PriceHistoryProvider,
};

/// Default time-to-live (5 minutes)
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

pub struct CachedProvider<P> {
    inner: P,
    ttl: Duration,
    bars_cache: DashMap<String, CacheEntry<Vec<DailyBar>>>,
    fundamentals_cache: DashMap<String, CacheEntry<Fundamentals>>,
}

impl<P> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_ttl(inner, Duration::seconds(DEFAULT_CACHE_TTL_SECS))
    }

    pub fn with_ttl(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            bars_cache: DashMap::new(),
            fundamentals_cache: DashMap::new(),
        }
    }

    fn lookup<T: Clone>(&self, cache: &DashMap<String, CacheEntry<T>>, key: &str) -> Option<T> {
        let entry = cache.get(key)?;
        if Utc::now() - entry.cached_at < self.ttl {
            Some(entry.data.clone())
        } else {
            drop(entry);
            cache.remove(key);
            None
        }
    }
}

#[async_trait]
impl<P: PriceHistoryProvider> PriceHistoryProvider for CachedProvider<P> {
    async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<DailyBar>, FetchError> {
        let key = format!("{}|{}", symbol, range.cache_key());
        if let Some(bars) = self.lookup(&self.bars_cache, &key) {
            tracing::trace!("bars cache hit: {}", key);
            return Ok(bars);
        }

        let bars = self.inner.get_history(symbol, range).await?;
        self.bars_cache.insert(
            key,
            CacheEntry {
                data: bars.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(bars)
    }
}

#[async_trait]
impl<P: FundamentalsProvider> FundamentalsProvider for CachedProvider<P> {
    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError> {
        let key = format!("{}|current", symbol);
        if let Some(f) = self.lookup(&self.fundamentals_cache, &key) {
            return Ok(f);
        }

        let fundamentals = self.inner.get_fundamentals(symbol).await?;
        self.fundamentals_cache.insert(
            key,
            CacheEntry {
                data: fundamentals.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(fundamentals)
    }
}

#[async_trait]
impl<P: HistoricalFundamentalsProvider> HistoricalFundamentalsProvider for CachedProvider<P> {
    async fn get_fundamentals_as_of(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Fundamentals, FetchError> {
        let key = format!("{}|{}", symbol, date);
        if let Some(f) = self.lookup(&self.fundamentals_cache, &key) {
            return Ok(f);
        }

        let fundamentals = self.inner.get_fundamentals_as_of(symbol, date).await?;
        self.fundamentals_cache.insert(
            key,
            CacheEntry {
                data: fundamentals.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(fundamentals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryMarketData;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[tokio::test]
    async fn test_cache_hit_counts_one_upstream_call() {
        let data = InMemoryMarketData::new()
            .with_bars(
                "AAA",
                vec![DailyBar::flat(d(2), 10.0, 100.0), DailyBar::flat(d(3), 11.0, 100.0)],
            );
        let cached = CachedProvider::new(data);
        let range = HistoryRange::Between { start: d(1), end: d(5) };

        let first = cached.get_history("AAA", range).await.unwrap();
        let second = cached.get_history("AAA", range).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cached.inner.history_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_refetch() {
        let data =
            InMemoryMarketData::new().with_bars("AAA", vec![DailyBar::flat(d(2), 10.0, 100.0)]);
        let cached = CachedProvider::with_ttl(data, Duration::zero());
        let range = HistoryRange::Between { start: d(1), end: d(5) };

        cached.get_history("AAA", range).await.unwrap();
        cached.get_history("AAA", range).await.unwrap();

        assert_eq!(cached.inner.history_calls(), 2);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let cached = CachedProvider::new(InMemoryMarketData::new());
        let range = HistoryRange::Recent { days: 10 };

        assert!(cached.get_history("MISSING", range).await.is_err());
        assert!(cached.get_history("MISSING", range).await.is_err());
        assert_eq!(cached.inner.history_calls(), 2);
    }
}
