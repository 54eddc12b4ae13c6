use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use market_core::{
    DailyBar, FetchError, Fundamentals, FundamentalsProvider, HistoricalFundamentalsProvider,
    HistoryRange, PriceHistoryProvider,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Attempts per request before giving up on 429 responses
const MAX_ATTEMPTS: u32 = 3;

/// Calendar days of bars fetched to find a last close for P/E
const PRICE_LOOKBACK_DAYS: i64 = 10;

/// Requests allowed per minute, shared by every clone of a client
#[derive(Clone)]
struct RateLimiter {
    sent: Arc<Mutex<VecDeque<Instant>>>,
    per_minute: usize,
}

impl RateLimiter {
    const WINDOW: Duration = Duration::from_secs(60);
    const SLACK: Duration = Duration::from_millis(50);

    fn new(per_minute: usize) -> Self {
        Self {
            sent: Arc::new(Mutex::new(VecDeque::new())),
            per_minute: per_minute.max(1),
        }
    }

    /// Wait for a free slot and claim it.
    async fn acquire(&self) {
        loop {
            let wait = {
                let mut sent = self.sent.lock().await;
                let now = Instant::now();
                while sent.front().is_some_and(|&at| now.duration_since(at) >= Self::WINDOW) {
                    sent.pop_front();
                }

                if sent.len() < self.per_minute {
                    sent.push_back(now);
                    return;
                }
                sent.front()
                    .map(|&oldest| (oldest + Self::WINDOW).saturating_duration_since(now))
                    .unwrap_or_default()
                    + Self::SLACK
            };
            tracing::debug!("Polygon request budget spent, sleeping {:.1}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
    base_url: String,
    retry_wait: Duration,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Default 500 req/min for Starter plan. Free tier users should set POLYGON_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        Self::with_rate_limit(api_key, rate_limit)
    }

    pub fn with_rate_limit(api_key: String, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(requests_per_minute),
            base_url: BASE_URL.to_string(),
            retry_wait: Duration::from_secs(15),
        }
    }

    /// Point the client at another host, e.g. a proxy or a local mock.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Pause between retries after a 429
    pub fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, FetchError> {
        let request = builder.build().map_err(|e| FetchError::Network(e.to_string()))?;

        for attempt in 1..=MAX_ATTEMPTS {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| FetchError::Network("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            tracing::warn!(
                "Polygon 429 rate limited, waiting {:.1}s (attempt {}/{})",
                self.retry_wait.as_secs_f64(),
                attempt,
                MAX_ATTEMPTS
            );
            tokio::time::sleep(self.retry_wait).await;
        }

        Err(FetchError::Api(format!("Rate limited by Polygon after {} attempts", MAX_ATTEMPTS)))
    }

    async fn error_for_status(response: reqwest::Response) -> FetchError {
        FetchError::Api(format!(
            "HTTP {}: {}",
            response.status(),
            response.text().await.unwrap_or_default()
        ))
    }

    /// Get daily bars for a symbol between two dates (inclusive)
    pub async fn get_daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyBar>, FetchError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        if response.status().as_u16() == 404 {
            return Err(FetchError::NotFound(symbol.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        let agg_response: AggregateResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Api(e.to_string()))?;

        let bars = bars_from_aggregates(agg_response.results);
        if bars.is_empty() {
            return Err(FetchError::NotFound(symbol.to_string()));
        }
        Ok(bars)
    }

    /// Get quarterly financial reports, newest filing first.
    ///
    /// With `filed_on_or_before` only reports public at that date are returned.
    pub async fn get_quarterly_financials(
        &self,
        symbol: &str,
        filed_on_or_before: Option<NaiveDate>,
    ) -> Result<Vec<QuarterlyReport>, FetchError> {
        let url = format!("{}/vX/reference/financials", self.base_url);

        let mut query = vec![
            ("ticker", symbol.to_string()),
            ("timeframe", "quarterly".to_string()),
            ("order", "desc".to_string()),
            ("sort", "filing_date".to_string()),
            ("limit", "8".to_string()),
            ("apiKey", self.api_key.clone()),
        ];
        if let Some(date) = filed_on_or_before {
            query.push(("filing_date.lte", date.format("%Y-%m-%d").to_string()));
        }

        let response = self.send_request(self.client.get(&url).query(&query)).await?;

        if !response.status().is_success() {
            if response.status().as_u16() == 403 || response.status().as_u16() == 401 {
                return Ok(Vec::new());
            }
            return Err(Self::error_for_status(response).await);
        }

        let fin_response: FinancialsResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Api(e.to_string()))?;

        Ok(fin_response.results.into_iter().map(QuarterlyReport::from).collect())
    }

    /// Get Benzinga consensus ratings for a ticker.
    /// Returns Ok(None) on 403/401 (subscription not available).
    pub async fn get_consensus_ratings(
        &self,
        symbol: &str,
    ) -> Result<Option<ConsensusRating>, FetchError> {
        let url = format!("{}/benzinga/v1/consensus-ratings/{}", self.base_url, symbol);

        let response = self
            .send_request(self.client.get(&url).query(&[("apiKey", &self.api_key)]))
            .await?;

        let status = response.status().as_u16();
        if status == 403 || status == 401 {
            tracing::debug!("Benzinga consensus ratings not available (HTTP {}), skipping", status);
            return Ok(None);
        }

        if !response.status().is_success() {
            tracing::warn!("Benzinga consensus HTTP {}: ignoring", status);
            return Ok(None);
        }

        let body: BenzingaConsensusResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Api(e.to_string()))?;

        Ok(body.results.into_iter().next())
    }

    /// Last close on or before `as_of`
    async fn last_close(&self, symbol: &str, as_of: NaiveDate) -> Option<f64> {
        let from = as_of - chrono::Duration::days(PRICE_LOOKBACK_DAYS);
        match self.get_daily_bars(symbol, from, as_of).await {
            Ok(bars) => bars.last().map(|b| b.close),
            Err(e) => {
                tracing::debug!("No recent close for {}: {}", symbol, e);
                None
            }
        }
    }
}

#[async_trait]
impl PriceHistoryProvider for PolygonClient {
    async fn get_history(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<DailyBar>, FetchError> {
        let (from, to) = range.resolve(Utc::now().date_naive());
        self.get_daily_bars(symbol, from, to).await
    }
}

#[async_trait]
impl FundamentalsProvider for PolygonClient {
    async fn get_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError> {
        let today = Utc::now().date_naive();
        let (reports, consensus, price) = tokio::join!(
            self.get_quarterly_financials(symbol, None),
            self.get_consensus_ratings(symbol),
            self.last_close(symbol, today),
        );

        let reports = reports?;
        let consensus = consensus.unwrap_or_else(|e| {
            tracing::debug!("Consensus unavailable for {}: {}", symbol, e);
            None
        });

        Ok(fundamentals_from_reports(&reports, price, consensus.as_ref()))
    }
}

#[async_trait]
impl HistoricalFundamentalsProvider for PolygonClient {
    async fn get_fundamentals_as_of(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Fundamentals, FetchError> {
        let (reports, price) = tokio::join!(
            self.get_quarterly_financials(symbol, Some(date)),
            self.last_close(symbol, date),
        );

        let reports = reports?;
        if reports.is_empty() {
            return Err(FetchError::NotFound(symbol.to_string()));
        }

        // Analyst consensus has no point-in-time history; the scorer treats it as neutral.
        Ok(fundamentals_from_reports(&reports, price, None))
    }
}

/// Convert raw aggregates to ascending daily bars
fn bars_from_aggregates(results: Vec<AggregateResult>) -> Vec<DailyBar> {
    let mut bars: Vec<DailyBar> = results
        .into_iter()
        .filter_map(|r| {
            let date = DateTime::from_timestamp_millis(r.t)?.date_naive();
            Some(DailyBar {
                date,
                open: r.o,
                high: r.h,
                low: r.l,
                close: r.c,
                volume: r.v,
            })
        })
        .collect();
    bars.sort_by_key(|b| b.date);
    bars
}

/// Derive scorer fundamentals from quarterly reports (newest first).
///
/// Revenue growth compares the latest quarter with the same quarter a year
/// earlier. The P/E is trailing (price over the last four quarterly EPS)
/// since Polygon publishes no forward estimates.
pub fn fundamentals_from_reports(
    reports: &[QuarterlyReport],
    price: Option<f64>,
    consensus: Option<&ConsensusRating>,
) -> Fundamentals {
    let latest = reports.first();

    let year_ago_revenue = reports.get(4).and_then(|r| r.revenue);
    let revenue_growth = match (latest.and_then(|r| r.revenue), year_ago_revenue) {
        (Some(now), Some(year_ago)) if year_ago.abs() > f64::EPSILON => Some(now / year_ago - 1.0),
        _ => None,
    };

    let profit_margin = latest.and_then(|r| match (r.net_income, r.revenue) {
        (Some(ni), Some(rev)) if rev.abs() > f64::EPSILON => Some(ni / rev),
        _ => None,
    });

    let ttm_eps: Option<f64> = if reports.len() >= 4 {
        reports[..4].iter().map(|r| r.eps).sum()
    } else {
        None
    };
    let forward_pe = match (price, ttm_eps) {
        (Some(p), Some(eps)) if eps > 0.0 => Some(p / eps),
        _ => None,
    };

    Fundamentals {
        forward_pe,
        revenue_growth,
        profit_margin,
        analyst_recommendation_mean: consensus.and_then(|c| c.recommendation_mean()),
    }
}

/// One quarterly filing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarterlyReport {
    pub fiscal_period: String,
    pub fiscal_year: i32,
    pub filing_date: Option<NaiveDate>,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
}

impl From<FinancialResult> for QuarterlyReport {
    fn from(r: FinancialResult) -> Self {
        let income = r.financials.income_statement;
        let value = |key: &str| {
            income
                .get(key)
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_f64())
        };

        QuarterlyReport {
            fiscal_period: r.fiscal_period,
            fiscal_year: r.fiscal_year.parse().unwrap_or(0),
            filing_date: r
                .filing_date
                .as_deref()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
            revenue: value("revenues"),
            net_income: value("net_income_loss"),
            eps: value("diluted_earnings_per_share").or_else(|| value("basic_earnings_per_share")),
        }
    }
}

/// Buy/hold/sell counts behind an analyst consensus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusRating {
    #[serde(default)]
    pub buy_count: Option<i32>,
    #[serde(default)]
    pub hold_count: Option<i32>,
    #[serde(default)]
    pub sell_count: Option<i32>,
}

impl ConsensusRating {
    /// Recommendation mean on the 1 (strong buy) .. 5 (strong sell) scale.
    /// Buy, hold and sell counts map to 2, 3 and 4.
    pub fn recommendation_mean(&self) -> Option<f64> {
        let buy = self.buy_count.unwrap_or(0).max(0) as f64;
        let hold = self.hold_count.unwrap_or(0).max(0) as f64;
        let sell = self.sell_count.unwrap_or(0).max(0) as f64;
        let total = buy + hold + sell;
        if total == 0.0 {
            return None;
        }
        Some((buy * 2.0 + hold * 3.0 + sell * 4.0) / total)
    }
}

#[derive(Debug, Deserialize)]
struct BenzingaConsensusResponse {
    #[serde(default)]
    results: Vec<ConsensusRating>,
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    v: f64, // volume
}

#[derive(Debug, Deserialize)]
struct FinancialsResponse {
    #[serde(default)]
    results: Vec<FinancialResult>,
}

#[derive(Debug, Deserialize)]
struct FinancialResult {
    fiscal_period: String,
    fiscal_year: String,
    #[serde(default)]
    filing_date: Option<String>,
    financials: FinancialStatements,
}

#[derive(Debug, Deserialize)]
struct FinancialStatements {
    #[serde(default)]
    income_statement: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(revenue: f64, net_income: f64, eps: f64) -> QuarterlyReport {
        QuarterlyReport {
            fiscal_period: "Q1".to_string(),
            fiscal_year: 2024,
            filing_date: None,
            revenue: Some(revenue),
            net_income: Some(net_income),
            eps: Some(eps),
        }
    }

    #[test]
    fn test_aggregates_parse_and_sort() {
        let body = r#"{"results":[
            {"t":1704412800000,"o":10.0,"h":11.0,"l":9.5,"c":10.5,"v":1000.0},
            {"t":1704326400000,"o":9.0,"h":10.0,"l":8.5,"c":9.5,"v":900.0}
        ]}"#;
        let parsed: AggregateResponse = serde_json::from_str(body).unwrap();
        let bars = bars_from_aggregates(parsed.results);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(bars[1].close, 10.5);
    }

    #[test]
    fn test_financials_parse() {
        let body = r#"{"results":[{
            "fiscal_period":"Q2","fiscal_year":"2024","filing_date":"2024-08-01",
            "financials":{"income_statement":{
                "revenues":{"value":1000.0},
                "net_income_loss":{"value":150.0},
                "diluted_earnings_per_share":{"value":1.25}
            }}
        }]}"#;
        let parsed: FinancialsResponse = serde_json::from_str(body).unwrap();
        let reports: Vec<QuarterlyReport> =
            parsed.results.into_iter().map(QuarterlyReport::from).collect();

        assert_eq!(reports[0].fiscal_year, 2024);
        assert_eq!(reports[0].filing_date, NaiveDate::from_ymd_opt(2024, 8, 1));
        assert_eq!(reports[0].eps, Some(1.25));
    }

    #[test]
    fn test_fundamentals_from_reports() {
        let reports = vec![
            report(1200.0, 240.0, 1.0),
            report(1150.0, 200.0, 1.0),
            report(1100.0, 200.0, 1.0),
            report(1050.0, 200.0, 1.0),
            report(1000.0, 180.0, 0.9),
        ];
        let consensus = ConsensusRating {
            buy_count: Some(3),
            hold_count: Some(1),
            sell_count: Some(0),
            ..Default::default()
        };

        let f = fundamentals_from_reports(&reports, Some(80.0), Some(&consensus));

        assert!((f.revenue_growth.unwrap() - 0.2).abs() < 1e-9);
        assert!((f.profit_margin.unwrap() - 0.2).abs() < 1e-9);
        assert!((f.forward_pe.unwrap() - 20.0).abs() < 1e-9);
        assert!((f.analyst_recommendation_mean.unwrap() - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_short_history_leaves_gaps() {
        let f = fundamentals_from_reports(&[report(100.0, -5.0, -0.1)], Some(10.0), None);
        assert!(f.revenue_growth.is_none());
        assert!(f.forward_pe.is_none());
        assert!((f.profit_margin.unwrap() + 0.05).abs() < 1e-9);
        assert!(f.analyst_recommendation_mean.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_waits_for_window() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= RateLimiter::WINDOW);
    }

    #[test]
    fn test_recommendation_mean_without_counts() {
        assert!(ConsensusRating::default().recommendation_mean().is_none());
    }

    // ===================================================================
    // HTTP status handling against a local mock server
    // ===================================================================

    mod http {
        use super::*;
        use wiremock::matchers::{method, path, path_regex};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn client_for(server: &MockServer) -> PolygonClient {
            PolygonClient::with_rate_limit("test-key".to_string(), 1000)
                .with_base_url(&server.uri())
                .with_retry_wait(Duration::from_millis(10))
        }

        fn day(d: u32) -> NaiveDate {
            NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
        }

        const AGGREGATES: &str = r#"{"results":[
            {"t":1704326400000,"o":9.0,"h":10.0,"l":8.5,"c":9.5,"v":900.0},
            {"t":1704412800000,"o":10.0,"h":11.0,"l":9.5,"c":10.5,"v":1000.0}
        ]}"#;

        #[tokio::test]
        async fn test_unknown_symbol_is_not_found() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path_regex(r"^/v2/aggs/ticker/NOPE/"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let result = client_for(&server).get_daily_bars("NOPE", day(1), day(31)).await;
            assert!(matches!(result, Err(FetchError::NotFound(s)) if s == "NOPE"));
        }

        #[tokio::test]
        async fn test_empty_aggregates_are_not_found() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path_regex(r"^/v2/aggs/ticker/"))
                .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"results":[]}"#))
                .mount(&server)
                .await;

            let result = client_for(&server).get_daily_bars("AAPL", day(1), day(31)).await;
            assert!(matches!(result, Err(FetchError::NotFound(_))));
        }

        #[tokio::test]
        async fn test_server_error_is_api_error() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path_regex(r"^/v2/aggs/ticker/"))
                .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
                .mount(&server)
                .await;

            let result = client_for(&server).get_daily_bars("AAPL", day(1), day(31)).await;
            assert!(matches!(result, Err(FetchError::Api(_))));
        }

        #[tokio::test]
        async fn test_forbidden_financials_are_empty() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/vX/reference/financials"))
                .respond_with(ResponseTemplate::new(403))
                .mount(&server)
                .await;

            let reports = client_for(&server)
                .get_quarterly_financials("AAPL", Some(day(15)))
                .await
                .unwrap();
            assert!(reports.is_empty());
        }

        #[tokio::test]
        async fn test_unauthorized_consensus_is_none() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/benzinga/v1/consensus-ratings/AAPL"))
                .respond_with(ResponseTemplate::new(401))
                .mount(&server)
                .await;

            let consensus = client_for(&server).get_consensus_ratings("AAPL").await.unwrap();
            assert!(consensus.is_none());
        }

        #[tokio::test]
        async fn test_rate_limited_request_is_retried() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path_regex(r"^/v2/aggs/ticker/AAPL/"))
                .respond_with(ResponseTemplate::new(429))
                .up_to_n_times(2)
                .expect(2)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path_regex(r"^/v2/aggs/ticker/AAPL/"))
                .respond_with(ResponseTemplate::new(200).set_body_string(AGGREGATES))
                .expect(1)
                .mount(&server)
                .await;

            let bars = client_for(&server).get_daily_bars("AAPL", day(1), day(31)).await.unwrap();
            assert_eq!(bars.len(), 2);
            assert_eq!(bars[0].date, day(4));
        }

        #[tokio::test]
        async fn test_rate_limit_gives_up_after_max_attempts() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(429))
                .expect(u64::from(MAX_ATTEMPTS))
                .mount(&server)
                .await;

            let result = client_for(&server).get_daily_bars("AAPL", day(1), day(31)).await;
            assert!(matches!(result, Err(FetchError::Api(msg)) if msg.contains("Rate limited")));
        }
    }
}
