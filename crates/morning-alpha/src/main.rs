//! morning-alpha: sector rotation report and walk-forward backtest.
//!
//! Usage:
//!   morning-alpha sectors --period 1mo --sort money_flow
//!   morning-alpha picks --weights five --quotas 2,2,2,2,1,1
//!   morning-alpha health
//!   morning-alpha backtest --start 2024-01-02 --interval 7 --json
//!   morning-alpha --snapshot data/snapshot.json picks

mod config;
mod output;

use anyhow::{Context, Result};
use backtest_engine::{BacktestRequest, WalkForwardBacktester};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use market_core::{
    CachedProvider, FundamentalsProvider, HistoricalFundamentalsProvider, InMemoryMarketData,
    MarketSnapshot, PriceHistoryProvider,
};
use polygon_client::PolygonClient;
use sector_ranking::market_health::{DEFAULT_RISK_THRESHOLD, DEFAULT_VOLATILITY_SYMBOL};
use sector_ranking::{
    HomeSectorRule, LiveMetricProvider, MarketHealthChecker, PickEngine, Period, QuotaAllocator,
    QuotaPolicy, ScoringWeights, SectorRanker, SectorSortKey, StockScorer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "morning-alpha",
    about = "Sector rotation picks and walk-forward backtests",
    version
)]
struct Cli {
    /// Market preset when no universe file is given (US, BIST)
    #[arg(short, long, global = true)]
    market: Option<String>,

    /// Sector universe TOML file
    #[arg(short, long, global = true)]
    universe: Option<PathBuf>,

    /// Serve prices and fundamentals from a JSON snapshot instead of Polygon
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank sectors by performance over a lookback period
    Sectors {
        /// Lookback period (1d, 5d, 15d, 1mo, 3mo, 6mo, 1y)
        #[arg(short, long, default_value = "1mo")]
        period: Period,

        /// Sort key (price_change, money_flow)
        #[arg(short, long, default_value = "price_change")]
        sort: SectorSortKey,
    },

    /// Rank sectors, score their constituents, and allocate picks
    Picks {
        #[arg(short, long, default_value = "1mo")]
        period: Period,

        #[arg(short, long, default_value = "price_change")]
        sort: SectorSortKey,

        /// Weight preset (four, five, momentum)
        #[arg(short, long, default_value = "five")]
        weights: String,

        /// Picks per sector rank, comma separated
        #[arg(short, long, default_value = "2,2,2,2,1,1")]
        quotas: QuotaPolicy,

        /// Sector for a stock listed in several (highest_score, highest_ranked_sector)
        #[arg(long, default_value = "highest_score")]
        home: HomeSectorRule,
    },

    /// Check volatility against the risk threshold
    Health {
        /// Volatility index symbol
        #[arg(short, long, default_value = DEFAULT_VOLATILITY_SYMBOL)]
        symbol: String,

        /// Readings at or above this are risky
        #[arg(short, long, default_value_t = DEFAULT_RISK_THRESHOLD)]
        threshold: f64,
    },

    /// Replay the pick pipeline over past checkpoints
    Backtest {
        /// First checkpoint (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Exclusive end date (YYYY-MM-DD, default today)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Days between checkpoints
        #[arg(short, long, default_value = "7")]
        interval: i64,

        /// Sector ranking lookback at each checkpoint
        #[arg(short, long, default_value = "1mo")]
        period: Period,

        #[arg(short, long, default_value = "price_change")]
        sort: SectorSortKey,

        #[arg(short, long, default_value = "2,2,2,2,1,1")]
        quotas: QuotaPolicy,

        #[arg(long, default_value = "highest_score")]
        home: HomeSectorRule,

        /// Score with fundamentals reported before each checkpoint
        #[arg(long)]
        point_in_time: bool,

        /// Stop after this many seconds and report the steps so far
        #[arg(long)]
        max_seconds: Option<u64>,
    },
}

/// Providers behind every command
struct DataSources {
    prices: Arc<dyn PriceHistoryProvider>,
    fundamentals: Arc<dyn FundamentalsProvider>,
    historical: Arc<dyn HistoricalFundamentalsProvider>,
}

impl DataSources {
    fn load(snapshot: Option<&PathBuf>, config: &AppConfig) -> Result<Self> {
        if let Some(path) = snapshot {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            let snapshot: MarketSnapshot = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid snapshot {}", path.display()))?;
            tracing::info!("Serving {} symbols from {}", snapshot.bars.len(), path.display());
            let data = Arc::new(InMemoryMarketData::from_snapshot(snapshot));
            return Ok(Self {
                prices: data.clone(),
                fundamentals: data.clone(),
                historical: data,
            });
        }

        let api_key = config
            .polygon_api_key
            .clone()
            .context("POLYGON_API_KEY must be set (or pass --snapshot)")?;
        let mut polygon = PolygonClient::new(api_key);
        if let Some(base_url) = &config.polygon_base_url {
            polygon = polygon.with_base_url(base_url);
        }
        let client = Arc::new(CachedProvider::with_ttl(polygon, config.cache_ttl()));
        Ok(Self {
            prices: client.clone(),
            fundamentals: client.clone(),
            historical: client,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "morning_alpha=info,sector_ranking=info,backtest_engine=info,polygon_client=warn"
                    .into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(market) = &cli.market {
        config.market = market.clone();
    }
    if let Some(path) = &cli.universe {
        config.universe_path = Some(path.clone());
    }

    let universe = Arc::new(config.load_universe()?);
    let fetch = config.fetch_settings();
    let sources = DataSources::load(cli.snapshot.as_ref(), &config)?;
    tracing::info!(
        "{} universe with {} sectors, {} concurrent fetches",
        universe.market,
        universe.sectors().len(),
        fetch.concurrency
    );

    let ranker =
        SectorRanker::new(universe.clone(), sources.prices.clone()).with_fetch_settings(fetch);

    match cli.command {
        Commands::Sectors { period, sort } => {
            let sectors = ranker.rank_sectors(period, sort).await?;
            if cli.json {
                output::print_json(&sectors)?;
            } else {
                print!("{}", output::render_sectors(&sectors));
            }
        }

        Commands::Picks {
            period,
            sort,
            weights,
            quotas,
            home,
        } => {
            let weights = ScoringWeights::preset(&weights)
                .with_context(|| format!("Unknown weight preset: {}", weights))?;
            let scorer = StockScorer::new(weights)?.with_fetch_settings(fetch);
            let allocator = QuotaAllocator::new(quotas).with_home_rule(home);
            let metrics = Arc::new(LiveMetricProvider::new(
                sources.prices.clone(),
                sources.fundamentals.clone(),
            ));

            let report = PickEngine::new(ranker, scorer, allocator, metrics)
                .build_picks(period, sort)
                .await?;
            if cli.json {
                output::print_json(&report)?;
            } else {
                print!("{}", output::render_picks(&report));
            }
        }

        Commands::Health { symbol, threshold } => {
            let health = MarketHealthChecker::new(sources.prices.clone())
                .with_symbol(&symbol)
                .with_threshold(threshold)
                .check()
                .await?;
            if cli.json {
                output::print_json(&health)?;
            } else {
                print!("{}", output::render_health(&health));
            }
        }

        Commands::Backtest {
            start,
            end,
            interval,
            period,
            sort,
            quotas,
            home,
            point_in_time,
            max_seconds,
        } => {
            let today = end.unwrap_or_else(|| Utc::now().date_naive());
            let request = BacktestRequest::new(start, interval, period, today).with_sort_key(sort);

            let mut backtester = WalkForwardBacktester::new(universe, sources.prices.clone())
                .with_fetch_settings(fetch)
                .with_allocator(QuotaAllocator::new(quotas).with_home_rule(home));
            if point_in_time {
                backtester = backtester.with_fundamentals(sources.historical.clone());
            }
            if let Some(secs) = max_seconds {
                backtester = backtester.with_time_budget(std::time::Duration::from_secs(secs));
            }

            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_signal(cancel.clone()));

            let report = backtester.run(request, &cancel).await?;
            if cli.json {
                output::print_json(&report)?;
            } else {
                print!("{}", output::render_backtest(&report));
            }
        }
    }

    Ok(())
}

/// Cancel `token` on Ctrl+C.
async fn shutdown_signal(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Ctrl+C received, stopping after the current step");
            token.cancel();
        }
        Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
    }
}
