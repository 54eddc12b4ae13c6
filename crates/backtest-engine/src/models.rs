use chrono::{Duration, NaiveDate};
use market_core::ConfigError;
use serde::{Deserialize, Serialize};
use sector_ranking::{Period, SectorSortKey};

/// Notional portfolio value at the first checkpoint.
pub const INITIAL_PORTFOLIO_VALUE: f64 = 100.0;

/// Parameters for a walk-forward run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub start_date: NaiveDate,
    pub rebalance_interval_days: i64,
    /// Lookback for the sector ranking at each checkpoint
    pub lookback_period: Period,
    /// Exclusive end of the simulation
    pub today: NaiveDate,
    #[serde(default)]
    pub sort_key: SectorSortKey,
}

impl BacktestRequest {
    pub fn new(
        start_date: NaiveDate,
        rebalance_interval_days: i64,
        lookback_period: Period,
        today: NaiveDate,
    ) -> Self {
        Self {
            start_date,
            rebalance_interval_days,
            lookback_period,
            today,
            sort_key: SectorSortKey::default(),
        }
    }

    pub fn with_sort_key(mut self, sort_key: SectorSortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rebalance_interval_days <= 0 {
            return Err(ConfigError::InvalidInterval(self.rebalance_interval_days));
        }
        if self.start_date >= self.today {
            return Err(ConfigError::MalformedDateRange {
                start: self.start_date,
                end: self.today,
            });
        }
        Ok(())
    }

    /// End of the holding period that starts at `checkpoint`.
    ///
    /// Intervals reaching past the calendar's range clamp to `today`.
    pub fn next_checkpoint(&self, checkpoint: NaiveDate) -> NaiveDate {
        Duration::try_days(self.rebalance_interval_days)
            .and_then(|step| checkpoint.checked_add_signed(step))
            .map_or(self.today, |next| next.min(self.today))
    }
}

/// How candidates are scored at each checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Price momentum only
    Momentum,
    /// Full weighted scorer over fundamentals known at the checkpoint
    PointInTime,
}

/// A symbol held during one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub sector: String,
    pub composite_score: f64,
    /// Realized return over the step; `None` when prices were unavailable
    pub return_pct: Option<f64>,
}

/// One rebalance period of the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStep {
    pub checkpoint_date: NaiveDate,
    pub next_checkpoint: NaiveDate,
    /// Value after applying this step's return
    pub portfolio_value: f64,
    pub step_return_pct: f64,
    pub symbol_count: usize,
    pub holdings: Vec<Holding>,
}

/// Aggregate statistics over the recorded steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub initial_value: f64,
    pub final_value: f64,
    pub total_return_pct: f64,
    pub steps: usize,
    pub avg_step_return_pct: f64,
    /// Sample standard deviation of step returns; 0 with fewer than two steps
    pub step_return_std_dev: f64,
    pub best_step_return_pct: Option<f64>,
    pub worst_step_return_pct: Option<f64>,
    /// Largest peak-to-trough decline of the portfolio value, in percent
    pub max_drawdown_pct: f64,
}

/// Result of a walk-forward run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub request: BacktestRequest,
    pub scoring: ScoringMode,
    pub steps: Vec<BacktestStep>,
    pub summary: BacktestSummary,
    /// False when the run was cancelled or ran out of time
    pub completed: bool,
}

impl BacktestReport {
    pub fn final_value(&self) -> f64 {
        self.summary.final_value
    }
}
