//! Run statistics over the step series.

use statrs::statistics::Statistics;

use crate::models::{BacktestStep, BacktestSummary};

impl BacktestSummary {
    pub fn from_steps(initial_value: f64, steps: &[BacktestStep]) -> Self {
        let returns: Vec<f64> = steps.iter().map(|s| s.step_return_pct).collect();
        let final_value = steps.last().map(|s| s.portfolio_value).unwrap_or(initial_value);

        let total_return_pct = if initial_value > 0.0 {
            (final_value / initial_value - 1.0) * 100.0
        } else {
            0.0
        };

        let avg_step_return_pct = if returns.is_empty() { 0.0 } else { returns.iter().mean() };
        // Sample standard deviation (n-1)
        let step_return_std_dev = if returns.len() < 2 { 0.0 } else { returns.iter().std_dev() };

        let best_step_return_pct = returns.iter().cloned().reduce(f64::max);
        let worst_step_return_pct = returns.iter().cloned().reduce(f64::min);

        Self {
            initial_value,
            final_value,
            total_return_pct,
            steps: steps.len(),
            avg_step_return_pct,
            step_return_std_dev,
            best_step_return_pct,
            worst_step_return_pct,
            max_drawdown_pct: max_drawdown_pct(initial_value, steps),
        }
    }
}

/// Peak-to-trough decline of the value series, starting from `initial_value`.
fn max_drawdown_pct(initial_value: f64, steps: &[BacktestStep]) -> f64 {
    let mut peak = initial_value;
    let mut max_drawdown = 0.0;
    for value in steps.iter().map(|s| s.portfolio_value) {
        if value > peak {
            peak = value;
        }
        let drawdown = if peak > 0.0 { (peak - value) / peak * 100.0 } else { 0.0 };
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
    }
    max_drawdown
}
