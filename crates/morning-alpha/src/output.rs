//! Plain-text tables for the terminal.

use backtest_engine::BacktestReport;
use sector_ranking::{MarketHealth, Pick, PickReport, RiskTier, SectorPerformance};
use serde::Serialize;

fn pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v),
        None => "n/a".to_string(),
    }
}

fn price(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "n/a".to_string(),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn render_sectors(sectors: &[SectorPerformance]) -> String {
    let mut out = format!(
        "{:<4} {:<26} {:<8} {:>10} {:>10} {:>11}\n",
        "#", "Sector", "Tracker", "Price", "Volume", "Money flow"
    );
    for (i, s) in sectors.iter().enumerate() {
        let price_change = if s.data_available {
            pct(Some(s.price_change_pct))
        } else {
            "no data".to_string()
        };
        out.push_str(&format!(
            "{:<4} {:<26} {:<8} {:>10} {:>10} {:>11}\n",
            i + 1,
            s.sector,
            s.tracking_symbol.as_deref().unwrap_or("-"),
            price_change,
            pct(s.volume_change_pct),
            pct(s.money_flow_pct)
        ));
    }
    out
}

pub fn render_picks(report: &PickReport) -> String {
    let mut out = format!("Sectors ({} by {})\n", report.period, report.sort_key);
    out.push_str(&render_sectors(&report.sectors));

    for sector in report.sectors.iter().map(|s| s.sector.as_str()) {
        let Some(candidates) = report.candidates_by_sector.get(sector) else {
            continue;
        };
        out.push_str(&format!("\n{} candidates\n", sector));
        for c in candidates {
            out.push_str(&format!(
                "  {:<8} {:>6.2}  momentum {:>6.1}  growth {:>6.1}  value {:>6.1}\n",
                c.symbol,
                c.display_score(),
                c.normalized.momentum,
                c.normalized.growth,
                c.normalized.valuation
            ));
        }
    }

    out.push_str("\nPicks\n");
    if report.picks.is_empty() {
        out.push_str("  none\n");
    }
    for p in &report.picks {
        out.push_str(&pick_row(p));
    }
    out
}

fn pick_row(p: &Pick) -> String {
    format!(
        concat!(
            "  {:<8} {:<26} #{:<3} score {:>6.2}  last {:>10}  day {:>8}",
            "  growth {:>8}  risk {:<6}  stop {:>7}\n"
        ),
        p.symbol,
        p.sector,
        p.sector_rank,
        p.display_score(),
        price(p.price),
        pct(p.daily_change_pct),
        pct(Some(p.growth_pct)),
        p.risk,
        format!("{:.1}%", p.stop_loss_pct)
    )
}

pub fn render_health(health: &MarketHealth) -> String {
    format!(
        "{} at {:.2}: {} ({})\n",
        health.symbol, health.vix, health.status, health.stance
    )
}

pub fn render_backtest(report: &BacktestReport) -> String {
    let mut out = format!(
        "Backtest from {} every {} days, {} lookback, {:?} scoring\n",
        report.request.start_date,
        report.request.rebalance_interval_days,
        report.request.lookback_period,
        report.scoring
    );
    out.push_str(&format!(
        "{:<12} {:<12} {:>8} {:>10} {:>10}\n",
        "Checkpoint", "Next", "Symbols", "Return", "Value"
    ));
    for step in &report.steps {
        out.push_str(&format!(
            "{:<12} {:<12} {:>8} {:>10} {:>10.2}\n",
            step.checkpoint_date.to_string(),
            step.next_checkpoint.to_string(),
            step.symbol_count,
            pct(Some(step.step_return_pct)),
            step.portfolio_value
        ));
    }

    let s = &report.summary;
    out.push_str(&format!(
        "\nFinal value {:.2} ({}) over {} steps\n",
        s.final_value,
        pct(Some(s.total_return_pct)),
        s.steps
    ));
    out.push_str(&format!(
        "Mean step {}, std dev {:.2}, best {}, worst {}, max drawdown {:.2}%\n",
        pct(Some(s.avg_step_return_pct)),
        s.step_return_std_dev,
        pct(s.best_step_return_pct),
        pct(s.worst_step_return_pct),
        s.max_drawdown_pct
    ));
    if !report.completed {
        out.push_str("Stopped early; results cover the steps above only\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(name: &str, change: f64, available: bool) -> SectorPerformance {
        SectorPerformance {
            sector: name.to_string(),
            tracking_symbol: Some("XLK".to_string()),
            price_change_pct: change,
            volume_change_pct: None,
            money_flow_pct: Some(12.5),
            data_available: available,
            instruments_used: if available { 1 } else { 0 },
        }
    }

    #[test]
    fn test_pct_formatting() {
        assert_eq!(pct(Some(1.234)), "+1.23%");
        assert_eq!(pct(Some(-0.5)), "-0.50%");
        assert_eq!(pct(None), "n/a");
    }

    #[test]
    fn test_sector_table_rows() {
        let table = render_sectors(&[
            sector("Technology", 4.2, true),
            sector("Energy", 0.0, false),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1"));
        assert!(lines[1].contains("Technology"));
        assert!(lines[1].contains("+4.20%"));
        assert!(lines[2].contains("no data"));
    }

    #[test]
    fn test_pick_row_columns() {
        let pick = Pick {
            symbol: "NVDA".to_string(),
            sector: "Technology".to_string(),
            sector_rank: 1,
            composite_score: 81.236,
            price: Some(120.5),
            daily_change_pct: Some(-0.4),
            growth_pct: 28.0,
            risk: RiskTier::Low,
            stop_loss_pct: -7.5,
        };
        let row = pick_row(&pick);
        assert!(row.contains("score  81.24"));
        assert!(row.contains("growth  +28.00%"));
        assert!(row.contains("risk low"));
        assert!(row.contains("stop   -7.5%"));
    }

    #[test]
    fn test_health_line() {
        let health = MarketHealth::classify("I:VIX", 31.0, 25.0);
        let line = render_health(&health);
        assert!(line.starts_with("I:VIX at 31.00"));
    }
}
