//! CSV report writer.

use std::path::Path;

use crate::domain::bar::format_timestamp;
use crate::domain::engine::{BacktestReport, TradeArena};
use crate::domain::error::FxError;
use crate::domain::grid::Grid;
use crate::ports::report_port::ReportPort;

const METRICS_HEADER: [&str; 18] = [
    "pair",
    "timeframe",
    "strategy",
    "parameter_set",
    "stop_loss_pips",
    "risk_reward",
    "trades",
    "wins",
    "losses",
    "unresolved",
    "malformed",
    "win_rate",
    "expectancy_r",
    "avg_bars_to_resolution",
    "avg_duration_hours",
    "final_balance",
    "peak_balance",
    "max_drawdown_pct",
];

const EQUITY_HEADER: [&str; 7] = [
    "parameter_set",
    "trade",
    "signal_id",
    "exit_time",
    "result",
    "balance",
    "drawdown_pct",
];

const TRADES_HEADER: [&str; 17] = [
    "signal_id",
    "parameter_set",
    "direction",
    "session",
    "entry_time",
    "entry_price",
    "stop_price",
    "target_price",
    "outcome",
    "exit_time",
    "bars_to_resolution",
    "duration_hours",
    "news_events",
    "h4",
    "h1",
    "m15",
    "entry_point",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn csv_error(path: &str, e: csv::Error) -> FxError {
    FxError::Io(std::io::Error::other(format!("{}: {}", path, e)))
}

fn writer(output_path: &str) -> Result<csv::Writer<std::fs::File>, FxError> {
    csv::Writer::from_path(Path::new(output_path)).map_err(|e| csv_error(output_path, e))
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, report: &BacktestReport, output_path: &str) -> Result<(), FxError> {
        let mut wtr = writer(output_path)?;
        wtr.write_record(METRICS_HEADER)
            .map_err(|e| csv_error(output_path, e))?;

        for row in &report.metrics.rows {
            let set = &row.parameter_set;
            wtr.write_record([
                report.pair.clone(),
                report.timeframe.clone(),
                report.strategy.clone(),
                set.label(),
                set.stop_loss.to_string(),
                set.risk_reward.to_string(),
                row.trade_count.to_string(),
                row.win_count.to_string(),
                row.loss_count.to_string(),
                row.unresolved_count.to_string(),
                row.malformed_count.to_string(),
                format!("{:.4}", row.win_rate),
                format!("{:.4}", row.expectancy_r),
                format!("{:.2}", row.avg_bars_to_resolution),
                format!("{:.2}", row.avg_duration_hours),
                format!("{:.2}", row.equity.final_balance),
                format!("{:.2}", row.equity.peak_balance),
                format!("{:.4}", row.equity.max_drawdown_pct),
            ])
            .map_err(|e| csv_error(output_path, e))?;
        }

        wtr.flush()?;
        tracing::info!(
            path = output_path,
            rows = report.metrics.rows.len(),
            "wrote metrics report"
        );
        Ok(())
    }

    fn write_equity(&self, report: &BacktestReport, output_path: &str) -> Result<(), FxError> {
        let mut wtr = writer(output_path)?;
        wtr.write_record(EQUITY_HEADER)
            .map_err(|e| csv_error(output_path, e))?;

        let mut points = 0;
        for row in &report.metrics.rows {
            let label = row.parameter_set.label();
            for (n, point) in row.equity.curve.iter().enumerate() {
                wtr.write_record([
                    label.clone(),
                    (n + 1).to_string(),
                    point.signal_id.to_string(),
                    format_timestamp(&point.timestamp),
                    if point.win { "win" } else { "loss" }.to_string(),
                    format!("{:.2}", point.balance),
                    format!("{:.4}", point.drawdown_pct),
                ])
                .map_err(|e| csv_error(output_path, e))?;
                points += 1;
            }
        }

        wtr.flush()?;
        tracing::info!(path = output_path, points, "wrote equity curves");
        Ok(())
    }

    fn write_trades(
        &self,
        trades: &TradeArena,
        grid: &Grid,
        output_path: &str,
    ) -> Result<(), FxError> {
        let mut wtr = writer(output_path)?;
        wtr.write_record(TRADES_HEADER)
            .map_err(|e| csv_error(output_path, e))?;

        for trade in trades.trades() {
            let label = grid
                .get(trade.parameter_set_id)
                .map(|set| set.label())
                .unwrap_or_default();
            let annotation = |key: &str| {
                trades
                    .signal(trade.signal_id)
                    .and_then(|s| s.annotations.get(key))
                    .unwrap_or_default()
                    .to_string()
            };
            wtr.write_record([
                trade.signal_id.to_string(),
                label,
                trade.direction.to_string(),
                trade.session.to_string(),
                format_timestamp(&trade.entry_timestamp),
                trade.entry_price.to_string(),
                trade.stop_price.to_string(),
                trade.target_price.to_string(),
                trade.outcome.to_string(),
                format_timestamp(&trade.exit_timestamp),
                trade.bars_to_resolution.to_string(),
                format!("{:.2}", trade.duration_hours()),
                trades.news_tags(trade.signal_id).len().to_string(),
                annotation("h4"),
                annotation("h1"),
                annotation("m15"),
                annotation("entry_point"),
            ])
            .map_err(|e| csv_error(output_path, e))?;
        }

        wtr.flush()?;
        tracing::info!(path = output_path, trades = trades.len(), "wrote trade log");
        Ok(())
    }
}
