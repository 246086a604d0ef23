//! Report output port trait.

use crate::domain::engine::{BacktestReport, TradeArena};
use crate::domain::error::FxError;
use crate::domain::grid::Grid;

/// Port for writing backtest results.
pub trait ReportPort {
    /// Write the per-configuration metrics table.
    fn write(&self, report: &BacktestReport, output_path: &str) -> Result<(), FxError>;

    /// Write the equity curve of every grid cell, one line per resolved trade.
    fn write_equity(&self, report: &BacktestReport, output_path: &str) -> Result<(), FxError>;

    /// Write one line per simulated trade.
    fn write_trades(
        &self,
        trades: &TradeArena,
        grid: &Grid,
        output_path: &str,
    ) -> Result<(), FxError>;
}
