//! Window indicators evaluated over a bar history.
//!
//! Every indicator here is a pure function of a fixed-size trailing window:
//! the value "at" a bar only reads that bar and the bars before it. Rules are
//! evaluated against a history slice ending at the candidate signal bar, so
//! nothing after that bar is ever visible.

pub mod atr;
pub mod channel;
pub mod roc;
pub mod sma;
pub mod stddev;

use crate::domain::bar::Bar;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Stddev(usize),
    Roc(usize),
    Atr(usize),
    /// Highest high of the `n` bars before the current one.
    Highest(usize),
    /// Lowest low of the `n` bars before the current one.
    Lowest(usize),
}

impl IndicatorType {
    /// Bars required, current bar included, before a value exists.
    pub fn lookback(&self) -> usize {
        match self {
            IndicatorType::Sma(n) | IndicatorType::Stddev(n) => *n,
            IndicatorType::Roc(n)
            | IndicatorType::Atr(n)
            | IndicatorType::Highest(n)
            | IndicatorType::Lowest(n) => n + 1,
        }
    }

    pub fn period(&self) -> usize {
        match self {
            IndicatorType::Sma(n)
            | IndicatorType::Stddev(n)
            | IndicatorType::Roc(n)
            | IndicatorType::Atr(n)
            | IndicatorType::Highest(n)
            | IndicatorType::Lowest(n) => *n,
        }
    }

    /// Value at `bars[index]`, or `None` during warmup.
    pub fn value_at(&self, bars: &[Bar], index: usize) -> Option<f64> {
        if index >= bars.len() || self.period() == 0 || index + 1 < self.lookback() {
            return None;
        }
        let window = &bars[index + 1 - self.lookback()..=index];
        match self {
            IndicatorType::Sma(_) => Some(sma::sma(window)),
            IndicatorType::Stddev(_) => Some(stddev::stddev(window)),
            IndicatorType::Roc(_) => Some(roc::roc(window)),
            IndicatorType::Atr(_) => Some(atr::atr(window)),
            IndicatorType::Highest(_) => Some(channel::highest_before(window)),
            IndicatorType::Lowest(_) => Some(channel::lowest_before(window)),
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Highest(period) => write!(f, "HIGHEST({})", period),
            IndicatorType::Lowest(period) => write!(f, "LOWEST({})", period),
        }
    }
}
