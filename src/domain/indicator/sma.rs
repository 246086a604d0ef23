//! Simple Moving Average.
//!
//! SMA(n) = sum(C[i-j] for j in 0..n) / n

use crate::domain::bar::Bar;

/// Mean close of `window`.
pub fn sma(window: &[Bar]) -> f64 {
    window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64
}
