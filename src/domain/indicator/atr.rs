//! Average True Range over a fixed window.
//!
//! ATR(n) = mean(TR[i-j] for j in 0..n), TR against the previous close.
//! The window carries one extra leading bar that only supplies a close.

use crate::domain::bar::Bar;

pub fn atr(window: &[Bar]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let sum: f64 = window
        .windows(2)
        .map(|pair| pair[1].true_range(pair[0].close))
        .sum();
    sum / (window.len() - 1) as f64
}
