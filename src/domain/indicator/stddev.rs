//! Standard Deviation indicator.
//!
//! Population standard deviation over n closing prices.
//! STDDEV(n) = sqrt(sum((C[i-j] - SMA(n))^2 for j in 0..n) / n)

use crate::domain::bar::Bar;
use crate::domain::indicator::sma::sma;

pub fn stddev(window: &[Bar]) -> f64 {
    let mean = sma(window);
    let variance: f64 = window
        .iter()
        .map(|b| {
            let diff = b.close - mean;
            diff * diff
        })
        .sum::<f64>()
        / window.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::closes;

    #[test]
    fn stddev_constant_prices() {
        let bars = closes(&[50.0, 50.0, 50.0, 50.0]);
        assert!(stddev(&bars).abs() < 1e-10);
    }

    #[test]
    fn stddev_known_values() {
        // mean 5, squared diffs 9,1,1,9 -> variance 5
        let bars = closes(&[2.0, 4.0, 6.0, 8.0]);
        assert!((stddev(&bars) - 5.0_f64.sqrt()).abs() < 1e-10);
    }
}
