//! ROC (Rate of Change).
//!
//! ROC(n) = ((C[i] - C[i-n]) / C[i-n]) * 100
//! If C[i-n] == 0: ROC = 0

use crate::domain::bar::Bar;

/// Rate of change from the first to the last close of an `n + 1` bar window.
pub fn roc(window: &[Bar]) -> f64 {
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return 0.0;
    };
    if first.close == 0.0 {
        0.0
    } else {
        ((last.close - first.close) / first.close) * 100.0
    }
}
