//! Price channel bounds (Donchian style).
//!
//! The last bar of the window is the reference bar and is excluded, so
//! `close > HIGHEST(n)` is a breakout above the prior n-bar range.

use crate::domain::bar::Bar;

pub fn highest_before(window: &[Bar]) -> f64 {
    let prior = &window[..window.len().saturating_sub(1)];
    prior.iter().map(|b| b.high).fold(f64::NAN, f64::max)
}

pub fn lowest_before(window: &[Bar]) -> f64 {
    let prior = &window[..window.len().saturating_sub(1)];
    prior.iter().map(|b| b.low).fold(f64::NAN, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::closes;
    use crate::domain::indicator::IndicatorType;

    #[test]
    fn highest_excludes_reference_bar() {
        let bars = closes(&[3.0, 5.0, 4.0, 9.0]);
        let v = IndicatorType::Highest(3).value_at(&bars, 3).unwrap();
        assert_eq!(v, 5.0);
    }

    #[test]
    fn lowest_excludes_reference_bar() {
        let bars = closes(&[3.0, 5.0, 4.0, 1.0]);
        let v = IndicatorType::Lowest(3).value_at(&bars, 3).unwrap();
        assert_eq!(v, 3.0);
    }

    #[test]
    fn single_bar_window_is_nan() {
        let bars = closes(&[3.0]);
        assert!(highest_before(&bars).is_nan());
    }
}
