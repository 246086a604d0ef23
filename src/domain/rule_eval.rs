//! Rule evaluation against a bar history.
//!
//! Indicator operands are computed on demand from the trailing window that
//! ends at the bar being evaluated, so a rule evaluated at `bar_index` can
//! never observe `bars[bar_index + 1..]`.
//!
//! # Evaluation Semantics
//!
//! - Comparison rules: Evaluate at the given bar index
//! - `CROSS_ABOVE`/`CROSS_BELOW`: Require `index >= 1`, return `false` at index 0
//! - `AND`: Short-circuits on first `false`
//! - `OR`: Short-circuits on first `true`
//! - `CONSECUTIVE(rule, N)`: Child must be true for N consecutive bars ending at current
//! - `ANY_OF(rule, N)`: Child must be true at least once in the last N bars
//!
//! An operand that has no value yet (indicator warmup, index out of range)
//! resolves to NaN, which makes every comparison involving it false.

use crate::domain::bar::Bar;
use crate::domain::rule::{Operand, Rule};

const EPSILON: f64 = 1e-9;

pub fn evaluate(rule: &Rule, bars: &[Bar], bar_index: usize) -> bool {
    match rule {
        Rule::CrossAbove { left, right } => {
            if bar_index == 0 {
                return false;
            }
            let left_curr = resolve_operand(left, bars, bar_index);
            let right_curr = resolve_operand(right, bars, bar_index);
            let left_prev = resolve_operand(left, bars, bar_index - 1);
            let right_prev = resolve_operand(right, bars, bar_index - 1);

            left_curr > right_curr && left_prev <= right_prev
        }
        Rule::CrossBelow { left, right } => {
            if bar_index == 0 {
                return false;
            }
            let left_curr = resolve_operand(left, bars, bar_index);
            let right_curr = resolve_operand(right, bars, bar_index);
            let left_prev = resolve_operand(left, bars, bar_index - 1);
            let right_prev = resolve_operand(right, bars, bar_index - 1);

            left_curr < right_curr && left_prev >= right_prev
        }
        Rule::Above { left, right } => {
            resolve_operand(left, bars, bar_index) > resolve_operand(right, bars, bar_index)
        }
        Rule::Below { left, right } => {
            resolve_operand(left, bars, bar_index) < resolve_operand(right, bars, bar_index)
        }
        Rule::Between {
            operand,
            lower,
            upper,
        } => {
            let val = resolve_operand(operand, bars, bar_index);
            val >= *lower && val <= *upper
        }
        Rule::Equals { left, right } => {
            let left_val = resolve_operand(left, bars, bar_index);
            let right_val = resolve_operand(right, bars, bar_index);
            (left_val - right_val).abs() < EPSILON
        }
        Rule::And(rules) => rules.iter().all(|r| evaluate(r, bars, bar_index)),
        Rule::Or(rules) => rules.iter().any(|r| evaluate(r, bars, bar_index)),
        Rule::Not(rule) => !evaluate(rule, bars, bar_index),
        Rule::Consecutive { rule, count } => {
            if *count == 0 || bar_index + 1 < *count {
                return false;
            }
            ((bar_index + 1 - *count)..=bar_index).all(|i| evaluate(rule, bars, i))
        }
        Rule::AnyOf { rule, count } => {
            if *count == 0 {
                return false;
            }
            let start = bar_index.saturating_sub(*count - 1);
            (start..=bar_index).any(|i| evaluate(rule, bars, i))
        }
    }
}

fn resolve_operand(operand: &Operand, bars: &[Bar], bar_index: usize) -> f64 {
    if let Operand::Constant(v) = operand {
        return *v;
    }
    let Some(bar) = bars.get(bar_index) else {
        return f64::NAN;
    };
    match operand {
        Operand::Open => bar.open,
        Operand::High => bar.high,
        Operand::Low => bar.low,
        Operand::Close => bar.close,
        Operand::Volume => bar.volume as f64,
        Operand::Constant(v) => *v,
        Operand::Indicator(ind) => ind.value_at(bars, bar_index).unwrap_or(f64::NAN),
    }
}
