//! Rule AST data structures.
//!
//! This module defines the abstract syntax tree for entry rules:
//! - `Operand`: What can be compared (price fields, constants, indicators)
//! - `Rule`: The rule AST with comparison, composite, and temporal variants

use crate::domain::indicator::IndicatorType;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Open,
    High,
    Low,
    Close,
    Volume,
    Constant(f64),
    Indicator(IndicatorType),
}

impl Operand {
    /// Bars of history needed to resolve this operand at one bar.
    pub fn lookback(&self) -> usize {
        match self {
            Operand::Indicator(ind) => ind.lookback(),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    CrossAbove {
        left: Operand,
        right: Operand,
    },
    CrossBelow {
        left: Operand,
        right: Operand,
    },
    Above {
        left: Operand,
        right: Operand,
    },
    Below {
        left: Operand,
        right: Operand,
    },
    Between {
        operand: Operand,
        lower: f64,
        upper: f64,
    },
    Equals {
        left: Operand,
        right: Operand,
    },
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Not(Box<Rule>),
    Consecutive {
        rule: Box<Rule>,
        count: usize,
    },
    AnyOf {
        rule: Box<Rule>,
        count: usize,
    },
}

impl Rule {
    /// Trailing bars, signal bar included, the rule needs before it can be
    /// evaluated without reading past the start of the series.
    pub fn min_history(&self) -> usize {
        match self {
            Rule::Above { left, right }
            | Rule::Below { left, right }
            | Rule::Equals { left, right } => left.lookback().max(right.lookback()),
            Rule::CrossAbove { left, right } | Rule::CrossBelow { left, right } => {
                left.lookback().max(right.lookback()) + 1
            }
            Rule::Between { operand, .. } => operand.lookback(),
            Rule::And(rules) | Rule::Or(rules) => {
                rules.iter().map(Rule::min_history).max().unwrap_or(1)
            }
            Rule::Not(rule) => rule.min_history(),
            Rule::Consecutive { rule, count } | Rule::AnyOf { rule, count } => {
                rule.min_history() + count.saturating_sub(1)
            }
        }
    }
}

/// All indicators referenced anywhere in `rule`.
pub fn extract_indicators(rule: &Rule) -> HashSet<IndicatorType> {
    let mut out = HashSet::new();
    collect_indicators(rule, &mut out);
    out
}

fn collect_indicators(rule: &Rule, out: &mut HashSet<IndicatorType>) {
    let mut add = |operand: &Operand| {
        if let Operand::Indicator(ind) = operand {
            out.insert(*ind);
        }
    };
    match rule {
        Rule::CrossAbove { left, right }
        | Rule::CrossBelow { left, right }
        | Rule::Above { left, right }
        | Rule::Below { left, right }
        | Rule::Equals { left, right } => {
            add(left);
            add(right);
        }
        Rule::Between { operand, .. } => add(operand),
        Rule::And(rules) | Rule::Or(rules) => {
            for r in rules {
                collect_indicators(r, out);
            }
        }
        Rule::Not(rule) | Rule::Consecutive { rule, .. } | Rule::AnyOf { rule, .. } => {
            collect_indicators(rule, out)
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Open => write!(f, "open"),
            Operand::High => write!(f, "high"),
            Operand::Low => write!(f, "low"),
            Operand::Close => write!(f, "close"),
            Operand::Volume => write!(f, "volume"),
            Operand::Constant(v) => write!(f, "{}", v),
            Operand::Indicator(ind) => write!(f, "{}", ind),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, name: &str, rules: &[Rule]) -> fmt::Result {
            write!(f, "{}(", name)?;
            for (i, r) in rules.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", r)?;
            }
            write!(f, ")")
        }

        match self {
            Rule::CrossAbove { left, right } => write!(f, "CROSS_ABOVE({}, {})", left, right),
            Rule::CrossBelow { left, right } => write!(f, "CROSS_BELOW({}, {})", left, right),
            Rule::Above { left, right } => write!(f, "ABOVE({}, {})", left, right),
            Rule::Below { left, right } => write!(f, "BELOW({}, {})", left, right),
            Rule::Equals { left, right } => write!(f, "EQUALS({}, {})", left, right),
            Rule::Between {
                operand,
                lower,
                upper,
            } => write!(f, "BETWEEN({}, {}, {})", operand, lower, upper),
            Rule::And(rules) => join(f, "AND", rules),
            Rule::Or(rules) => join(f, "OR", rules),
            Rule::Not(rule) => write!(f, "NOT({})", rule),
            Rule::Consecutive { rule, count } => write!(f, "CONSECUTIVE({}, {})", rule, count),
            Rule::AnyOf { rule, count } => write!(f, "ANY_OF({}, {})", rule, count),
        }
    }
}
