//! Core domain types and logic.

pub mod bar;
pub mod bar_series;
pub mod news;
pub mod indicator;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod strategy;
pub mod signal;
pub mod news_filter;
pub mod session;
pub mod grid;
pub mod simulator;
pub mod aggregator;
pub mod engine;
pub mod config_validation;
pub mod error;
