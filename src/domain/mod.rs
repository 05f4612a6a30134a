//! Core domain types and logic.

pub mod aggregator;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod features;
pub mod indicator;
pub mod ohlcv;
pub mod pattern;
pub mod portfolio;
pub mod replay;
pub mod tracker;
pub mod universe;
