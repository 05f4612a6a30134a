//! OHLCV bars and the bounded per-asset rolling window.

use chrono::NaiveDateTime;
use std::collections::VecDeque;

use super::error::EngineError;

pub const DEFAULT_WINDOW_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// |close - open|
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// high - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// high - max(open, close)
    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    /// min(open, close) - low
    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Fixed-capacity, newest-last window of bars for a single asset.
///
/// Timestamps are strictly increasing. Once the window is full, pushing a new
/// bar evicts the oldest one.
#[derive(Debug, Clone)]
pub struct OhlcvWindow {
    asset: String,
    capacity: usize,
    bars: VecDeque<OhlcvBar>,
}

impl OhlcvWindow {
    pub fn new(asset: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        OhlcvWindow {
            asset: asset.into(),
            capacity,
            bars: VecDeque::with_capacity(capacity),
        }
    }

    /// Build a window from a batch of bars, keeping the newest `capacity`.
    pub fn from_bars(
        asset: impl Into<String>,
        capacity: usize,
        bars: impl IntoIterator<Item = OhlcvBar>,
    ) -> Result<Self, EngineError> {
        let mut window = OhlcvWindow::new(asset, capacity);
        for bar in bars {
            window.push(bar)?;
        }
        Ok(window)
    }

    pub fn push(&mut self, bar: OhlcvBar) -> Result<(), EngineError> {
        if let Some(last) = self.bars.back() {
            if bar.timestamp <= last.timestamp {
                return Err(EngineError::InvalidWindow {
                    asset: self.asset.clone(),
                    reason: format!(
                        "bar at {} does not follow {}",
                        bar.timestamp, last.timestamp
                    ),
                });
            }
        }
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        Ok(())
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.back().map(|b| b.close)
    }

    pub fn bars(&self) -> impl Iterator<Item = &OhlcvBar> {
        self.bars.iter()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }
}
