#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use confluence::domain::error::EngineError;
pub use confluence::domain::ohlcv::OhlcvBar;
use confluence::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, asset: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(asset.to_string(), bars);
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        asset: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, EngineError> {
        if let Some(reason) = self.errors.get(asset) {
            return Err(EngineError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(asset)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|b| {
                start.is_none_or(|s| b.timestamp >= s) && end.is_none_or(|e| b.timestamp <= e)
            })
            .collect())
    }

    fn list_assets(&self) -> Result<Vec<String>, EngineError> {
        let mut assets: Vec<String> = self.data.keys().cloned().collect();
        assets.sort();
        Ok(assets)
    }
}

pub fn hour(h: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(h)
}

/// Hourly bars whose closes follow `closes`; open at the previous close.
pub fn bars_from_closes(closes: &[f64], volume: f64) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            OhlcvBar {
                timestamp: hour(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume,
            }
        })
        .collect()
}

/// Steady uptrend: close = start + step * i.
pub fn trending_bars(count: usize, start: f64, step: f64) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
    bars_from_closes(&closes, 1_000.0)
}

/// Deterministic oscillation around `base`, useful for exercising every rule.
pub fn wave_bars(count: usize, base: f64, amplitude: f64) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| {
            let t = i as f64;
            base + amplitude * (t / 6.0).sin() + 0.3 * amplitude * (t / 2.0).cos()
        })
        .collect();
    let mut bars = bars_from_closes(&closes, 1_000.0);
    for (i, bar) in bars.iter_mut().enumerate() {
        bar.volume = 800.0 + 400.0 * ((i % 7) as f64);
    }
    bars
}

pub fn write_bars_csv(dir: &Path, asset: &str, bars: &[OhlcvBar]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    fs::write(dir.join(format!("{asset}.csv")), content).unwrap();
}

/// Flat range at 100 with a close spike to 115 nine bars before the end, a
/// small bearish bar, then a bullish engulfing marubozu breakout to 110.
///
/// With default settings the last bar votes bullish through the trendline
/// breakout, marubozu and engulfing, and bearish through proximity to the
/// 115 resistance.
pub fn breakout_bars(count: usize) -> Vec<OhlcvBar> {
    assert!(count >= 30);
    (0..count)
        .map(|i| {
            let (open, high, low, close) = if i == count - 10 {
                (100.0, 115.5, 99.5, 115.0)
            } else if i == count - 2 {
                (101.0, 101.2, 99.5, 100.0)
            } else if i == count - 1 {
                (100.0, 110.0, 100.0, 110.0)
            } else {
                (100.0, 100.5, 99.5, 100.0)
            };
            OhlcvBar {
                timestamp: hour(i as i64),
                open,
                high,
                low,
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}
