//! The set of covered assets and their rolling bar windows.
//!
//! A window is created on the first bar observed for an asset and lives until
//! the host calls [`Universe::remove`] for it. Nothing is evicted implicitly.

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::domain::error::EngineError;
use crate::domain::ohlcv::{OhlcvBar, OhlcvWindow};
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone)]
pub struct Universe {
    capacity: usize,
    windows: BTreeMap<String, OhlcvWindow>,
}

impl Universe {
    pub fn new(capacity: usize) -> Self {
        Universe {
            capacity,
            windows: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push_bar(&mut self, asset: &str, bar: OhlcvBar) -> Result<(), EngineError> {
        let capacity = self.capacity;
        self.windows
            .entry(asset.to_string())
            .or_insert_with(|| {
                debug!(asset, capacity, "tracking new asset");
                OhlcvWindow::new(asset, capacity)
            })
            .push(bar)
    }

    pub fn remove(&mut self, asset: &str) -> Option<OhlcvWindow> {
        let removed = self.windows.remove(asset);
        if removed.is_some() {
            debug!(asset, "asset left coverage");
        }
        removed
    }

    pub fn window(&self, asset: &str) -> Option<&OhlcvWindow> {
        self.windows.get(asset)
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.windows.contains_key(asset)
    }

    /// Windows in asset order.
    pub fn windows(&self) -> impl Iterator<Item = &OhlcvWindow> {
        self.windows.values()
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Parse a comma-separated asset list into unique, trimmed symbols.
///
/// Symbols are case-sensitive: they name the data source's files verbatim.
pub fn parse_assets(input: &str) -> Result<Vec<String>, EngineError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(EngineError::Data {
                reason: "empty token in asset list".to_string(),
            });
        }
        let asset = trimmed.to_string();
        if !seen.insert(asset.clone()) {
            return Err(EngineError::Data {
                reason: format!("duplicate asset: {asset}"),
            });
        }
        assets.push(asset);
    }

    Ok(assets)
}

/// Bar history of one asset, oldest first.
#[derive(Debug, Clone)]
pub struct AssetHistory {
    pub asset: String,
    pub bars: Vec<OhlcvBar>,
}

/// Fetch bar histories, skipping assets that fail or return nothing.
///
/// Fails only when no asset has data.
pub fn fetch_histories(
    data_port: &dyn DataPort,
    assets: &[String],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<Vec<AssetHistory>, EngineError> {
    let mut histories = Vec::new();

    for asset in assets {
        let bars = match data_port.fetch_bars(asset, start, end) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(asset = %asset, error = %e, "skipping asset");
                continue;
            }
        };
        if bars.is_empty() {
            warn!(asset = %asset, "skipping asset with no bars");
            continue;
        }
        debug!(asset = %asset, bars = bars.len(), "loaded history");
        histories.push(AssetHistory {
            asset: asset.clone(),
            bars,
        });
    }

    if histories.is_empty() {
        return Err(EngineError::NoData {
            asset: assets.join(","),
        });
    }
    Ok(histories)
}
