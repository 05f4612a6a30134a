//! CSV bar source and target-weight sink.
//!
//! Bars live in `<dir>/<ASSET>.csv` with the header
//! `timestamp,open,high,low,close,volume` and timestamps formatted as
//! [`TIMESTAMP_FORMAT`].

use crate::domain::error::EngineError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::replay::TargetRow;
use crate::ports::data_port::DataPort;
use chrono::NaiveDateTime;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{asset}.csv"))
    }
}

fn data_err(reason: impl Into<String>) -> EngineError {
    EngineError::Data {
        reason: reason.into(),
    }
}

fn parse_column(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, EngineError> {
    let raw = record
        .get(index)
        .ok_or_else(|| data_err(format!("missing {name} column")))?;
    raw.trim()
        .parse()
        .map_err(|e| data_err(format!("invalid {name} value '{raw}': {e}")))
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        asset: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, EngineError> {
        let path = self.csv_path(asset);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_err(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| data_err(format!("CSV parse error: {e}")))?;

            let raw_ts = record
                .get(0)
                .ok_or_else(|| data_err("missing timestamp column"))?;
            let timestamp = NaiveDateTime::parse_from_str(raw_ts.trim(), TIMESTAMP_FORMAT)
                .map_err(|e| data_err(format!("invalid timestamp '{raw_ts}': {e}")))?;

            if start.is_some_and(|s| timestamp < s) || end.is_some_and(|e| timestamp > e) {
                continue;
            }

            bars.push(OhlcvBar {
                timestamp,
                open: parse_column(&record, 1, "open")?,
                high: parse_column(&record, 2, "high")?,
                low: parse_column(&record, 3, "low")?,
                close: parse_column(&record, 4, "close")?,
                volume: parse_column(&record, 5, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    fn list_assets(&self) -> Result<Vec<String>, EngineError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_err(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut assets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_err(format!("directory entry error: {e}")))?;
            let name = entry.file_name();
            if let Some(asset) = name.to_string_lossy().strip_suffix(".csv") {
                assets.push(asset.to_string());
            }
        }

        assets.sort();
        Ok(assets)
    }
}

/// Write target rows as `timestamp,asset,weight`.
pub fn write_targets<W: Write>(writer: W, rows: &[TargetRow]) -> Result<(), EngineError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["timestamp", "asset", "weight"])
        .map_err(|e| data_err(format!("CSV write error: {e}")))?;
    for row in rows {
        wtr.write_record([
            row.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            row.asset.clone(),
            format!("{:.6}", row.weight),
        ])
        .map_err(|e| data_err(format!("CSV write error: {e}")))?;
    }
    wtr.flush()?;
    Ok(())
}
