//! Bar source port trait.

use crate::domain::error::EngineError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Bars for `asset` with `start <= timestamp <= end`, oldest first.
    fn fetch_bars(
        &self,
        asset: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, EngineError>;

    fn list_assets(&self) -> Result<Vec<String>, EngineError>;
}
