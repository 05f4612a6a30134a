//! Historical replay: feed merged bar histories through an engine tick by tick.
//!
//! Holdings are assumed to equal the previous targets after every tick (no
//! fills, no costs). The output is the sequence of emitted target weights.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use tracing::info;

use super::engine::Engine;
use super::error::EngineError;
use super::universe::AssetHistory;
use crate::ports::model_port::{AlphaModel, PortfolioModel};

/// One emitted target weight.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRow {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub ticks: usize,
    pub bars: usize,
    /// Ticks that produced at least one target.
    pub rebalances: usize,
    pub rows: Vec<TargetRow>,
}

/// Every distinct bar timestamp across all histories, ascending.
pub fn build_timeline(histories: &[AssetHistory]) -> Vec<NaiveDateTime> {
    let unique: BTreeSet<NaiveDateTime> = histories
        .iter()
        .flat_map(|h| h.bars.iter().map(|bar| bar.timestamp))
        .collect();
    unique.into_iter().collect()
}

pub fn replay<A: AlphaModel, P: PortfolioModel>(
    engine: &mut Engine<A, P>,
    histories: &[AssetHistory],
) -> Result<ReplaySummary, EngineError> {
    let timeline = build_timeline(histories);
    let mut cursors = vec![0usize; histories.len()];
    let mut summary = ReplaySummary::default();

    info!(assets = histories.len(), ticks = timeline.len(), "starting replay");

    for &now in &timeline {
        for (history, cursor) in histories.iter().zip(cursors.iter_mut()) {
            while let Some(bar) = history.bars.get(*cursor).filter(|b| b.timestamp <= now) {
                engine.on_bar(&history.asset, bar.clone())?;
                *cursor += 1;
                summary.bars += 1;
            }
        }

        let targets = engine.tick_from_previous(now);
        if !targets.is_empty() {
            summary.rebalances += 1;
        }
        summary
            .rows
            .extend(targets.into_iter().map(|(asset, weight)| TargetRow {
                timestamp: now,
                asset,
                weight,
            }));
        summary.ticks += 1;
    }

    info!(
        ticks = summary.ticks,
        bars = summary.bars,
        rebalances = summary.rebalances,
        rows = summary.rows.len(),
        "replay finished"
    );
    Ok(summary)
}
