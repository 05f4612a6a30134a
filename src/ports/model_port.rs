//! Capability traits for the two halves of a rebalance tick.

use chrono::NaiveDateTime;

use crate::domain::aggregator::Prediction;
use crate::domain::portfolio::Weights;
use crate::domain::universe::Universe;

/// Turns market state into directional predictions.
pub trait AlphaModel {
    /// Returns no predictions on ticks the model skips.
    fn update(&mut self, now: NaiveDateTime, universe: &Universe) -> Vec<Prediction>;

    /// Drop any state kept for an asset leaving coverage.
    fn remove_asset(&mut self, _asset: &str) {}
}

/// Turns predictions into target weights.
pub trait PortfolioModel {
    /// Returns asset -> signed target weight; an absent asset means no change.
    fn construct(
        &mut self,
        now: NaiveDateTime,
        predictions: &[Prediction],
        holdings: &Weights,
    ) -> Weights;

    /// The most recent targets, used as holdings under perfect execution.
    fn previous_targets(&self) -> &Weights;

    fn remove_asset(&mut self, _asset: &str) {}
}
