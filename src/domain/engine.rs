//! One rebalance loop: universe state, alpha model and portfolio model.

use chrono::NaiveDateTime;

use super::aggregator::{AggregatorConfig, InsightAggregator};
use super::error::EngineError;
use super::ohlcv::OhlcvBar;
use super::portfolio::{PortfolioConfig, PortfolioConstructor, Weights};
use super::tracker::TrackerConfig;
use super::universe::Universe;
use crate::ports::model_port::{AlphaModel, PortfolioModel};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub tracker: TrackerConfig,
    pub aggregator: AggregatorConfig,
    pub portfolio: PortfolioConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.tracker.validate()?;
        self.aggregator.validate()?;
        self.portfolio.validate()
    }
}

pub struct Engine<A = InsightAggregator, P = PortfolioConstructor> {
    universe: Universe,
    alpha: A,
    portfolio: P,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let universe = Universe::new(config.aggregator.window_capacity);
        let alpha = InsightAggregator::new(config.aggregator, config.tracker)?;
        let portfolio = PortfolioConstructor::new(config.portfolio)?;
        Ok(Engine::with_models(universe, alpha, portfolio))
    }
}

impl<A: AlphaModel, P: PortfolioModel> Engine<A, P> {
    pub fn with_models(universe: Universe, alpha: A, portfolio: P) -> Self {
        Engine {
            universe,
            alpha,
            portfolio,
        }
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn alpha(&self) -> &A {
        &self.alpha
    }

    pub fn portfolio(&self) -> &P {
        &self.portfolio
    }

    pub fn on_bar(&mut self, asset: &str, bar: OhlcvBar) -> Result<(), EngineError> {
        self.universe.push_bar(asset, bar)
    }

    pub fn remove_asset(&mut self, asset: &str) {
        self.universe.remove(asset);
        self.alpha.remove_asset(asset);
        self.portfolio.remove_asset(asset);
    }

    /// Run one tick; the result maps asset to target weight, absence meaning no change.
    pub fn tick(&mut self, now: NaiveDateTime, holdings: &Weights) -> Weights {
        let predictions = self.alpha.update(now, &self.universe);
        self.portfolio.construct(now, &predictions, holdings)
    }

    /// Run one tick assuming the previous targets were filled exactly.
    pub fn tick_from_previous(&mut self, now: NaiveDateTime) -> Weights {
        let holdings = self.portfolio.previous_targets().clone();
        self.tick(now, &holdings)
    }
}
