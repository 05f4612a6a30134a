//! Conviction-weighted, turnover-constrained portfolio construction.

use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::aggregator::Prediction;
use super::error::EngineError;
use crate::ports::model_port::PortfolioModel;

/// Asset -> signed weight as a fraction of total value.
pub type Weights = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioConfig {
    pub rebalance_period: Duration,
    pub max_weight: f64,
    /// Maximum sum of absolute weight changes per rebalance.
    pub max_turnover: f64,
    /// Scaled changes smaller than this are dropped.
    pub min_weight_change: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        PortfolioConfig {
            rebalance_period: Duration::hours(24),
            max_weight: 0.25,
            max_turnover: 0.10,
            min_weight_change: 0.001,
        }
    }
}

impl PortfolioConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.rebalance_period <= Duration::zero() {
            return Err(EngineError::invalid(
                "portfolio",
                "rebalance_period_hours",
                "rebalance period must be positive",
            ));
        }
        if !(self.max_weight > 0.0 && self.max_weight <= 1.0) {
            return Err(EngineError::invalid(
                "portfolio",
                "max_weight",
                "max_weight must be in (0, 1]",
            ));
        }
        if !self.max_turnover.is_finite() || self.max_turnover < 0.0 {
            return Err(EngineError::invalid(
                "portfolio",
                "max_turnover",
                "max_turnover must be non-negative",
            ));
        }
        if !self.min_weight_change.is_finite() || self.min_weight_change < 0.0 {
            return Err(EngineError::invalid(
                "portfolio",
                "min_weight_change",
                "min_weight_change must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Sum of `sign(direction) * confidence * magnitude` per asset, skipping zero nets.
pub fn net_conviction(predictions: &[Prediction]) -> BTreeMap<String, f64> {
    let mut conviction: BTreeMap<String, f64> = BTreeMap::new();
    for p in predictions {
        *conviction.entry(p.asset.clone()).or_default() +=
            p.direction.sign() * p.confidence * p.magnitude;
    }
    conviction.retain(|_, c| *c != 0.0 && c.is_finite());
    conviction
}

/// Normalize convictions by their absolute total and cap at `max_weight`.
pub fn raw_weights(conviction: &BTreeMap<String, f64>, max_weight: f64) -> Weights {
    let total: f64 = conviction.values().map(|c| c.abs()).sum();
    if total <= 0.0 {
        return Weights::new();
    }
    conviction
        .iter()
        .map(|(asset, c)| (asset.clone(), c.signum() * max_weight.min(c.abs() / total)))
        .collect()
}

/// Σ |target - holding| over the proposed targets; missing holdings count as 0.
pub fn turnover(targets: &Weights, holdings: &Weights) -> f64 {
    targets
        .iter()
        .map(|(asset, w)| (w - holdings.get(asset).copied().unwrap_or(0.0)).abs())
        .sum()
}

/// Throttle the move from `holdings` to `raw` so turnover stays within `max_turnover`.
///
/// Within the limit the raw targets are returned unchanged. Otherwise every
/// weight change is scaled by the same factor and negligible changes dropped.
pub fn limit_turnover(
    raw: &Weights,
    holdings: &Weights,
    max_turnover: f64,
    min_weight_change: f64,
) -> Weights {
    let total = turnover(raw, holdings);
    if total <= max_turnover {
        return raw.clone();
    }
    let scale = max_turnover / total;
    debug!(total, scale, "scaling weight changes to turnover limit");

    raw.iter()
        .filter_map(|(asset, target)| {
            let current = holdings.get(asset).copied().unwrap_or(0.0);
            let change = (target - current) * scale;
            (change.abs() >= min_weight_change).then(|| (asset.clone(), current + change))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PortfolioConstructor {
    config: PortfolioConfig,
    previous_targets: Weights,
    next_rebalance: Option<NaiveDateTime>,
}

impl PortfolioConstructor {
    pub fn new(config: PortfolioConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(PortfolioConstructor {
            config,
            previous_targets: Weights::new(),
            next_rebalance: None,
        })
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    pub fn next_rebalance(&self) -> Option<NaiveDateTime> {
        self.next_rebalance
    }

    /// Construct with the previous targets standing in for holdings.
    pub fn construct_from_previous(
        &mut self,
        now: NaiveDateTime,
        predictions: &[Prediction],
    ) -> Weights {
        let holdings = self.previous_targets.clone();
        self.construct(now, predictions, &holdings)
    }

    /// Targets for this set of predictions, ignoring rebalance gating.
    pub fn target_weights(&self, predictions: &[Prediction], holdings: &Weights) -> Weights {
        let conviction = net_conviction(predictions);
        let raw = raw_weights(&conviction, self.config.max_weight);
        limit_turnover(
            &raw,
            holdings,
            self.config.max_turnover,
            self.config.min_weight_change,
        )
    }
}

impl PortfolioModel for PortfolioConstructor {
    fn construct(
        &mut self,
        now: NaiveDateTime,
        predictions: &[Prediction],
        holdings: &Weights,
    ) -> Weights {
        if predictions.is_empty() || self.next_rebalance.is_some_and(|next| now < next) {
            return Weights::new();
        }
        self.next_rebalance = Some(now + self.config.rebalance_period);

        let targets = self.target_weights(predictions, holdings);
        for (asset, weight) in &targets {
            self.previous_targets.insert(asset.clone(), *weight);
        }
        info!(
            %now,
            predictions = predictions.len(),
            targets = targets.len(),
            "portfolio rebalanced"
        );
        targets
    }

    fn previous_targets(&self) -> &Weights {
        &self.previous_targets
    }

    fn remove_asset(&mut self, asset: &str) {
        self.previous_targets.remove(asset);
    }
}
