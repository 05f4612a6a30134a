//! Signal performance tracking and adaptive indicator weights.
//!
//! Every fired indicator is recorded as a [`Signal`]. At least one evaluation
//! delay later it is scored against the then-current price; the realized
//! return feeds per-(asset, indicator) statistics: hit counts, cumulative
//! return, and alpha/beta against a market-return series. Weights derived from
//! those statistics are bounded to `[min_weight, 1.0]`.
//!
//! Signal lifecycle: `unevaluated -> evaluated` or `unevaluated -> purged`.
//! Pruning happens after every `record_signal`, across all assets.

use chrono::{Duration, NaiveDateTime};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

use super::error::EngineError;
use super::indicator::{Direction, Indicator};

/// Market variance at or below this leaves alpha/beta unchanged.
const MIN_MARKET_VARIANCE: f64 = 1e-18;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Maximum signal age before it is purged.
    pub lookback: Duration,
    /// Minimum signal age before it can be evaluated.
    pub evaluation_delay: Duration,
    pub min_weight: f64,
    pub default_weight: f64,
    /// Weights fall back to `default_weight` below this many signals.
    pub min_signals_for_weight: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            lookback: Duration::hours(720),
            evaluation_delay: Duration::hours(1),
            min_weight: 0.2,
            default_weight: 0.5,
            min_signals_for_weight: 5,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.evaluation_delay <= Duration::zero() {
            return Err(EngineError::invalid(
                "tracker",
                "evaluation_delay_minutes",
                "evaluation delay must be positive",
            ));
        }
        if self.lookback < self.evaluation_delay {
            return Err(EngineError::invalid(
                "tracker",
                "lookback_period_hours",
                "lookback must be at least one evaluation delay",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_weight) {
            return Err(EngineError::invalid(
                "tracker",
                "min_weight",
                "min_weight must be between 0 and 1",
            ));
        }
        if !(self.min_weight..=1.0).contains(&self.default_weight) {
            return Err(EngineError::invalid(
                "tracker",
                "default_weight",
                "default_weight must be between min_weight and 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub timestamp: NaiveDateTime,
    pub asset: String,
    pub indicator: Indicator,
    pub direction: Direction,
    pub entry_price: f64,
    pub evaluated: bool,
    pub realized_return: Option<f64>,
}

impl Signal {
    /// Directional return from entry to `price`; `None` for a degenerate entry.
    pub fn return_at(&self, price: f64) -> Option<f64> {
        if self.entry_price == 0.0 || !self.entry_price.is_finite() || !price.is_finite() {
            return None;
        }
        let raw = (price - self.entry_price) / self.entry_price;
        Some(raw * self.direction.sign())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnSample {
    /// Timestamp of the signal that produced the return.
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorStats {
    pub total_signals: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub cumulative_return: f64,
    pub alpha: f64,
    pub beta: f64,
    pub signal_returns: VecDeque<ReturnSample>,
}

impl IndicatorStats {
    pub fn accuracy(&self) -> f64 {
        if self.total_signals == 0 {
            0.0
        } else {
            self.true_positives as f64 / self.total_signals as f64
        }
    }

    /// Signals recorded but not yet evaluated.
    pub fn pending(&self) -> usize {
        self.total_signals
            .saturating_sub(self.true_positives + self.false_positives)
    }

    pub fn weight(&self, config: &TrackerConfig) -> f64 {
        if self.total_signals < config.min_signals_for_weight {
            return config.default_weight;
        }
        let mut weight = self.accuracy();
        if self.alpha != 0.0 {
            weight *= (1.0 + self.alpha).clamp(0.5, 1.5);
        }
        if !weight.is_finite() {
            return config.min_weight;
        }
        weight.clamp(config.min_weight, 1.0)
    }

    pub fn metrics(&self) -> IndicatorMetrics {
        IndicatorMetrics {
            accuracy: self.accuracy(),
            total_signals: self.total_signals,
            cumulative_return: self.cumulative_return,
            alpha: self.alpha,
            beta: self.beta,
        }
    }

    fn apply_return(&mut self, sample: ReturnSample, market_returns: &[f64]) {
        self.signal_returns.push_back(sample);
        if sample.value > 0.0 {
            self.true_positives += 1;
        } else {
            self.false_positives += 1;
        }
        self.cumulative_return += sample.value;
        self.update_alpha_beta(market_returns);
    }

    /// Regress signal returns on the most recent market returns of equal count.
    ///
    /// Beta is the sample covariance over the population market variance.
    /// Leaves alpha/beta untouched when there are fewer than two returns, too
    /// few market samples, or a degenerate market variance.
    pub(crate) fn update_alpha_beta(&mut self, market_returns: &[f64]) {
        let n = self.signal_returns.len();
        if n < 2 || market_returns.len() < n {
            return;
        }
        let market = &market_returns[market_returns.len() - n..];
        let nf = n as f64;

        let mean_signal = self.signal_returns.iter().map(|s| s.value).sum::<f64>() / nf;
        let mean_market = market.iter().sum::<f64>() / nf;

        let mut covariance = 0.0;
        let mut variance = 0.0;
        for (sample, &m) in self.signal_returns.iter().zip(market) {
            let dm = m - mean_market;
            covariance += (sample.value - mean_signal) * dm;
            variance += dm * dm;
        }
        covariance /= nf - 1.0;
        variance /= nf;

        if !variance.is_finite() || variance <= MIN_MARKET_VARIANCE {
            return;
        }
        let beta = covariance / variance;
        let alpha = mean_signal - beta * mean_market;
        if beta.is_finite() && alpha.is_finite() {
            self.beta = beta;
            self.alpha = alpha;
        }
    }

    fn prune_returns(&mut self, cutoff: NaiveDateTime) {
        while self
            .signal_returns
            .front()
            .is_some_and(|s| s.timestamp <= cutoff)
        {
            self.signal_returns.pop_front();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorMetrics {
    pub accuracy: f64,
    pub total_signals: usize,
    pub cumulative_return: f64,
    pub alpha: f64,
    pub beta: f64,
}

#[derive(Debug, Clone)]
pub struct SignalTracker {
    config: TrackerConfig,
    signals: Vec<Signal>,
    stats: HashMap<String, HashMap<Indicator, IndicatorStats>>,
}

impl SignalTracker {
    pub fn new(config: TrackerConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(SignalTracker {
            config,
            signals: Vec::new(),
            stats: HashMap::new(),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live signal log, oldest first.
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn record_signal(
        &mut self,
        timestamp: NaiveDateTime,
        asset: &str,
        indicator: Indicator,
        direction: Direction,
        entry_price: f64,
    ) {
        self.stats
            .entry(asset.to_string())
            .or_default()
            .entry(indicator)
            .or_default()
            .total_signals += 1;

        self.signals.push(Signal {
            timestamp,
            asset: asset.to_string(),
            indicator,
            direction,
            entry_price,
            evaluated: false,
            realized_return: None,
        });

        self.prune(timestamp - self.config.lookback);
    }

    /// Score every eligible unevaluated signal of `asset` at `current_price`.
    ///
    /// `market_returns` is oldest-first. Returns the number of signals
    /// evaluated; a second call with the same inputs evaluates nothing.
    pub fn evaluate_signals(
        &mut self,
        now: NaiveDateTime,
        asset: &str,
        current_price: f64,
        market_returns: &[f64],
    ) -> usize {
        let mut evaluated = 0;
        for signal in self
            .signals
            .iter_mut()
            .filter(|s| !s.evaluated && s.asset == asset)
        {
            if now - signal.timestamp < self.config.evaluation_delay {
                continue;
            }
            let Some(realized) = signal.return_at(current_price) else {
                warn!(
                    asset,
                    indicator = %signal.indicator,
                    entry_price = signal.entry_price,
                    "skipping signal with degenerate entry price"
                );
                continue;
            };

            signal.evaluated = true;
            signal.realized_return = Some(realized);

            let stats = self
                .stats
                .entry(signal.asset.clone())
                .or_default()
                .entry(signal.indicator)
                .or_default();
            stats.apply_return(
                ReturnSample {
                    timestamp: signal.timestamp,
                    value: realized,
                },
                market_returns,
            );
            evaluated += 1;
        }

        if evaluated > 0 {
            debug!(asset, evaluated, "evaluated signals");
        }
        evaluated
    }

    pub fn get_indicator_metrics(
        &self,
        asset: &str,
        indicator: Indicator,
    ) -> Option<IndicatorMetrics> {
        self.stats(asset, indicator).map(IndicatorStats::metrics)
    }

    /// Current voting weight, always within `[min_weight, 1.0]`.
    pub fn get_indicator_weight(&self, asset: &str, indicator: Indicator) -> f64 {
        match self.stats(asset, indicator) {
            Some(stats) => stats.weight(&self.config),
            None => self.config.default_weight,
        }
    }

    pub fn stats(&self, asset: &str, indicator: Indicator) -> Option<&IndicatorStats> {
        self.stats.get(asset).and_then(|m| m.get(&indicator))
    }

    pub fn pending_count(&self, asset: &str) -> usize {
        self.signals
            .iter()
            .filter(|s| !s.evaluated && s.asset == asset)
            .count()
    }

    /// Forget every signal and statistic for an asset leaving coverage.
    pub fn remove_asset(&mut self, asset: &str) {
        self.signals.retain(|s| s.asset != asset);
        self.stats.remove(asset);
    }

    fn prune(&mut self, cutoff: NaiveDateTime) {
        let stats = &mut self.stats;
        self.signals.retain(|s| {
            if s.timestamp > cutoff {
                return true;
            }
            if !s.evaluated {
                if let Some(entry) = stats.get_mut(&s.asset).and_then(|m| m.get_mut(&s.indicator)) {
                    entry.total_signals = entry.total_signals.saturating_sub(1);
                }
            }
            false
        });

        for entry in self.stats.values_mut().flat_map(|m| m.values_mut()) {
            entry.prune_returns(cutoff);
        }
    }
}
