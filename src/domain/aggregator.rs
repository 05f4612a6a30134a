//! Weighted-vote insight aggregation.
//!
//! Once per rebalance tick, every asset with enough history is scored:
//! structural rules (trendline, support/resistance) and detected patterns each
//! cast a vote weighted by their tracked performance. A decisive margin turns
//! into a [`Prediction`]; every vote cast is recorded with the tracker so it
//! can be scored on a later tick.

use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::error::EngineError;
use super::features::{FeatureSet, LevelParams};
use super::indicator::{Direction, Indicator};
use super::ohlcv::{DEFAULT_WINDOW_CAPACITY, OhlcvWindow};
use super::pattern::{Pattern, PatternMatches, PatternThresholds, Polarity, detect_window};
use super::tracker::{SignalTracker, TrackerConfig};
use super::universe::Universe;
use crate::ports::model_port::AlphaModel;

/// Bars inspected for trendline and support/resistance bounces.
const BOUNCE_BARS: usize = 5;
/// Pennant direction compares the current close with this many bars back.
const PENNANT_BARS_BACK: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub rebalance_period: Duration,
    /// Minimum window length before an asset is scored.
    pub min_bars: usize,
    pub window_capacity: usize,
    /// Minimum |bullish - bearish| for a prediction.
    pub min_signal_threshold: f64,
    /// Relative distance that counts as "at" a trendline or level.
    pub proximity_threshold: f64,
    /// Vote margin that maps to full volume confidence.
    pub confidence_scale: f64,
    /// Closes used to build the market-return series.
    pub market_return_window: usize,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    pub levels: LevelParams,
    pub patterns: PatternThresholds,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            rebalance_period: Duration::hours(1),
            min_bars: 20,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            min_signal_threshold: 1.0,
            proximity_threshold: 0.02,
            confidence_scale: 5.0,
            market_return_window: 30,
            short_ma_period: 5,
            long_ma_period: 20,
            levels: LevelParams::default(),
            patterns: PatternThresholds::default(),
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let err = |key: &str, reason: &str| Err(EngineError::invalid("aggregator", key, reason));

        if self.rebalance_period <= Duration::zero() {
            return err("rebalance_period_hours", "rebalance period must be positive");
        }
        if self.min_bars < 2 {
            return err("min_bars", "at least 2 bars are required");
        }
        if self.window_capacity < self.min_bars {
            return err("window_capacity", "window capacity must hold min_bars bars");
        }
        if !self.min_signal_threshold.is_finite() || self.min_signal_threshold < 0.0 {
            return err("min_signal_threshold", "must be a non-negative number");
        }
        if !(self.proximity_threshold > 0.0 && self.proximity_threshold < 1.0) {
            return err("proximity_threshold", "must be between 0 and 1 (exclusive)");
        }
        if !self.confidence_scale.is_finite() || self.confidence_scale <= 0.0 {
            return err("confidence_scale", "must be positive");
        }
        if self.market_return_window < 2 {
            return err("market_return_window", "at least 2 closes are required");
        }
        if self.short_ma_period == 0 {
            return err("short_ma_period", "must be at least 1");
        }
        if self.long_ma_period < self.short_ma_period {
            return err("long_ma_period", "must not be shorter than short_ma_period");
        }
        if self.levels.window == 0 {
            return err("sr_window", "must be at least 1");
        }
        if self.levels.lookback < self.levels.window {
            return err("sr_lookback", "must not be shorter than sr_window");
        }
        if !(0.0..1.0).contains(&self.levels.touch_threshold) {
            return err("touch_threshold", "must be between 0 and 1");
        }
        self.patterns.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub asset: String,
    pub direction: Direction,
    /// Relative distance to the nearest opposing structure, in (0, 1].
    pub magnitude: f64,
    pub confidence: f64,
}

/// An indicator that fired on this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub indicator: Indicator,
    pub direction: Direction,
    pub weight: f64,
    pub label: String,
}

/// Full scoring result for one asset on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetEvaluation {
    pub asset: String,
    pub bullish: f64,
    pub bearish: f64,
    pub triggers: Vec<Trigger>,
    pub prediction: Option<Prediction>,
}

/// Running weighted-vote totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteTally {
    pub bullish: f64,
    pub bearish: f64,
    pub triggers: Vec<Trigger>,
}

impl VoteTally {
    pub fn cast(&mut self, indicator: Indicator, direction: Direction, weight: f64, label: String) {
        match direction {
            Direction::Bullish => self.bullish += weight,
            Direction::Bearish => self.bearish += weight,
        }
        self.triggers.push(Trigger {
            indicator,
            direction,
            weight,
            label,
        });
    }

    pub fn difference(&self) -> f64 {
        (self.bullish - self.bearish).abs()
    }

    /// The winning side, if one strictly leads.
    pub fn leader(&self) -> Option<Direction> {
        if self.bullish > self.bearish {
            Some(Direction::Bullish)
        } else if self.bearish > self.bullish {
            Some(Direction::Bearish)
        } else {
            None
        }
    }
}

/// An indicator condition that holds on the current features.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredSignal {
    pub indicator: Indicator,
    pub direction: Direction,
    pub label: String,
}

impl FiredSignal {
    fn new(indicator: Indicator, direction: Direction, label: impl Into<String>) -> Self {
        FiredSignal {
            indicator,
            direction,
            label: label.into(),
        }
    }
}

pub struct InsightAggregator {
    config: AggregatorConfig,
    tracker: SignalTracker,
    next_rebalance: Option<NaiveDateTime>,
}

impl InsightAggregator {
    pub fn new(config: AggregatorConfig, tracker: TrackerConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(InsightAggregator {
            config,
            tracker: SignalTracker::new(tracker)?,
            next_rebalance: None,
        })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &SignalTracker {
        &self.tracker
    }

    pub fn next_rebalance(&self) -> Option<NaiveDateTime> {
        self.next_rebalance
    }

    /// Score one asset: evaluate its pending signals, vote, record the votes.
    ///
    /// Returns `None` when the window is too short or its features are
    /// degenerate; the asset is simply skipped for this tick.
    pub fn evaluate_asset(
        &mut self,
        now: NaiveDateTime,
        window: &OhlcvWindow,
    ) -> Option<AssetEvaluation> {
        let asset = window.asset();
        if window.len() < self.config.min_bars {
            debug!(asset, bars = window.len(), "not enough bars, skipping");
            return None;
        }
        let features = FeatureSet::compute(
            window,
            &self.config.levels,
            self.config.short_ma_period,
            self.config.long_ma_period,
        )?;
        let price = window.last_close().unwrap_or(0.0);
        if !price.is_finite() || price <= 0.0 {
            debug!(asset, price, "non-positive price, skipping");
            return None;
        }

        let market = market_returns(&features.closes, self.config.market_return_window);
        self.tracker.evaluate_signals(now, asset, price, &market);

        let patterns = detect_window(window, &self.config.patterns);
        let mut tally = VoteTally::default();
        for fired in fired_signals(&features, &patterns, self.config.proximity_threshold) {
            let weight = self.tracker.get_indicator_weight(asset, fired.indicator);
            tally.cast(fired.indicator, fired.direction, weight, fired.label);
            self.tracker
                .record_signal(now, asset, fired.indicator, fired.direction, price);
        }

        let prediction = predict(asset, &features, &tally, &self.config);
        debug!(
            asset,
            bullish = tally.bullish,
            bearish = tally.bearish,
            triggers = tally.triggers.len(),
            strongest_level = ?features.levels.strongest_level(),
            predicted = prediction.is_some(),
            "asset scored"
        );

        Some(AssetEvaluation {
            asset: asset.to_string(),
            bullish: tally.bullish,
            bearish: tally.bearish,
            triggers: tally.triggers,
            prediction,
        })
    }
}

impl AlphaModel for InsightAggregator {
    fn update(&mut self, now: NaiveDateTime, universe: &Universe) -> Vec<Prediction> {
        if self.next_rebalance.is_some_and(|next| now <= next) {
            return Vec::new();
        }
        self.next_rebalance = Some(now + self.config.rebalance_period);

        let mut predictions = Vec::new();
        for window in universe.windows() {
            if let Some(prediction) = self.evaluate_asset(now, window).and_then(|e| e.prediction) {
                predictions.push(prediction);
            }
        }
        info!(%now, assets = universe.len(), predictions = predictions.len(), "alpha update");
        predictions
    }

    fn remove_asset(&mut self, asset: &str) {
        self.tracker.remove_asset(asset);
    }
}

/// Bar-to-bar percentage changes over the last `window` closes, oldest first.
///
/// Pairs with a zero base price are skipped.
pub fn market_returns(closes: &[f64], window: usize) -> Vec<f64> {
    let recent = &closes[closes.len().saturating_sub(window)..];
    recent
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .filter(|r| r.is_finite())
        .collect()
}

/// Every structural and pattern indicator whose condition holds.
///
/// Each indicator appears at most once.
pub fn fired_signals(
    features: &FeatureSet,
    patterns: &PatternMatches,
    proximity: f64,
) -> Vec<FiredSignal> {
    let mut fired = Vec::new();
    trendline_signals(&mut fired, features, proximity);
    level_signals(&mut fired, features, proximity);
    pattern_signals(&mut fired, features, patterns);
    fired
}

fn trendline_signals(out: &mut Vec<FiredSignal>, f: &FeatureSet, proximity: f64) {
    let (Some(upper), Some(lower)) = (f.trendlines.upper_at(0), f.trendlines.lower_at(0)) else {
        return;
    };
    let price = f.current_price();

    if price > upper {
        out.push(FiredSignal::new(
            Indicator::Trendline,
            Direction::Bullish,
            "Breakout above upper trendline",
        ));
    } else if price < lower {
        out.push(FiredSignal::new(
            Indicator::Trendline,
            Direction::Bearish,
            "Breakdown below lower trendline",
        ));
    }

    let (Some(prev), Some(prev_upper), Some(prev_lower)) = (
        f.close_at(1),
        f.trendlines.upper_at(1),
        f.trendlines.lower_at(1),
    ) else {
        return;
    };
    let recent = f.recent_closes(BOUNCE_BARS);

    if (price - lower).abs() / price < proximity && prev < prev_lower {
        out.push(FiredSignal::new(
            Indicator::TrendlinePullback,
            Direction::Bullish,
            "Pullback to lower trendline",
        ));
        if min(recent) < lower && price > lower {
            out.push(FiredSignal::new(
                Indicator::TrendlineBounce,
                Direction::Bullish,
                "Bounce off lower trendline",
            ));
        }
    } else if (price - upper).abs() / price < proximity && prev > prev_upper {
        out.push(FiredSignal::new(
            Indicator::TrendlinePullback,
            Direction::Bearish,
            "Pullback to upper trendline",
        ));
        if max(recent) > upper && price < upper {
            out.push(FiredSignal::new(
                Indicator::TrendlineBounce,
                Direction::Bearish,
                "Rejection at upper trendline",
            ));
        }
    }
}

fn level_signals(out: &mut Vec<FiredSignal>, f: &FeatureSet, proximity: f64) {
    let price = f.current_price();
    let support = f.levels.support;
    let resistance = f.levels.resistance;

    if support < price && price < resistance {
        if resistance - price < price - support {
            out.push(FiredSignal::new(
                Indicator::SupportResistance,
                Direction::Bearish,
                "Near resistance",
            ));
        } else {
            out.push(FiredSignal::new(
                Indicator::SupportResistance,
                Direction::Bullish,
                "Near support",
            ));
        }
    }

    let recent = f.recent_closes(BOUNCE_BARS);
    if f.long_ma > f.short_ma && price > f.long_ma && (price - support).abs() / price < proximity {
        out.push(FiredSignal::new(
            Indicator::SrPullback,
            Direction::Bullish,
            "Pullback to support in uptrend",
        ));
        if min(recent) <= support && price > support {
            out.push(FiredSignal::new(
                Indicator::SrBounce,
                Direction::Bullish,
                "Bounce off support",
            ));
        }
    } else if f.long_ma < f.short_ma
        && price < f.long_ma
        && (price - resistance).abs() / price < proximity
    {
        out.push(FiredSignal::new(
            Indicator::SrPullback,
            Direction::Bearish,
            "Pullback to resistance in downtrend",
        ));
        if max(recent) >= resistance && price < resistance {
            out.push(FiredSignal::new(
                Indicator::SrBounce,
                Direction::Bearish,
                "Rejection at resistance",
            ));
        }
    }
}

fn pattern_signals(out: &mut Vec<FiredSignal>, f: &FeatureSet, patterns: &PatternMatches) {
    let price = f.current_price();
    let voting: BTreeSet<Pattern> = patterns.iter().filter_map(Pattern::voting_pattern).collect();

    for pattern in voting {
        let direction = match pattern.polarity() {
            Polarity::Bullish => Some(Direction::Bullish),
            Polarity::Bearish => Some(Direction::Bearish),
            Polarity::Neutral => None,
            Polarity::Contextual => contextual_direction(pattern, price, f),
        };
        if let Some(direction) = direction {
            out.push(FiredSignal::new(
                Indicator::Pattern(pattern),
                direction,
                format!("Pattern {pattern} ({direction})"),
            ));
        }
    }
}

fn contextual_direction(pattern: Pattern, price: f64, f: &FeatureSet) -> Option<Direction> {
    let reference = match pattern {
        Pattern::Megaphone => f.close_at(1)?,
        Pattern::Pennant => f.close_at(PENNANT_BARS_BACK)?,
        _ => return None,
    };
    if price > reference {
        Some(Direction::Bullish)
    } else {
        Some(Direction::Bearish)
    }
}

/// Turn a vote tally into a prediction if the margin is decisive.
pub fn predict(
    asset: &str,
    features: &FeatureSet,
    tally: &VoteTally,
    config: &AggregatorConfig,
) -> Option<Prediction> {
    let difference = tally.difference();
    if difference < config.min_signal_threshold {
        return None;
    }
    let direction = tally.leader()?;

    let price = features.current_price();
    let targets = match direction {
        Direction::Bullish => [features.levels.resistance, features.trendlines.upper_at(0)?],
        Direction::Bearish => [features.levels.support, features.trendlines.lower_at(0)?],
    };
    let magnitude = targets
        .iter()
        .map(|level| (level - price).abs() / price)
        .fold(f64::INFINITY, f64::min);
    if !magnitude.is_finite() || magnitude <= 0.0 {
        debug!(asset, %direction, "price sits on target structure, no prediction");
        return None;
    }

    let confidence =
        (features.volume_confidence * difference / config.confidence_scale).clamp(0.0, 1.0);

    Some(Prediction {
        asset: asset.to_string(),
        direction,
        magnitude: magnitude.min(1.0),
        confidence,
    })
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::{FibonacciLevels, SupportResistance, Trendlines};
    use crate::domain::ohlcv::OhlcvBar;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn ts(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hour)
    }

    fn features(
        closes: Vec<f64>,
        upper: [f64; 2],
        lower: [f64; 2],
        support: f64,
        resistance: f64,
    ) -> FeatureSet {
        FeatureSet {
            closes,
            trendlines: Trendlines {
                upper: upper.to_vec(),
                lower: lower.to_vec(),
                upper_slope: upper[1] - upper[0],
                lower_slope: lower[1] - lower[0],
            },
            levels: SupportResistance {
                support,
                resistance,
                historical_levels: BTreeMap::new(),
            },
            fibonacci: FibonacciLevels {
                levels: BTreeMap::new(),
            },
            volume_confidence: 1.0,
            short_ma: 100.0,
            long_ma: 100.0,
        }
    }

    fn indicators(fired: &[FiredSignal]) -> Vec<(Indicator, Direction)> {
        fired.iter().map(|s| (s.indicator, s.direction)).collect()
    }

    fn no_patterns() -> PatternMatches {
        PatternMatches::default()
    }

    #[test]
    fn breakout_above_upper_trendline() {
        let f = features(vec![100.0, 112.0], [108.0, 110.0], [90.0, 92.0], 95.0, 112.0);
        let fired = fired_signals(&f, &no_patterns(), 0.02);
        assert_eq!(indicators(&fired), vec![(Indicator::Trendline, Direction::Bullish)]);
    }

    #[test]
    fn breakdown_below_lower_trendline() {
        let f = features(vec![100.0, 88.0], [108.0, 110.0], [90.0, 92.0], 88.0, 105.0);
        let fired = fired_signals(&f, &no_patterns(), 0.02);
        assert_eq!(indicators(&fired), vec![(Indicator::Trendline, Direction::Bearish)]);
    }

    #[test]
    fn pullback_and_bounce_on_lower_trendline() {
        // Previous close under the line, current close just above it.
        let f = features(
            vec![95.0, 96.0, 97.0, 89.0, 92.5],
            [110.0, 110.0],
            [91.0, 92.0],
            80.0,
            120.0,
        );
        let fired = fired_signals(&f, &no_patterns(), 0.02);
        let got = indicators(&fired);
        assert!(got.contains(&(Indicator::TrendlinePullback, Direction::Bullish)));
        assert!(got.contains(&(Indicator::TrendlineBounce, Direction::Bullish)));
    }

    #[test]
    fn pullback_and_rejection_at_upper_trendline() {
        let f = features(vec![100.0, 111.0, 109.5], [110.0, 110.0], [90.0, 90.0], 95.0, 130.0);
        let fired = fired_signals(&f, &no_patterns(), 0.02);
        let got = indicators(&fired);
        assert!(got.contains(&(Indicator::TrendlinePullback, Direction::Bearish)));
        // 111 > 110 and 109.5 < 110
        assert!(got.contains(&(Indicator::TrendlineBounce, Direction::Bearish)));
        assert!(!got.iter().any(|(i, _)| *i == Indicator::Trendline));
    }

    #[test]
    fn proximity_to_levels_picks_nearer_side() {
        let near_resistance =
            features(vec![100.0, 108.0], [120.0, 120.0], [80.0, 80.0], 95.0, 110.0);
        let fired = fired_signals(&near_resistance, &no_patterns(), 0.02);
        assert!(indicators(&fired).contains(&(Indicator::SupportResistance, Direction::Bearish)));

        let near_support = features(vec![100.0, 97.0], [120.0, 120.0], [80.0, 80.0], 95.0, 110.0);
        let fired = fired_signals(&near_support, &no_patterns(), 0.02);
        assert!(indicators(&fired).contains(&(Indicator::SupportResistance, Direction::Bullish)));
    }

    #[test]
    fn price_on_level_is_not_between_levels() {
        let f = features(vec![100.0, 110.0], [120.0, 120.0], [80.0, 80.0], 95.0, 110.0);
        let fired = fired_signals(&f, &no_patterns(), 0.02);
        assert!(!indicators(&fired).iter().any(|(i, _)| *i == Indicator::SupportResistance));
    }

    #[test]
    fn sr_pullback_and_bounce_in_uptrend() {
        let mut f = features(
            vec![104.0, 103.0, 100.0, 101.0, 101.5],
            [120.0, 120.0],
            [80.0, 80.0],
            100.0,
            115.0,
        );
        f.long_ma = 101.0;
        f.short_ma = 100.5;
        let fired = fired_signals(&f, &no_patterns(), 0.02);
        let got = indicators(&fired);
        assert!(got.contains(&(Indicator::SrPullback, Direction::Bullish)));
        assert!(got.contains(&(Indicator::SrBounce, Direction::Bullish)));
    }

    #[test]
    fn sr_pullback_in_downtrend() {
        let mut f = features(
            vec![100.0, 101.0, 102.0, 103.0, 104.0],
            [120.0, 120.0],
            [80.0, 80.0],
            90.0,
            105.0,
        );
        f.long_ma = 104.5;
        f.short_ma = 105.0;
        let fired = fired_signals(&f, &no_patterns(), 0.02);
        let got = indicators(&fired);
        assert!(got.contains(&(Indicator::SrPullback, Direction::Bearish)));
        assert!(!got.contains(&(Indicator::SrBounce, Direction::Bearish)));
    }

    #[test]
    fn patterns_vote_by_polarity() {
        let f = features(vec![100.0, 100.0], [120.0, 120.0], [80.0, 80.0], 100.0, 100.0);
        let matches: PatternMatches = [
            Pattern::BullishEngulfing,
            Pattern::Doji,
            Pattern::RisingWedge,
            Pattern::BullishHarami,
            Pattern::BullishHaramiCross,
        ]
        .into_iter()
        .collect();
        let fired = fired_signals(&f, &matches, 0.02);
        let got = indicators(&fired);

        assert!(got.contains(&(Indicator::Pattern(Pattern::BullishEngulfing), Direction::Bullish)));
        assert!(got.contains(&(Indicator::Pattern(Pattern::RisingWedge), Direction::Bearish)));
        assert!(!got.iter().any(|(i, _)| *i == Indicator::Pattern(Pattern::Doji)));
        // The cross votes under the harami indicator, once.
        let harami = got
            .iter()
            .filter(|(i, _)| *i == Indicator::Pattern(Pattern::BullishHarami))
            .count();
        assert_eq!(harami, 1);
    }

    #[test]
    fn contextual_patterns_follow_displacement() {
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        closes.push(105.0);
        let f = features(closes, [120.0, 120.0], [80.0, 80.0], 50.0, 50.0);
        let matches: PatternMatches = [Pattern::Megaphone, Pattern::Pennant].into_iter().collect();
        let got = indicators(&fired_signals(&f, &matches, 0.02));

        // 105 < 109 (previous close) but 105 > 101 (nine bars back).
        assert!(got.contains(&(Indicator::Pattern(Pattern::Megaphone), Direction::Bearish)));
        assert!(got.contains(&(Indicator::Pattern(Pattern::Pennant), Direction::Bullish)));
    }

    #[test]
    fn pennant_needs_ten_closes() {
        let f = features(vec![100.0, 101.0, 102.0], [120.0, 120.0], [80.0, 80.0], 50.0, 50.0);
        let matches: PatternMatches = [Pattern::Pennant].into_iter().collect();
        assert!(fired_signals(&f, &matches, 0.02).is_empty());
    }

    #[test]
    fn prediction_requires_margin() {
        let f = features(vec![100.0, 100.0], [110.0, 110.0], [90.0, 90.0], 95.0, 105.0);
        let config = AggregatorConfig::default();

        let mut tally = VoteTally::default();
        tally.cast(Indicator::Trendline, Direction::Bullish, 0.5, "a".into());
        tally.cast(Indicator::SrBounce, Direction::Bullish, 0.4, "b".into());
        assert!(predict("BTCUSDC", &f, &tally, &config).is_none());

        tally.cast(Indicator::SrPullback, Direction::Bullish, 0.2, "c".into());
        let p = predict("BTCUSDC", &f, &tally, &config).unwrap();
        assert_eq!(p.direction, Direction::Bullish);
        // min(|105-100|, |110-100|) / 100
        assert_abs_diff_eq!(p.magnitude, 0.05, epsilon = 1e-12);
        // 1.0 * 1.1 / 5
        assert_abs_diff_eq!(p.confidence, 0.22, epsilon = 1e-12);
    }

    #[test]
    fn bearish_prediction_targets_support() {
        let mut f = features(vec![100.0, 100.0], [110.0, 110.0], [97.0, 97.0], 92.0, 105.0);
        f.volume_confidence = 0.5;
        let mut tally = VoteTally::default();
        for indicator in [Indicator::Trendline, Indicator::SrBounce, Indicator::SrPullback] {
            tally.cast(indicator, Direction::Bearish, 1.0, String::new());
        }
        let p = predict("ETHUSDC", &f, &tally, &AggregatorConfig::default()).unwrap();
        assert_eq!(p.direction, Direction::Bearish);
        assert_abs_diff_eq!(p.magnitude, 0.03, epsilon = 1e-12);
        assert_abs_diff_eq!(p.confidence, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn confidence_is_capped() {
        let f = features(vec![100.0, 100.0], [110.0, 110.0], [90.0, 90.0], 95.0, 105.0);
        let mut tally = VoteTally::default();
        tally.bullish = 9.0;
        let p = predict("X", &f, &tally, &AggregatorConfig::default()).unwrap();
        assert_abs_diff_eq!(p.confidence, 1.0);
    }

    #[test]
    fn no_prediction_on_target_level() {
        let f = features(vec![100.0, 105.0], [110.0, 110.0], [90.0, 90.0], 95.0, 105.0);
        let mut tally = VoteTally::default();
        tally.bullish = 3.0;
        assert!(predict("X", &f, &tally, &AggregatorConfig::default()).is_none());
    }

    #[test]
    fn market_returns_oldest_first() {
        let closes = [50.0, 100.0, 110.0, 99.0];
        let r = market_returns(&closes, 3);
        assert_eq!(r.len(), 2);
        assert_abs_diff_eq!(r[0], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(r[1], -0.1, epsilon = 1e-12);
        assert!(market_returns(&[100.0], 30).is_empty());
        assert_eq!(market_returns(&[0.0, 1.0, 2.0], 30), vec![1.0]);
    }

    fn rising_window(asset: &str, bars: usize) -> OhlcvWindow {
        let bars = (0..bars).map(|i| {
            let close = 100.0 + i as f64;
            OhlcvBar {
                timestamp: ts(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.5,
                close,
                volume: 1_000.0,
            }
        });
        OhlcvWindow::from_bars(asset, 200, bars).unwrap()
    }

    #[test]
    fn short_window_is_skipped() {
        let mut agg =
            InsightAggregator::new(AggregatorConfig::default(), TrackerConfig::default()).unwrap();
        let window = rising_window("BTCUSDC", 19);
        assert!(agg.evaluate_asset(ts(19), &window).is_none());
        assert!(agg.tracker().signals().is_empty());
    }

    #[test]
    fn evaluation_records_every_trigger() {
        let mut agg =
            InsightAggregator::new(AggregatorConfig::default(), TrackerConfig::default()).unwrap();
        let window = rising_window("BTCUSDC", 40);
        let eval = agg.evaluate_asset(ts(40), &window).unwrap();

        assert_eq!(agg.tracker().pending_count("BTCUSDC"), eval.triggers.len());
        let total: f64 = eval.triggers.iter().map(|t| t.weight).sum();
        assert_abs_diff_eq!(total, eval.bullish + eval.bearish, epsilon = 1e-12);
        // Fresh indicators vote with the default weight.
        assert!(eval.triggers.iter().all(|t| t.weight == 0.5));
    }

    #[test]
    fn update_is_gated_by_rebalance_period() {
        let mut agg =
            InsightAggregator::new(AggregatorConfig::default(), TrackerConfig::default()).unwrap();
        let mut universe = Universe::new(200);
        for bar in rising_window("BTCUSDC", 40).bars() {
            universe.push_bar("BTCUSDC", bar.clone()).unwrap();
        }

        agg.update(ts(40), &universe);
        let recorded = agg.tracker().signals().len();
        assert_eq!(agg.next_rebalance(), Some(ts(41)));

        assert!(agg.update(ts(41), &universe).is_empty());
        assert_eq!(agg.tracker().signals().len(), recorded);

        agg.update(ts(42), &universe);
        assert_eq!(agg.next_rebalance(), Some(ts(43)));
    }

    #[test]
    fn remove_asset_clears_tracker_state() {
        let mut agg =
            InsightAggregator::new(AggregatorConfig::default(), TrackerConfig::default()).unwrap();
        let window = rising_window("BTCUSDC", 40);
        agg.evaluate_asset(ts(40), &window);
        agg.remove_asset("BTCUSDC");
        assert!(agg.tracker().signals().is_empty());
    }

    #[test]
    fn config_validation() {
        assert!(AggregatorConfig::default().validate().is_ok());

        let bad = AggregatorConfig {
            long_ma_period: 3,
            ..AggregatorConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(EngineError::ConfigInvalid { key, .. }) if key == "long_ma_period"
        ));

        let bad = AggregatorConfig {
            window_capacity: 10,
            ..AggregatorConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = AggregatorConfig {
            proximity_threshold: 0.0,
            ..AggregatorConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
