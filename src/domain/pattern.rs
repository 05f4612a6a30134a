//! Candlestick and chart pattern detection.
//!
//! Candlestick rules look at the last one or two bars; chart rules look at the
//! last 10-20 bars and are only evaluated when `chart_min_bars` bars exist.
//! Every rule is a fixed comparison against a named threshold in
//! [`PatternThresholds`].

use std::collections::BTreeSet;
use std::fmt;

use super::error::EngineError;
use super::ohlcv::{OhlcvBar, OhlcvWindow};

/// Consecutive bar-to-bar steps checked by the bull flag rule.
const FLAG_STEPS: usize = 5;
/// Consecutive bar-to-bar steps checked by triangle, wedge, megaphone and pennant rules.
const CHART_STEPS: usize = 9;
/// Bars spanned by the shoulder/head/shoulder segments and the cup.
const CHART_SPAN: usize = 20;

/// Directional bias a pattern contributes to the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Bullish,
    Bearish,
    /// Indecision; never votes.
    Neutral,
    /// Side picked from short-term price displacement at vote time.
    Contextual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pattern {
    Doji,
    DragonflyDoji,
    GravestoneDoji,
    Hammer,
    InvertedHammer,
    ShootingStar,
    SpinningTop,
    BullishMarubozu,
    BearishMarubozu,
    BullishEngulfing,
    BearishEngulfing,
    BullishHarami,
    BullishHaramiCross,
    BearishHarami,
    BearishHaramiCross,
    PiercingLine,
    HeadAndShoulders,
    BullFlag,
    AscendingTriangle,
    DescendingTriangle,
    RisingWedge,
    FallingWedge,
    CupAndHandle,
    Megaphone,
    Pennant,
}

impl Pattern {
    pub const ALL: [Pattern; 25] = [
        Pattern::Doji,
        Pattern::DragonflyDoji,
        Pattern::GravestoneDoji,
        Pattern::Hammer,
        Pattern::InvertedHammer,
        Pattern::ShootingStar,
        Pattern::SpinningTop,
        Pattern::BullishMarubozu,
        Pattern::BearishMarubozu,
        Pattern::BullishEngulfing,
        Pattern::BearishEngulfing,
        Pattern::BullishHarami,
        Pattern::BullishHaramiCross,
        Pattern::BearishHarami,
        Pattern::BearishHaramiCross,
        Pattern::PiercingLine,
        Pattern::HeadAndShoulders,
        Pattern::BullFlag,
        Pattern::AscendingTriangle,
        Pattern::DescendingTriangle,
        Pattern::RisingWedge,
        Pattern::FallingWedge,
        Pattern::CupAndHandle,
        Pattern::Megaphone,
        Pattern::Pennant,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pattern::Doji => "doji",
            Pattern::DragonflyDoji => "dragonfly_doji",
            Pattern::GravestoneDoji => "gravestone_doji",
            Pattern::Hammer => "hammer",
            Pattern::InvertedHammer => "inverted_hammer",
            Pattern::ShootingStar => "shooting_star",
            Pattern::SpinningTop => "spinning_top",
            Pattern::BullishMarubozu => "bullish_marubozu",
            Pattern::BearishMarubozu => "bearish_marubozu",
            Pattern::BullishEngulfing => "bullish_engulfing",
            Pattern::BearishEngulfing => "bearish_engulfing",
            Pattern::BullishHarami => "bullish_harami",
            Pattern::BullishHaramiCross => "bullish_harami_cross",
            Pattern::BearishHarami => "bearish_harami",
            Pattern::BearishHaramiCross => "bearish_harami_cross",
            Pattern::PiercingLine => "piercing_line",
            Pattern::HeadAndShoulders => "head_and_shoulders",
            Pattern::BullFlag => "bull_flag",
            Pattern::AscendingTriangle => "ascending_triangle",
            Pattern::DescendingTriangle => "descending_triangle",
            Pattern::RisingWedge => "rising_wedge",
            Pattern::FallingWedge => "falling_wedge",
            Pattern::CupAndHandle => "cup_and_handle",
            Pattern::Megaphone => "megaphone",
            Pattern::Pennant => "pennant",
        }
    }

    pub fn polarity(self) -> Polarity {
        match self {
            Pattern::Doji | Pattern::SpinningTop => Polarity::Neutral,
            Pattern::DragonflyDoji
            | Pattern::Hammer
            | Pattern::InvertedHammer
            | Pattern::BullishMarubozu
            | Pattern::BullishEngulfing
            | Pattern::BullishHarami
            | Pattern::BullishHaramiCross
            | Pattern::PiercingLine
            | Pattern::BullFlag
            | Pattern::AscendingTriangle
            | Pattern::FallingWedge
            | Pattern::CupAndHandle => Polarity::Bullish,
            Pattern::GravestoneDoji
            | Pattern::ShootingStar
            | Pattern::BearishMarubozu
            | Pattern::BearishEngulfing
            | Pattern::BearishHarami
            | Pattern::BearishHaramiCross
            | Pattern::HeadAndShoulders
            | Pattern::DescendingTriangle
            | Pattern::RisingWedge => Polarity::Bearish,
            Pattern::Megaphone | Pattern::Pennant => Polarity::Contextual,
        }
    }

    pub fn is_chart_pattern(self) -> bool {
        matches!(
            self,
            Pattern::HeadAndShoulders
                | Pattern::BullFlag
                | Pattern::AscendingTriangle
                | Pattern::DescendingTriangle
                | Pattern::RisingWedge
                | Pattern::FallingWedge
                | Pattern::CupAndHandle
                | Pattern::Megaphone
                | Pattern::Pennant
        )
    }

    /// The pattern whose indicator this match votes under, if it votes at all.
    ///
    /// Harami crosses share their parent harami's track record.
    pub fn voting_pattern(self) -> Option<Pattern> {
        match self {
            Pattern::BullishHaramiCross => Some(Pattern::BullishHarami),
            Pattern::BearishHaramiCross => Some(Pattern::BearishHarami),
            p if p.polarity() == Polarity::Neutral => None,
            p => Some(p),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternThresholds {
    /// Doji (and harami cross): body <= ratio * range.
    pub doji_body_ratio: f64,
    /// A shadow counts as absent when <= ratio * range.
    pub small_shadow_ratio: f64,
    /// A shadow counts as dominant when >= ratio * range.
    pub long_shadow_ratio: f64,
    /// Hammer family: shadow >= multiple * body.
    pub hammer_shadow_multiple: f64,
    pub spinning_top_min: f64,
    pub spinning_top_max: f64,
    /// Marubozu: both shadows <= ratio * body.
    pub marubozu_shadow_ratio: f64,
    /// Engulfing comparisons accept this fraction of the previous body as slack.
    pub engulfing_tolerance: f64,
    /// Head and shoulders: |left - right| / left below this.
    pub shoulder_tolerance: f64,
    /// Triangles: flat side within this fraction of the level.
    pub triangle_tolerance: f64,
    pub chart_min_bars: usize,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        PatternThresholds {
            doji_body_ratio: 0.1,
            small_shadow_ratio: 0.1,
            long_shadow_ratio: 0.7,
            hammer_shadow_multiple: 2.0,
            spinning_top_min: 0.3,
            spinning_top_max: 0.7,
            marubozu_shadow_ratio: 0.1,
            engulfing_tolerance: 0.2,
            shoulder_tolerance: 0.02,
            triangle_tolerance: 0.02,
            chart_min_bars: CHART_SPAN,
        }
    }
}

impl PatternThresholds {
    pub fn validate(&self) -> Result<(), EngineError> {
        let ratios = [
            ("doji_body_ratio", self.doji_body_ratio),
            ("small_shadow_ratio", self.small_shadow_ratio),
            ("long_shadow_ratio", self.long_shadow_ratio),
            ("spinning_top_min", self.spinning_top_min),
            ("spinning_top_max", self.spinning_top_max),
        ];
        for (key, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::invalid(
                    "patterns",
                    key,
                    "must be between 0 and 1",
                ));
            }
        }
        let non_negative = [
            ("hammer_shadow_multiple", self.hammer_shadow_multiple),
            ("marubozu_shadow_ratio", self.marubozu_shadow_ratio),
            ("engulfing_tolerance", self.engulfing_tolerance),
            ("shoulder_tolerance", self.shoulder_tolerance),
            ("triangle_tolerance", self.triangle_tolerance),
        ];
        for (key, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid(
                    "patterns",
                    key,
                    "must be a non-negative number",
                ));
            }
        }
        if self.spinning_top_min > self.spinning_top_max {
            return Err(EngineError::invalid(
                "patterns",
                "spinning_top_min",
                "must not exceed spinning_top_max",
            ));
        }
        if self.chart_min_bars < CHART_SPAN {
            return Err(EngineError::invalid(
                "patterns",
                "chart_min_bars",
                format!("must be at least {CHART_SPAN}"),
            ));
        }
        Ok(())
    }
}

/// Patterns matched on the newest bar(s) of a window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternMatches {
    matched: BTreeSet<Pattern>,
}

impl PatternMatches {
    pub fn contains(&self, pattern: Pattern) -> bool {
        self.matched.contains(&pattern)
    }

    pub fn iter(&self) -> impl Iterator<Item = Pattern> + '_ {
        self.matched.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.matched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    fn set(&mut self, pattern: Pattern, matched: bool) {
        if matched {
            self.matched.insert(pattern);
        }
    }
}

impl FromIterator<Pattern> for PatternMatches {
    fn from_iter<I: IntoIterator<Item = Pattern>>(iter: I) -> Self {
        PatternMatches {
            matched: iter.into_iter().collect(),
        }
    }
}

pub fn detect_window(window: &OhlcvWindow, thresholds: &PatternThresholds) -> PatternMatches {
    let bars: Vec<OhlcvBar> = window.bars().cloned().collect();
    detect_patterns(&bars, thresholds)
}

/// Detect every pattern on oldest-first bars.
pub fn detect_patterns(bars: &[OhlcvBar], t: &PatternThresholds) -> PatternMatches {
    let n = bars.len();
    let mut matches = PatternMatches::default();
    let Some(cur) = bars.last() else {
        return matches;
    };

    single_candle(&mut matches, cur, t);
    if n >= 2 {
        two_candle(&mut matches, &bars[n - 2], cur, t);
    }

    if n >= t.chart_min_bars.max(CHART_SPAN) {
        let span = &bars[n - CHART_SPAN..];
        let highs: Vec<f64> = span.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = span.iter().map(|b| b.low).collect();
        chart(&mut matches, &highs, &lows, t);
    }

    matches
}

fn single_candle(m: &mut PatternMatches, c: &OhlcvBar, t: &PatternThresholds) {
    let range = c.range();
    // A zero-range bar has no shape to classify.
    if range <= 0.0 {
        return;
    }
    let (body, wick, tail) = (c.body(), c.upper_shadow(), c.lower_shadow());
    let small = t.small_shadow_ratio * range;
    let long = t.long_shadow_ratio * range;

    let doji = body <= t.doji_body_ratio * range;
    m.set(Pattern::Doji, doji);
    m.set(Pattern::DragonflyDoji, doji && wick <= small && tail >= long);
    m.set(Pattern::GravestoneDoji, doji && wick >= long && tail <= small);

    m.set(
        Pattern::Hammer,
        tail >= t.hammer_shadow_multiple * body && wick <= small,
    );
    m.set(
        Pattern::InvertedHammer,
        wick >= t.hammer_shadow_multiple * body && tail <= small,
    );
    m.set(
        Pattern::ShootingStar,
        wick >= t.hammer_shadow_multiple * body && tail <= body && c.is_bullish(),
    );

    let body_ratio = body / range;
    m.set(
        Pattern::SpinningTop,
        (t.spinning_top_min..=t.spinning_top_max).contains(&body_ratio),
    );

    let shadow_limit = t.marubozu_shadow_ratio * body;
    if body > 0.0 && wick <= shadow_limit && tail <= shadow_limit {
        m.set(Pattern::BullishMarubozu, c.is_bullish());
        m.set(Pattern::BearishMarubozu, c.is_bearish());
    }
}

fn two_candle(m: &mut PatternMatches, prev: &OhlcvBar, cur: &OhlcvBar, t: &PatternThresholds) {
    let slack = t.engulfing_tolerance * prev.body();
    let cross = cur.range() > 0.0 && cur.body() <= t.doji_body_ratio * cur.range();

    let bullish_engulfing = cur.is_bullish()
        && prev.is_bearish()
        && cur.open <= prev.close + slack
        && cur.close >= prev.open - slack;
    m.set(Pattern::BullishEngulfing, bullish_engulfing);

    let bearish_engulfing = cur.is_bearish()
        && prev.is_bullish()
        && cur.open >= prev.close - slack
        && cur.close <= prev.open + slack;
    m.set(Pattern::BearishEngulfing, bearish_engulfing);

    // Harami: current body contained in the previous, opposite-coloured body.
    // A body that also spans the previous one within slack is engulfing only.
    let inside = cur.open.max(cur.close) <= prev.open.max(prev.close)
        && cur.open.min(cur.close) >= prev.open.min(prev.close);

    let bullish_harami = prev.is_bearish() && !cur.is_bearish() && inside && !bullish_engulfing;
    m.set(Pattern::BullishHarami, bullish_harami);
    m.set(Pattern::BullishHaramiCross, bullish_harami && cross);

    let bearish_harami = prev.is_bullish() && !cur.is_bullish() && inside && !bearish_engulfing;
    m.set(Pattern::BearishHarami, bearish_harami);
    m.set(Pattern::BearishHaramiCross, bearish_harami && cross);

    m.set(
        Pattern::PiercingLine,
        prev.is_bearish()
            && cur.is_bullish()
            && cur.open < prev.low
            && cur.close > (prev.open + prev.close) / 2.0,
    );
}

/// `highs` and `lows` are the last `CHART_SPAN` bars, oldest-first.
fn chart(m: &mut PatternMatches, highs: &[f64], lows: &[f64], t: &PatternThresholds) {
    let n = highs.len();

    let left_shoulder = max(&highs[0..5]);
    let head = max(&highs[5..10]);
    let right_shoulder = max(&highs[10..15]);
    m.set(
        Pattern::HeadAndShoulders,
        left_shoulder > 0.0
            && head > left_shoulder
            && head > right_shoulder
            && (left_shoulder - right_shoulder).abs() / left_shoulder < t.shoulder_tolerance,
    );

    m.set(
        Pattern::BullFlag,
        falling(highs, FLAG_STEPS) && falling(lows, FLAG_STEPS),
    );

    let resistance = max(highs);
    m.set(
        Pattern::AscendingTriangle,
        rising(lows, CHART_STEPS)
            && highs[n - CHART_STEPS..]
                .iter()
                .all(|h| (h - resistance).abs() < t.triangle_tolerance * resistance),
    );

    let support = min(lows);
    m.set(
        Pattern::DescendingTriangle,
        falling(highs, CHART_STEPS)
            && lows[n - CHART_STEPS..]
                .iter()
                .all(|l| (l - support).abs() < t.triangle_tolerance * support),
    );

    m.set(
        Pattern::RisingWedge,
        rising(highs, CHART_STEPS) && rising(lows, CHART_STEPS),
    );
    m.set(
        Pattern::FallingWedge,
        falling(highs, CHART_STEPS) && falling(lows, CHART_STEPS),
    );

    // Cup bottom in the older half; handle lows (excluding the newest bar) stay above it.
    let cup_bottom = min(&lows[0..10]);
    m.set(
        Pattern::CupAndHandle,
        lows[n - 9..n - 1].iter().all(|&l| l > cup_bottom),
    );

    m.set(
        Pattern::Megaphone,
        rising(highs, CHART_STEPS) && falling(lows, CHART_STEPS),
    );
    m.set(
        Pattern::Pennant,
        falling(highs, CHART_STEPS) && rising(lows, CHART_STEPS),
    );
}

/// Each of the last `steps` values is strictly above its predecessor.
fn rising(values: &[f64], steps: usize) -> bool {
    let n = values.len();
    n > steps && (n - steps..n).all(|i| values[i] > values[i - 1])
}

/// Each of the last `steps` values is strictly below its predecessor.
fn falling(values: &[f64], steps: usize) -> bool {
    let n = values.len();
    n > steps && (n - steps..n).all(|i| values[i] < values[i - 1])
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
