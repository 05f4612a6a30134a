//! Structural features extracted from an OHLCV window.
//!
//! All functions here are pure: trendlines by least-squares fit, recent and
//! historical support/resistance, Fibonacci retracement levels, and a volume
//! confidence score in [0, 1].

use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

use super::ohlcv::OhlcvWindow;

pub const FIB_RATIOS: [f64; 6] = [0.0, 0.236, 0.382, 0.5, 0.618, 1.0];
pub const RECENT_VOLUME_BARS: usize = 5;

/// Fitted upper (highs) and lower (lows) lines, evaluated at every bar index.
#[derive(Debug, Clone, PartialEq)]
pub struct Trendlines {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper_slope: f64,
    pub lower_slope: f64,
}

impl Trendlines {
    /// Value of the upper line `back` bars before the newest (0 = newest).
    pub fn upper_at(&self, back: usize) -> Option<f64> {
        tail_at(&self.upper, back)
    }

    pub fn lower_at(&self, back: usize) -> Option<f64> {
        tail_at(&self.lower, back)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelParams {
    /// Bars used for the recent support/resistance min/max.
    pub window: usize,
    /// Bars scanned for historical local extrema.
    pub lookback: usize,
    /// Relative distance within which a price counts as touching a level.
    pub touch_threshold: f64,
}

impl Default for LevelParams {
    fn default() -> Self {
        LevelParams {
            window: 20,
            lookback: 252,
            touch_threshold: 0.005,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupportResistance {
    pub support: f64,
    pub resistance: f64,
    /// Local-extremum price level -> number of bars touching it.
    pub historical_levels: BTreeMap<OrderedFloat<f64>, usize>,
}

impl SupportResistance {
    /// Historical level with the most touches; ties go to the lower price.
    pub fn strongest_level(&self) -> Option<(f64, usize)> {
        self.historical_levels
            .iter()
            .fold(None, |best: Option<(f64, usize)>, (level, &touches)| match best {
                Some((_, t)) if t >= touches => best,
                _ => Some((level.into_inner(), touches)),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FibonacciLevels {
    pub levels: BTreeMap<OrderedFloat<f64>, f64>,
}

impl FibonacciLevels {
    pub fn level(&self, ratio: f64) -> Option<f64> {
        self.levels.get(&OrderedFloat(ratio)).copied()
    }
}

/// Ordinary least-squares fit of `values` against bar index: (slope, intercept).
pub fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    if n == 1 {
        return (0.0, values[0]);
    }

    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }

    let slope = sxy / sxx;
    (slope, mean_y - slope * mean_x)
}

pub fn trendlines(highs: &[f64], lows: &[f64]) -> Trendlines {
    let (upper_slope, upper_intercept) = linear_fit(highs);
    let (lower_slope, lower_intercept) = linear_fit(lows);

    Trendlines {
        upper: (0..highs.len())
            .map(|i| upper_slope * i as f64 + upper_intercept)
            .collect(),
        lower: (0..lows.len())
            .map(|i| lower_slope * i as f64 + lower_intercept)
            .collect(),
        upper_slope,
        lower_slope,
    }
}

pub fn support_resistance(prices: &[f64], params: &LevelParams) -> Option<SupportResistance> {
    if prices.is_empty() {
        return None;
    }

    let recent = tail(prices, params.window.max(1));
    let support = recent.iter().copied().fold(f64::INFINITY, f64::min);
    let resistance = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let scan = tail(prices, params.lookback);
    let mut historical_levels = BTreeMap::new();
    for i in 1..scan.len().saturating_sub(1) {
        let (prev, level, next) = (scan[i - 1], scan[i], scan[i + 1]);
        let is_peak = level > prev && level > next;
        let is_trough = level < prev && level < next;
        if !(is_peak || is_trough) || level == 0.0 {
            continue;
        }
        let touches = scan
            .iter()
            .filter(|&&p| ((p - level) / level).abs() <= params.touch_threshold)
            .count();
        historical_levels.insert(OrderedFloat(level), touches);
    }

    Some(SupportResistance {
        support,
        resistance,
        historical_levels,
    })
}

pub fn fibonacci_levels(prices: &[f64]) -> Option<FibonacciLevels> {
    if prices.is_empty() {
        return None;
    }
    let high = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let diff = high - low;

    let levels = FIB_RATIOS
        .iter()
        .map(|&ratio| {
            let price = if ratio == 1.0 { high } else { low + ratio * diff };
            (OrderedFloat(ratio), price)
        })
        .collect();
    Some(FibonacciLevels { levels })
}

/// Mean of the last five volumes relative to the whole-window mean, in [0, 1].
pub fn volume_confidence(volumes: &[f64]) -> f64 {
    if volumes.is_empty() {
        return 0.0;
    }
    let historical = mean(volumes);
    if historical <= 0.0 || !historical.is_finite() {
        return 0.0;
    }
    let recent = mean(tail(volumes, RECENT_VOLUME_BARS));
    (recent / historical).clamp(0.0, 1.0)
}

/// Mean of the last `n` values (or all of them when fewer are available).
pub fn trailing_mean(values: &[f64], n: usize) -> f64 {
    mean(tail(values, n))
}

/// Every feature the aggregator needs for one asset on one tick.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub closes: Vec<f64>,
    pub trendlines: Trendlines,
    pub levels: SupportResistance,
    pub fibonacci: FibonacciLevels,
    pub volume_confidence: f64,
    pub short_ma: f64,
    pub long_ma: f64,
}

impl FeatureSet {
    /// Returns `None` when the window has fewer than two bars.
    pub fn compute(
        window: &OhlcvWindow,
        params: &LevelParams,
        short_ma_period: usize,
        long_ma_period: usize,
    ) -> Option<Self> {
        if window.len() < 2 {
            return None;
        }
        let closes = window.closes();
        let trendlines = trendlines(&window.highs(), &window.lows());
        let levels = support_resistance(&closes, params)?;
        let fibonacci = fibonacci_levels(&closes)?;
        let volume_confidence = volume_confidence(&window.volumes());
        let short_ma = trailing_mean(&closes, short_ma_period);
        let long_ma = trailing_mean(&closes, long_ma_period);

        Some(FeatureSet {
            closes,
            trendlines,
            levels,
            fibonacci,
            volume_confidence,
            short_ma,
            long_ma,
        })
    }

    pub fn current_price(&self) -> f64 {
        self.closes.last().copied().unwrap_or(0.0)
    }

    /// Close `back` bars before the newest (0 = newest).
    pub fn close_at(&self, back: usize) -> Option<f64> {
        tail_at(&self.closes, back)
    }

    /// The last `n` closes, newest-last.
    pub fn recent_closes(&self, n: usize) -> &[f64] {
        tail(&self.closes, n)
    }
}

fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

fn tail_at(values: &[f64], back: usize) -> Option<f64> {
    values.len().checked_sub(back + 1).map(|i| values[i])
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
