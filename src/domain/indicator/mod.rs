//! Signal-source identity and direction.
//!
//! - `Direction`: the side an indicator votes for
//! - `Indicator`: every rule, structural check or pattern that can fire a
//!   signal; serves as the per-asset key for tracked statistics

use std::fmt;

use super::pattern::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// +1 for bullish, -1 for bearish.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Indicator {
    Trendline,
    TrendlinePullback,
    TrendlineBounce,
    SupportResistance,
    SrPullback,
    SrBounce,
    Pattern(Pattern),
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Trendline => write!(f, "trendline"),
            Indicator::TrendlinePullback => write!(f, "trendline_pullback"),
            Indicator::TrendlineBounce => write!(f, "trendline_bounce"),
            Indicator::SupportResistance => write!(f, "support_resistance"),
            Indicator::SrPullback => write!(f, "sr_pullback"),
            Indicator::SrBounce => write!(f, "sr_bounce"),
            Indicator::Pattern(p) => write!(f, "pattern_{}", p.name()),
        }
    }
}
