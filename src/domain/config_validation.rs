//! Build and validate the engine configuration from a [`ConfigPort`].
//!
//! Absent keys take their defaults. A key that is present but does not parse
//! is an error, never silently defaulted.

use chrono::Duration;

use crate::domain::aggregator::AggregatorConfig;
use crate::domain::engine::EngineConfig;
use crate::domain::error::EngineError;
use crate::domain::features::LevelParams;
use crate::domain::pattern::PatternThresholds;
use crate::domain::portfolio::PortfolioConfig;
use crate::domain::tracker::TrackerConfig;
use crate::ports::config_port::ConfigPort;

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, EngineError> {
    let engine = EngineConfig {
        tracker: tracker_config(config)?,
        aggregator: aggregator_config(config)?,
        portfolio: portfolio_config(config)?,
    };
    engine.validate()?;
    Ok(engine)
}

pub fn tracker_config(config: &dyn ConfigPort) -> Result<TrackerConfig, EngineError> {
    let d = TrackerConfig::default();
    Ok(TrackerConfig {
        lookback: read_hours(config, "tracker", "lookback_period_hours", d.lookback)?,
        evaluation_delay: read_minutes(
            config,
            "tracker",
            "evaluation_delay_minutes",
            d.evaluation_delay,
        )?,
        min_weight: read_f64(config, "tracker", "min_weight", d.min_weight)?,
        default_weight: read_f64(config, "tracker", "default_weight", d.default_weight)?,
        min_signals_for_weight: read_usize(
            config,
            "tracker",
            "min_signals_for_weight",
            d.min_signals_for_weight,
        )?,
    })
}

pub fn aggregator_config(config: &dyn ConfigPort) -> Result<AggregatorConfig, EngineError> {
    const S: &str = "aggregator";
    let d = AggregatorConfig::default();
    Ok(AggregatorConfig {
        rebalance_period: read_hours(config, S, "rebalance_period_hours", d.rebalance_period)?,
        min_bars: read_usize(config, S, "min_bars", d.min_bars)?,
        window_capacity: read_usize(config, S, "window_capacity", d.window_capacity)?,
        min_signal_threshold: read_f64(config, S, "min_signal_threshold", d.min_signal_threshold)?,
        proximity_threshold: read_f64(config, S, "proximity_threshold", d.proximity_threshold)?,
        confidence_scale: read_f64(config, S, "confidence_scale", d.confidence_scale)?,
        market_return_window: read_usize(
            config,
            S,
            "market_return_window",
            d.market_return_window,
        )?,
        short_ma_period: read_usize(config, S, "short_ma_period", d.short_ma_period)?,
        long_ma_period: read_usize(config, S, "long_ma_period", d.long_ma_period)?,
        levels: LevelParams {
            window: read_usize(config, S, "sr_window", d.levels.window)?,
            lookback: read_usize(config, S, "sr_lookback", d.levels.lookback)?,
            touch_threshold: read_f64(config, S, "touch_threshold", d.levels.touch_threshold)?,
        },
        patterns: pattern_thresholds(config)?,
    })
}

pub fn pattern_thresholds(config: &dyn ConfigPort) -> Result<PatternThresholds, EngineError> {
    const S: &str = "patterns";
    let d = PatternThresholds::default();
    Ok(PatternThresholds {
        doji_body_ratio: read_f64(config, S, "doji_body_ratio", d.doji_body_ratio)?,
        small_shadow_ratio: read_f64(config, S, "small_shadow_ratio", d.small_shadow_ratio)?,
        long_shadow_ratio: read_f64(config, S, "long_shadow_ratio", d.long_shadow_ratio)?,
        hammer_shadow_multiple: read_f64(
            config,
            S,
            "hammer_shadow_multiple",
            d.hammer_shadow_multiple,
        )?,
        spinning_top_min: read_f64(config, S, "spinning_top_min", d.spinning_top_min)?,
        spinning_top_max: read_f64(config, S, "spinning_top_max", d.spinning_top_max)?,
        marubozu_shadow_ratio: read_f64(
            config,
            S,
            "marubozu_shadow_ratio",
            d.marubozu_shadow_ratio,
        )?,
        engulfing_tolerance: read_f64(config, S, "engulfing_tolerance", d.engulfing_tolerance)?,
        shoulder_tolerance: read_f64(config, S, "shoulder_tolerance", d.shoulder_tolerance)?,
        triangle_tolerance: read_f64(config, S, "triangle_tolerance", d.triangle_tolerance)?,
        chart_min_bars: read_usize(config, S, "chart_min_bars", d.chart_min_bars)?,
    })
}

pub fn portfolio_config(config: &dyn ConfigPort) -> Result<PortfolioConfig, EngineError> {
    let d = PortfolioConfig::default();
    Ok(PortfolioConfig {
        rebalance_period: read_hours(
            config,
            "portfolio",
            "rebalance_period_hours",
            d.rebalance_period,
        )?,
        max_weight: read_f64(config, "portfolio", "max_weight", d.max_weight)?,
        max_turnover: read_f64(config, "portfolio", "max_turnover", d.max_turnover)?,
        min_weight_change: read_f64(config, "portfolio", "min_weight_change", d.min_weight_change)?,
    })
}

fn read_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, EngineError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(EngineError::invalid(section, key, format!("expected a number, got '{raw}'"))),
        },
    }
}

fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, EngineError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            let reason = format!("expected a non-negative integer, got '{raw}'");
            EngineError::invalid(section, key, reason)
        }),
    }
}

fn read_hours(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Duration,
) -> Result<Duration, EngineError> {
    read_duration(config, section, key, default, Duration::try_hours)
}

fn read_minutes(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Duration,
) -> Result<Duration, EngineError> {
    read_duration(config, section, key, default, Duration::try_minutes)
}

fn read_duration(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Duration,
    unit: fn(i64) -> Option<Duration>,
) -> Result<Duration, EngineError> {
    if !config.has_key(section, key) {
        return Ok(default);
    }
    let count = read_usize(config, section, key, 0)?;
    i64::try_from(count)
        .ok()
        .and_then(unit)
        .ok_or_else(|| EngineError::invalid(section, key, "duration out of range"))
}
