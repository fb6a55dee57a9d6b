//! Live proximity monitor: `idle → watch → imminent → cross`.
//!
//! Meant to run once per bar interval against a rolling window of recent
//! candles. The caller owns the [`SignalState`] and threads it through every
//! call; each evaluation is a pure function of `(prior, window)`.

use serde::{Deserialize, Serialize};

use super::{
    bar_signals, BarCrosses, BarSignal, CrossDetector, CrossDirection, CrossPair, EntrySignal,
};
use crate::domain::{closes, format_time, Candle};
use crate::engine::config::ConfigError;
use crate::indicators::{compute_indicators, IndicatorPeriods, IndicatorSample};

/// Thresholds for the proximity state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Distance (bps of last close) at or below which the state is `watch`.
    pub watch_bps: f64,
    /// Distance at or below which the state is `imminent`.
    pub imminent_bps: f64,
    /// Minimum candles in the window before any state other than `error`.
    pub min_bars: usize,
    /// A confirmed cross stays `cross` for this many bars.
    pub cross_recent_bars: usize,
    /// Cap on the estimated bars to cross.
    pub max_eta_bars: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            watch_bps: 8.0,
            imminent_bps: 3.0,
            min_bars: 30,
            cross_recent_bars: 3,
            max_eta_bars: 120,
        }
    }
}

impl LiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("watch_bps", self.watch_bps), ("imminent_bps", self.imminent_bps)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::OutOfRange {
                    name,
                    value,
                    expected: ">= 0",
                });
            }
        }
        if self.imminent_bps > self.watch_bps {
            return Err(ConfigError::Inconsistent(format!(
                "imminent_bps ({}) must not exceed watch_bps ({})",
                self.imminent_bps, self.watch_bps
            )));
        }
        if self.min_bars < 2 {
            return Err(ConfigError::OutOfRange {
                name: "min_bars",
                value: self.min_bars as f64,
                expected: ">= 2",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityState {
    Idle,
    Watch,
    Imminent,
    Cross,
    Error,
}

impl ProximityState {
    pub fn label(self) -> &'static str {
        match self {
            ProximityState::Idle => "idle",
            ProximityState::Watch => "watch",
            ProximityState::Imminent => "imminent",
            ProximityState::Cross => "cross",
            ProximityState::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
}

impl From<CrossDirection> for Bias {
    fn from(dir: CrossDirection) -> Self {
        match dir {
            CrossDirection::Up => Bias::Bullish,
            CrossDirection::Down => Bias::Bearish,
        }
    }
}

/// Last observed cross of one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossMark {
    pub direction: CrossDirection,
    pub time: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCrossTimes {
    pub fast_slow: Option<CrossMark>,
    pub fast_mid: Option<CrossMark>,
}

impl PairCrossTimes {
    fn record(&mut self, pair: CrossPair, mark: CrossMark) {
        match pair {
            CrossPair::FastSlow => self.fast_slow = Some(mark),
            CrossPair::FastMid => self.fast_mid = Some(mark),
        }
    }

    /// Direction and time of the newer mark when both pairs agree.
    pub fn agreement(&self) -> Option<(CrossDirection, i64)> {
        match (self.fast_slow, self.fast_mid) {
            (Some(a), Some(b)) if a.direction == b.direction => {
                Some((a.direction, a.time.max(b.time)))
            }
            _ => None,
        }
    }
}

/// Immutable snapshot returned by every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub state: ProximityState,
    pub direction: Option<Bias>,
    pub distance_bps: Option<f64>,
    pub estimated_bars_to_cross: Option<u32>,
    pub last_cross: PairCrossTimes,
    /// Time of the newest candle this state was computed from.
    pub evaluated_at: Option<i64>,
    pub bars_seen: usize,
    pub note: String,
}

impl Default for SignalState {
    fn default() -> Self {
        Self {
            state: ProximityState::Idle,
            direction: None,
            distance_bps: None,
            estimated_bars_to_cross: None,
            last_cross: PairCrossTimes::default(),
            evaluated_at: None,
            bars_seen: 0,
            note: "not evaluated".into(),
        }
    }
}

impl SignalState {
    /// An `error` state that keeps the prior cross marks.
    pub fn error(prior: &SignalState, bars_seen: usize, note: impl Into<String>) -> Self {
        Self {
            state: ProximityState::Error,
            direction: None,
            distance_bps: None,
            estimated_bars_to_cross: None,
            last_cross: prior.last_cross,
            evaluated_at: prior.evaluated_at,
            bars_seen,
            note: note.into(),
        }
    }
}

/// Proximity evaluator. Holds configuration only.
#[derive(Debug, Clone)]
pub struct LiveMonitor {
    config: LiveConfig,
    periods: IndicatorPeriods,
}

impl LiveMonitor {
    pub fn new(config: LiveConfig, periods: IndicatorPeriods) -> Result<Self, ConfigError> {
        config.validate()?;
        periods.validate()?;
        Ok(Self { config, periods })
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Candles needed before the monitor leaves `error`.
    pub fn required_bars(&self) -> usize {
        self.config.min_bars.max(self.periods.warmup() + 1)
    }

    /// Evaluate a rolling window of candles (ascending by time).
    pub fn evaluate(&self, prior: &SignalState, window: &[Candle]) -> SignalState {
        let samples = compute_indicators(&closes(window), &self.periods);
        self.transition(prior, &samples, window)
    }

    /// Same as [`evaluate`](Self::evaluate) with indicators already computed for `window`.
    pub fn transition(
        &self,
        prior: &SignalState,
        samples: &[IndicatorSample],
        window: &[Candle],
    ) -> SignalState {
        let n = window.len().min(samples.len());
        let need = self.required_bars();
        if n < need {
            return SignalState::error(
                prior,
                n,
                format!("insufficient data: {n} bars, need {need}"),
            );
        }

        let last = &samples[n - 1];
        let prev = &samples[n - 2];
        let last_close = window[n - 1].close;
        let (Some(d), Some(d_prev)) = (
            last.spread(CrossPair::FastSlow),
            prev.spread(CrossPair::FastSlow),
        ) else {
            return SignalState::error(prior, n, "non-finite indicators on the latest bar");
        };
        if !last.is_finite() || !(last_close.is_finite() && last_close > 0.0) {
            return SignalState::error(prior, n, "non-finite indicators on the latest bar");
        }

        let distance_bps = d.abs() / last_close * 10_000.0;
        let eta = self.estimate_bars_to_cross(d, d_prev);
        let last_cross = track_crosses(prior, samples, window);

        let (state, direction) = match last_cross.agreement() {
            Some((dir, latest)) => {
                let bars_since = n - window.partition_point(|c| c.time <= latest);
                let state = if bars_since <= self.config.cross_recent_bars {
                    ProximityState::Cross
                } else if distance_bps <= self.config.imminent_bps {
                    ProximityState::Imminent
                } else {
                    ProximityState::Watch
                };
                (state, Some(Bias::from(dir)))
            }
            None => {
                let state = if distance_bps <= self.config.imminent_bps {
                    ProximityState::Imminent
                } else if distance_bps <= self.config.watch_bps {
                    ProximityState::Watch
                } else {
                    ProximityState::Idle
                };
                // An approaching cross points in the direction the spread is heading.
                let heading = eta.map(|_| {
                    if d < 0.0 {
                        Bias::Bullish
                    } else {
                        Bias::Bearish
                    }
                });
                (state, heading)
            }
        };

        let note = match (state, eta) {
            (ProximityState::Cross, _) => format!(
                "cross confirmed on both pairs, fast/slow {distance_bps:.2} bps apart"
            ),
            (_, Some(bars)) => format!("fast/slow {distance_bps:.2} bps apart, cross in ~{bars} bars"),
            _ => format!("fast/slow {distance_bps:.2} bps apart"),
        };

        SignalState {
            state,
            direction,
            distance_bps: Some(distance_bps),
            estimated_bars_to_cross: eta,
            last_cross,
            evaluated_at: Some(window[n - 1].time),
            bars_seen: n,
            note,
        }
    }

    /// `ceil(-d / slope)` when the spread is closing, capped at `max_eta_bars`.
    fn estimate_bars_to_cross(&self, d: f64, d_prev: f64) -> Option<u32> {
        let slope = d - d_prev;
        if slope == 0.0 {
            return None;
        }
        let est = -d / slope;
        if est.is_finite() && est > 0.0 {
            let capped = est.ceil().min(self.config.max_eta_bars as f64);
            Some(capped as u32)
        } else {
            None
        }
    }
}

/// Update per-pair cross marks. Only candles newer than `prior.evaluated_at`
/// are scanned when the window still overlaps the prior evaluation.
fn track_crosses(prior: &SignalState, samples: &[IndicatorSample], window: &[Candle]) -> PairCrossTimes {
    let n = window.len().min(samples.len());
    let start = match prior.evaluated_at {
        Some(t) if window.first().is_some_and(|c| c.time <= t) => {
            window.partition_point(|c| c.time <= t).max(1)
        }
        _ => 1,
    };

    let mut marks = prior.last_cross;
    for i in start..n {
        let crosses = BarCrosses::at(samples, i);
        for pair in [CrossPair::FastSlow, CrossPair::FastMid] {
            if let Some(direction) = crosses.get(pair) {
                marks.record(
                    pair,
                    CrossMark {
                        direction,
                        time: window[i].time,
                    },
                );
            }
        }
    }
    marks
}

/// Replays the live monitor over a full series, one expanding window per bar.
/// An entry fires on each bar the state newly becomes `cross`.
#[derive(Debug, Clone)]
pub struct LiveProximity {
    pub config: LiveConfig,
}

impl CrossDetector for LiveProximity {
    fn name(&self) -> &str {
        "live_proximity"
    }

    fn detect(
        &self,
        samples: &[IndicatorSample],
        candles: &[Candle],
        periods: &IndicatorPeriods,
    ) -> Vec<BarSignal> {
        let monitor = LiveMonitor {
            config: self.config.clone(),
            periods: *periods,
        };
        let mut state = SignalState::default();

        bar_signals(samples, candles, periods.warmup(), |i, _time, _crosses| {
            let next = monitor.transition(&state, &samples[..=i], &candles[..=i]);
            let entered = next.state == ProximityState::Cross
                && (state.state != ProximityState::Cross || state.direction != next.direction);
            let entry = if entered {
                entry_from_marks(&next.last_cross, candles)
            } else {
                None
            };
            state = next;
            entry
        })
    }
}

fn entry_from_marks(marks: &PairCrossTimes, candles: &[Candle]) -> Option<EntrySignal> {
    let (fs, fm) = (marks.fast_slow?, marks.fast_mid?);
    let index_of = |time: i64| candles.partition_point(|c| c.time < time);
    let (first, confirm) = if fs.time <= fm.time {
        ((CrossPair::FastSlow, fs), (CrossPair::FastMid, fm))
    } else {
        ((CrossPair::FastMid, fm), (CrossPair::FastSlow, fs))
    };
    Some(EntrySignal::dual(
        fs.direction.side(),
        (first.0, index_of(first.1.time), first.1.time),
        (confirm.0, index_of(confirm.1.time), confirm.1.time),
        false,
    ))
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let direction = match self.direction {
            Some(Bias::Bullish) => "bullish",
            Some(Bias::Bearish) => "bearish",
            None => "-",
        };
        let at = self.evaluated_at.map(format_time).unwrap_or_else(|| "-".into());
        write!(
            f,
            "{:<8} {:<7} {} ({})",
            self.state.label(),
            direction,
            self.note,
            at
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::make_candles;

    fn monitor() -> LiveMonitor {
        LiveMonitor::new(LiveConfig::default(), IndicatorPeriods::default()).unwrap()
    }

    #[test]
    fn too_few_bars_is_error_with_note() {
        let candles = make_candles(&vec![100.0; 10]);
        let state = monitor().evaluate(&SignalState::default(), &candles);
        assert_eq!(state.state, ProximityState::Error);
        assert!(state.note.contains("insufficient data"));
        assert_eq!(state.bars_seen, 10);
    }

    #[test]
    fn nan_close_is_error() {
        let mut closes = vec![100.0; 40];
        closes[39] = f64::NAN;
        let state = monitor().evaluate(&SignalState::default(), &make_candles(&closes));
        assert_eq!(state.state, ProximityState::Error);
    }

    #[test]
    fn flat_series_is_imminent_without_crosses() {
        let candles = make_candles(&vec![100.0; 40]);
        let state = monitor().evaluate(&SignalState::default(), &candles);
        assert_eq!(state.state, ProximityState::Imminent);
        assert_eq!(state.distance_bps, Some(0.0));
        assert_eq!(state.last_cross, PairCrossTimes::default());
        assert_eq!(state.estimated_bars_to_cross, None);
    }

    #[test]
    fn stale_agreeing_cross_is_watch() {
        // Steady climb from a flat base: both pairs crossed up at bar 30,
        // long before the last bar.
        let mut closes = vec![100.0; 30];
        closes.extend((1..=40).map(|i| 100.0 + i as f64));
        let candles = make_candles(&closes);
        let state = monitor().evaluate(&SignalState::default(), &candles);
        assert_eq!(state.direction, Some(Bias::Bullish));
        assert_eq!(state.state, ProximityState::Watch);
        assert!(state.distance_bps.unwrap() > 8.0);
    }

    #[test]
    fn fresh_agreeing_cross_is_cross_state() {
        let mut closes = vec![100.0; 35];
        closes.push(101.0);
        let candles = make_candles(&closes);
        let state = monitor().evaluate(&SignalState::default(), &candles);
        assert_eq!(state.state, ProximityState::Cross);
        assert_eq!(state.direction, Some(Bias::Bullish));
        assert_eq!(state.evaluated_at, Some(candles[35].time));
    }

    #[test]
    fn state_is_threaded_not_global() {
        let m = monitor();
        let mut closes = vec![100.0; 35];
        closes.push(101.0);
        let candles = make_candles(&closes);
        let first = m.evaluate(&SignalState::default(), &candles);

        // A later window that no longer contains the cross bar keeps the mark
        // only through the threaded state.
        let mut later = closes.clone();
        later.extend(std::iter::repeat(101.0).take(40));
        let later_candles = make_candles(&later);
        let tail = &later_candles[later_candles.len() - 35..];

        let threaded = m.evaluate(&first, tail);
        let fresh = m.evaluate(&SignalState::default(), tail);
        assert!(threaded.last_cross.fast_slow.is_some());
        assert_eq!(threaded.last_cross.fast_slow, first.last_cross.fast_slow);
        assert!(fresh.last_cross.fast_slow.is_none());
        // Prior snapshot is untouched.
        assert_eq!(first.state, ProximityState::Cross);
    }

    #[test]
    fn eta_estimate_is_capped() {
        let m = monitor();
        assert_eq!(m.estimate_bars_to_cross(-4.0, -6.0), Some(2));
        assert_eq!(m.estimate_bars_to_cross(-1000.0, -1000.001), Some(120));
        assert_eq!(m.estimate_bars_to_cross(-4.0, -2.0), None);
        assert_eq!(m.estimate_bars_to_cross(3.0, 3.0), None);
    }

    #[test]
    fn config_validation() {
        let bad = LiveConfig {
            imminent_bps: 9.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::Inconsistent(_))));
        let negative = LiveConfig {
            watch_bps: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }
}
