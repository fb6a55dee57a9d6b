//! Crossover detection: portfolio-agnostic signals.
//!
//! Signals never depend on portfolio state. Every policy turns the same
//! indicator stream into one [`BarSignal`] per candle; the position manager
//! decides what to do with them.

pub mod cross;
pub mod dual;
pub mod live;
pub mod single;

pub use cross::{classify, cross_at, detect_crosses, BarCrosses};
pub use dual::{DualCross, DualCrossMachine, DualCrossState, Evidence};
pub use live::{
    Bias, CrossMark, LiveConfig, LiveMonitor, LiveProximity, PairCrossTimes, ProximityState,
    SignalState,
};
pub use single::SingleCross;

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Side};
use crate::engine::config::ConfigError;
use crate::indicators::{IndicatorPeriods, IndicatorSample};

/// Which average the fast EMA is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossPair {
    /// Fast EMA vs slow EMA.
    FastSlow,
    /// Fast EMA vs mid-band SMA.
    FastMid,
}

impl CrossPair {
    pub fn label(self) -> &'static str {
        match self {
            CrossPair::FastSlow => "fast-slow",
            CrossPair::FastMid => "fast-mid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossDirection {
    Up,
    Down,
}

impl CrossDirection {
    pub fn label(self) -> &'static str {
        match self {
            CrossDirection::Up => "up",
            CrossDirection::Down => "down",
        }
    }

    pub fn side(self) -> Side {
        match self {
            CrossDirection::Up => Side::Long,
            CrossDirection::Down => Side::Short,
        }
    }

    pub fn from_side(side: Side) -> Self {
        match side {
            Side::Long => CrossDirection::Up,
            Side::Short => CrossDirection::Down,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            CrossDirection::Up => CrossDirection::Down,
            CrossDirection::Down => CrossDirection::Up,
        }
    }
}

/// A sign change of `fast − other`, on the bar it is first observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossEvent {
    pub pair: CrossPair,
    pub direction: CrossDirection,
    pub bar_index: usize,
    pub time: i64,
}

/// A full entry signal with its evidence trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySignal {
    pub side: Side,
    pub first_pair: CrossPair,
    pub first_index: usize,
    pub first_time: i64,
    pub confirm_pair: CrossPair,
    pub confirm_index: usize,
    pub confirm_time: i64,
    /// Confirmed a reversal that started as a single contrary cross.
    pub from_pending_opposite: bool,
}

impl EntrySignal {
    /// One cross is the whole evidence.
    pub fn single(side: Side, pair: CrossPair, index: usize, time: i64) -> Self {
        Self {
            side,
            first_pair: pair,
            first_index: index,
            first_time: time,
            confirm_pair: pair,
            confirm_index: index,
            confirm_time: time,
            from_pending_opposite: false,
        }
    }

    /// `(pair, index, time)` of the first and the confirming cross.
    pub fn dual(
        side: Side,
        first: (CrossPair, usize, i64),
        confirm: (CrossPair, usize, i64),
        from_pending_opposite: bool,
    ) -> Self {
        Self {
            side,
            first_pair: first.0,
            first_index: first.1,
            first_time: first.2,
            confirm_pair: confirm.0,
            confirm_index: confirm.1,
            confirm_time: confirm.2,
            from_pending_opposite,
        }
    }

    /// Bars between first evidence and confirmation (`open_crossDist_bars`).
    pub fn cross_dist_bars(&self) -> usize {
        self.confirm_index.saturating_sub(self.first_index)
    }
}

/// Detector output for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarSignal {
    pub index: usize,
    pub time: i64,
    pub crosses: BarCrosses,
    pub entry: Option<EntrySignal>,
    /// A contrary cross is waiting for the other pair before a reverse entry.
    #[serde(default)]
    pub pending_opposite: bool,
}

/// Common interface of every detector policy.
pub trait CrossDetector {
    fn name(&self) -> &str;

    /// One [`BarSignal`] per candle. Bars before the warm-up carry no crosses.
    fn detect(
        &self,
        samples: &[IndicatorSample],
        candles: &[Candle],
        periods: &IndicatorPeriods,
    ) -> Vec<BarSignal>;
}

/// Detector selection, as carried in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorPolicy {
    /// Either pair crossing opens.
    SingleCross,
    /// Both pairs within `open_window` bars (0 = same bar).
    DualCross { open_window: usize },
    /// Both pairs, in any order, any distance apart.
    SecondEvidence,
    /// Replay of the live proximity state machine.
    LiveProximity(LiveConfig),
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        DetectorPolicy::DualCross { open_window: 5 }
    }
}

impl DetectorPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DetectorPolicy::LiveProximity(config) => config.validate(),
            _ => Ok(()),
        }
    }
}

impl CrossDetector for DetectorPolicy {
    fn name(&self) -> &str {
        match self {
            DetectorPolicy::SingleCross => "single_cross",
            DetectorPolicy::DualCross { .. } => "dual_cross",
            DetectorPolicy::SecondEvidence => "second_evidence",
            DetectorPolicy::LiveProximity(_) => "live_proximity",
        }
    }

    fn detect(
        &self,
        samples: &[IndicatorSample],
        candles: &[Candle],
        periods: &IndicatorPeriods,
    ) -> Vec<BarSignal> {
        match self {
            DetectorPolicy::SingleCross => SingleCross.detect(samples, candles, periods),
            DetectorPolicy::DualCross { open_window } => DualCross {
                open_window: Some(*open_window),
            }
            .detect(samples, candles, periods),
            DetectorPolicy::SecondEvidence => {
                DualCross { open_window: None }.detect(samples, candles, periods)
            }
            DetectorPolicy::LiveProximity(config) => LiveProximity {
                config: config.clone(),
            }
            .detect(samples, candles, periods),
        }
    }
}

/// Shared bar loop: crosses from `warmup` on, entries from `entry_for`.
pub(crate) fn bar_signals<F>(
    samples: &[IndicatorSample],
    candles: &[Candle],
    warmup: usize,
    mut entry_for: F,
) -> Vec<BarSignal>
where
    F: FnMut(usize, i64, &BarCrosses) -> Option<EntrySignal>,
{
    let n = samples.len().min(candles.len());
    (0..n)
        .map(|i| {
            let time = candles[i].time;
            if i < warmup.max(1) {
                return BarSignal {
                    index: i,
                    time,
                    crosses: BarCrosses::default(),
                    entry: None,
                    pending_opposite: false,
                };
            }
            let crosses = BarCrosses::at(samples, i);
            let entry = entry_for(i, time, &crosses);
            BarSignal {
                index: i,
                time,
                crosses,
                entry,
                pending_opposite: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::make_candles;
    use crate::indicators::compute_indicators;

    fn all_policies() -> Vec<DetectorPolicy> {
        vec![
            DetectorPolicy::SingleCross,
            DetectorPolicy::DualCross { open_window: 0 },
            DetectorPolicy::DualCross { open_window: 5 },
            DetectorPolicy::SecondEvidence,
            DetectorPolicy::LiveProximity(LiveConfig::default()),
        ]
    }

    #[test]
    fn one_signal_per_candle_for_every_policy() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + (i as f64 / 7.0).sin() * 3.0)
            .collect();
        let candles = make_candles(&closes);
        let periods = IndicatorPeriods::default();
        let samples = compute_indicators(&closes, &periods);
        for policy in all_policies() {
            let signals = policy.detect(&samples, &candles, &periods);
            assert_eq!(signals.len(), 120, "{}", policy.name());
            assert!(signals[..21].iter().all(|s| s.entry.is_none() && s.crosses.is_empty()));
            assert!(signals.iter().enumerate().all(|(i, s)| s.index == i));
        }
    }

    #[test]
    fn constant_series_never_signals() {
        let closes = vec![42.0; 100];
        let candles = make_candles(&closes);
        let periods = IndicatorPeriods::default();
        let samples = compute_indicators(&closes, &periods);
        for policy in all_policies() {
            let signals = policy.detect(&samples, &candles, &periods);
            assert!(
                signals.iter().all(|s| s.entry.is_none() && s.crosses.is_empty()),
                "{} fired on a constant series",
                policy.name()
            );
        }
    }

    #[test]
    fn policy_serde_is_tagged() {
        let json = serde_json::to_string(&DetectorPolicy::DualCross { open_window: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"dual_cross","open_window":3}"#);
        let back: DetectorPolicy = serde_json::from_str(r#"{"kind":"second_evidence"}"#).unwrap();
        assert_eq!(back, DetectorPolicy::SecondEvidence);
    }

    #[test]
    fn cross_dist_counts_bars_between_evidence() {
        let sig = EntrySignal::dual(
            Side::Long,
            (CrossPair::FastSlow, 10, 0),
            (CrossPair::FastMid, 13, 0),
            false,
        );
        assert_eq!(sig.cross_dist_bars(), 3);
        assert_eq!(EntrySignal::single(Side::Short, CrossPair::FastMid, 4, 0).cross_dist_bars(), 0);
    }
}
