//! Dual-cross policy: both pairs must cross in the same direction.
//!
//! The evidence bookkeeping is an explicit state machine:
//!
//! ```text
//!   NoSignal ──cross──▶ OneConfirmed ──other pair, same dir, in window──▶ BothConfirmed
//!      ▲                    │  (contrary to last signal: PendingOpposite)      │
//!      └────window lapses───┘                                                  │
//!      └──────────────────────────────── next bar ◀────────────────────────────┘
//! ```
//!
//! An opposite-direction cross replaces pending evidence. Signals are emitted
//! from market data alone; whether a position is open never changes a transition.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{BarCrosses, BarSignal, CrossDetector, CrossDirection, CrossPair, EntrySignal};
use crate::domain::Candle;
use crate::indicators::{IndicatorPeriods, IndicatorSample};

/// One observed cross, kept as evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub direction: CrossDirection,
    pub pair: CrossPair,
    pub index: usize,
    pub time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DualCrossState {
    NoSignal,
    /// One pair crossed; waiting for the other.
    OneConfirmed { first: Evidence },
    /// One pair crossed against the last emitted signal; waiting for the other
    /// before the reverse entry is allowed.
    PendingOpposite { first: Evidence },
    /// Both pairs crossed. Lasts for the confirming bar only.
    BothConfirmed { first: Evidence, confirm: Evidence },
}

impl DualCrossState {
    pub fn pending(&self) -> Option<&Evidence> {
        match self {
            DualCrossState::OneConfirmed { first } | DualCrossState::PendingOpposite { first } => {
                Some(first)
            }
            _ => None,
        }
    }
}

/// Evidence tracker for one symbol-run.
#[derive(Debug, Clone)]
pub struct DualCrossMachine {
    /// Max bars between first evidence and confirmation; `None` is unlimited.
    window: Option<usize>,
    state: DualCrossState,
    last_signal: Option<CrossDirection>,
}

impl DualCrossMachine {
    pub fn new(window: Option<usize>) -> Self {
        Self {
            window,
            state: DualCrossState::NoSignal,
            last_signal: None,
        }
    }

    pub fn state(&self) -> &DualCrossState {
        &self.state
    }

    pub fn is_pending_opposite(&self) -> bool {
        matches!(self.state, DualCrossState::PendingOpposite { .. })
    }

    /// Advance one bar. Returns an entry signal on the confirming bar.
    pub fn step(&mut self, index: usize, time: i64, crosses: &BarCrosses) -> Option<EntrySignal> {
        if matches!(self.state, DualCrossState::BothConfirmed { .. }) {
            self.state = DualCrossState::NoSignal;
        }
        self.expire(index);

        let from_pending_opposite = matches!(self.state, DualCrossState::PendingOpposite { .. });

        self.state = match (crosses.fast_slow, crosses.fast_mid) {
            (Some(a), Some(b)) if a == b => {
                let first = Evidence {
                    direction: a,
                    pair: CrossPair::FastSlow,
                    index,
                    time,
                };
                let confirm = Evidence {
                    pair: CrossPair::FastMid,
                    ..first
                };
                DualCrossState::BothConfirmed { first, confirm }
            }
            (Some(dir), _) => self.observe(Evidence {
                direction: dir,
                pair: CrossPair::FastSlow,
                index,
                time,
            }),
            (None, Some(dir)) => self.observe(Evidence {
                direction: dir,
                pair: CrossPair::FastMid,
                index,
                time,
            }),
            (None, None) => return None,
        };

        match self.state {
            DualCrossState::BothConfirmed { first, confirm } => {
                self.last_signal = Some(first.direction);
                Some(EntrySignal::dual(
                    first.direction.side(),
                    (first.pair, first.index, first.time),
                    (confirm.pair, confirm.index, confirm.time),
                    from_pending_opposite,
                ))
            }
            _ => None,
        }
    }

    fn observe(&self, evidence: Evidence) -> DualCrossState {
        match self.state.pending() {
            Some(first) if first.direction == evidence.direction && first.pair != evidence.pair => {
                DualCrossState::BothConfirmed {
                    first: *first,
                    confirm: evidence,
                }
            }
            _ if self.last_signal == Some(evidence.direction.opposite()) => {
                DualCrossState::PendingOpposite { first: evidence }
            }
            _ => DualCrossState::OneConfirmed { first: evidence },
        }
    }

    fn expire(&mut self, index: usize) {
        let (Some(window), Some(first)) = (self.window, self.state.pending().copied()) else {
            return;
        };
        if index.saturating_sub(first.index) > window {
            trace!(
                first_index = first.index,
                index,
                window,
                "pending cross evidence dropped"
            );
            self.state = DualCrossState::NoSignal;
        }
    }
}

/// Dual-cross detector. `open_window: None` is the second-evidence variant:
/// the second pair may confirm any number of bars later.
#[derive(Debug, Clone, Copy)]
pub struct DualCross {
    pub open_window: Option<usize>,
}

impl CrossDetector for DualCross {
    fn name(&self) -> &str {
        match self.open_window {
            Some(_) => "dual_cross",
            None => "second_evidence",
        }
    }

    fn detect(
        &self,
        samples: &[IndicatorSample],
        candles: &[Candle],
        periods: &IndicatorPeriods,
    ) -> Vec<BarSignal> {
        let mut machine = DualCrossMachine::new(self.open_window);
        let mut pending = vec![false; samples.len().min(candles.len())];
        let mut signals =
            super::bar_signals(samples, candles, periods.warmup(), |i, time, crosses| {
                let entry = machine.step(i, time, crosses);
                pending[i] = machine.is_pending_opposite();
                entry
            });
        for (signal, pending) in signals.iter_mut().zip(pending) {
            signal.pending_opposite = pending;
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;

    fn fs(dir: CrossDirection) -> BarCrosses {
        BarCrosses {
            fast_slow: Some(dir),
            fast_mid: None,
        }
    }

    fn fm(dir: CrossDirection) -> BarCrosses {
        BarCrosses {
            fast_slow: None,
            fast_mid: Some(dir),
        }
    }

    const NONE: BarCrosses = BarCrosses {
        fast_slow: None,
        fast_mid: None,
    };

    fn run(machine: &mut DualCrossMachine, events: &[(usize, BarCrosses)], until: usize) -> Vec<EntrySignal> {
        let mut out = Vec::new();
        for i in 0..=until {
            let crosses = events
                .iter()
                .find(|(idx, _)| *idx == i)
                .map(|(_, c)| *c)
                .unwrap_or(NONE);
            if let Some(sig) = machine.step(i, i as i64 * 60_000, &crosses) {
                out.push(sig);
            }
        }
        out
    }

    #[test]
    fn confirms_within_window() {
        let mut m = DualCrossMachine::new(Some(5));
        let signals = run(
            &mut m,
            &[(10, fs(CrossDirection::Up)), (13, fm(CrossDirection::Up))],
            20,
        );
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Long);
        assert_eq!(signals[0].first_index, 10);
        assert_eq!(signals[0].confirm_index, 13);
        assert_eq!(signals[0].cross_dist_bars(), 3);
    }

    #[test]
    fn window_lapse_drops_evidence() {
        let mut m = DualCrossMachine::new(Some(2));
        let signals = run(
            &mut m,
            &[(10, fs(CrossDirection::Up)), (13, fm(CrossDirection::Up))],
            20,
        );
        assert!(signals.is_empty());
        // The late cross becomes fresh evidence of its own.
        assert!(matches!(
            m.state(),
            DualCrossState::NoSignal | DualCrossState::OneConfirmed { .. }
        ));
    }

    #[test]
    fn zero_window_requires_same_bar() {
        let mut m = DualCrossMachine::new(Some(0));
        let late = run(
            &mut m,
            &[(10, fs(CrossDirection::Up)), (11, fm(CrossDirection::Up))],
            12,
        );
        assert!(late.is_empty());

        let mut m = DualCrossMachine::new(Some(0));
        let both = BarCrosses {
            fast_slow: Some(CrossDirection::Down),
            fast_mid: Some(CrossDirection::Down),
        };
        let same_bar = run(&mut m, &[(10, both)], 10);
        assert_eq!(same_bar.len(), 1);
        assert_eq!(same_bar[0].side, Side::Short);
        assert_eq!(same_bar[0].cross_dist_bars(), 0);
    }

    #[test]
    fn opposite_cross_replaces_evidence() {
        let mut m = DualCrossMachine::new(None);
        let signals = run(
            &mut m,
            &[
                (5, fs(CrossDirection::Up)),
                (8, fs(CrossDirection::Down)),
                (12, fm(CrossDirection::Up)),
            ],
            15,
        );
        assert!(signals.is_empty());
        assert_eq!(m.state().pending().map(|e| e.index), Some(12));
    }

    #[test]
    fn unlimited_window_confirms_late() {
        let mut m = DualCrossMachine::new(None);
        let signals = run(
            &mut m,
            &[(5, fm(CrossDirection::Down)), (90, fs(CrossDirection::Down))],
            95,
        );
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].first_pair, CrossPair::FastMid);
        assert_eq!(signals[0].cross_dist_bars(), 85);
    }

    #[test]
    fn contrary_evidence_after_signal_is_pending_opposite() {
        let mut m = DualCrossMachine::new(Some(5));
        let signals = run(
            &mut m,
            &[
                (10, fs(CrossDirection::Up)),
                (11, fm(CrossDirection::Up)),
                (20, fm(CrossDirection::Down)),
            ],
            21,
        );
        assert_eq!(signals.len(), 1);
        assert!(matches!(
            m.state(),
            DualCrossState::PendingOpposite { first } if first.index == 20
        ));

        let reverse = m.step(23, 23 * 60_000, &fs(CrossDirection::Down)).unwrap();
        assert_eq!(reverse.side, Side::Short);
        assert_eq!(reverse.cross_dist_bars(), 3);
        assert!(reverse.from_pending_opposite);
    }

    #[test]
    fn both_confirmed_lasts_one_bar() {
        let mut m = DualCrossMachine::new(Some(3));
        let both = BarCrosses {
            fast_slow: Some(CrossDirection::Up),
            fast_mid: Some(CrossDirection::Up),
        };
        m.step(4, 0, &both);
        assert!(matches!(m.state(), DualCrossState::BothConfirmed { .. }));
        m.step(5, 0, &NONE);
        assert_eq!(*m.state(), DualCrossState::NoSignal);
    }

    #[test]
    fn detector_flags_bars_waiting_on_a_reversal() {
        use crate::domain::candle::make_candles;
        use crate::indicators::IndicatorSample;

        // (fast - slow, fast - mid) per bar; fast is pinned at zero.
        let spreads = [
            (-1.0, -1.0),
            (-1.0, -1.0),
            (-1.0, -1.0),
            (1.0, 1.0),
            (1.0, 1.0),
            (-1.0, 1.0),
            (-1.0, 1.0),
            (-1.0, -1.0),
            (-1.0, -1.0),
        ];
        let samples: Vec<IndicatorSample> = spreads
            .iter()
            .map(|&(fs, fm)| IndicatorSample {
                ema_fast: 0.0,
                ema_slow: -fs,
                sma_mid: -fm,
            })
            .collect();
        let candles = make_candles(&vec![100.0; spreads.len()]);
        let periods = IndicatorPeriods {
            fast: 1,
            slow: 2,
            mid: 2,
        };

        let signals = DualCross {
            open_window: Some(5),
        }
        .detect(&samples, &candles, &periods);
        let flags: Vec<bool> = signals.iter().map(|s| s.pending_opposite).collect();
        assert_eq!(
            flags,
            vec![false, false, false, false, false, true, true, false, false]
        );
        assert_eq!(signals[3].entry.map(|e| e.side), Some(Side::Long));
        let reverse = signals[7].entry.unwrap();
        assert_eq!(reverse.side, Side::Short);
        assert!(reverse.from_pending_opposite);
    }
}
