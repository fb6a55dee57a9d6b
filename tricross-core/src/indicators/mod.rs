//! Indicator engine: fast EMA, slow EMA and mid SMA over a close series.
//!
//! Indicators are pure functions: closes in, a series of the same length out.
//! They are computed once before the bar loop and read by index afterwards.

pub mod ema;
pub mod sma;

pub use ema::{ema_of_series, Ema};
pub use sma::{sma_of_series, Sma};

use serde::{Deserialize, Serialize};

use crate::engine::config::ConfigError;
use crate::signals::CrossPair;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on closes from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_9", "sma_20").
    fn name(&self) -> &str;

    /// Number of bars before the indicator is considered settled.
    fn lookback(&self) -> usize;

    /// Compute the indicator over the entire close series.
    fn compute(&self, closes: &[f64]) -> Vec<f64>;
}

/// Periods of the three averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorPeriods {
    pub fast: usize,
    pub slow: usize,
    /// Mid-band SMA, the Bollinger midline proxy.
    pub mid: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        Self {
            fast: 9,
            slow: 21,
            mid: 20,
        }
    }
}

impl IndicatorPeriods {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, period) in [("fast", self.fast), ("slow", self.slow), ("mid", self.mid)] {
            if period == 0 {
                return Err(ConfigError::InvalidPeriod {
                    name,
                    reason: "must be >= 1".into(),
                });
            }
        }
        if self.fast >= self.slow {
            return Err(ConfigError::InvalidPeriod {
                name: "fast",
                reason: format!("must be below slow ({} >= {})", self.fast, self.slow),
            });
        }
        Ok(())
    }

    /// Bars until every average is settled: the largest period.
    pub fn warmup(&self) -> usize {
        self.fast.max(self.slow).max(self.mid)
    }
}

/// Indicator values for one bar.
///
/// Warm-up values are NaN and serialise as JSON `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSample {
    #[serde(with = "nan_as_null")]
    pub ema_fast: f64,
    #[serde(with = "nan_as_null")]
    pub ema_slow: f64,
    #[serde(with = "nan_as_null")]
    pub sma_mid: f64,
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

impl IndicatorSample {
    /// `fast − other` for the pair, or `None` if either side is not finite.
    pub fn spread(&self, pair: CrossPair) -> Option<f64> {
        let other = match pair {
            CrossPair::FastSlow => self.ema_slow,
            CrossPair::FastMid => self.sma_mid,
        };
        if self.ema_fast.is_finite() && other.is_finite() {
            Some(self.ema_fast - other)
        } else {
            None
        }
    }

    pub fn is_finite(&self) -> bool {
        self.ema_fast.is_finite() && self.ema_slow.is_finite() && self.sma_mid.is_finite()
    }
}

/// Compute one [`IndicatorSample`] per close.
pub fn compute_indicators(closes: &[f64], periods: &IndicatorPeriods) -> Vec<IndicatorSample> {
    let fast = Ema::new(periods.fast).compute(closes);
    let slow = Ema::new(periods.slow).compute(closes);
    let mid = Sma::new(periods.mid).compute(closes);

    fast.into_iter()
        .zip(slow)
        .zip(mid)
        .map(|((ema_fast, ema_slow), sma_mid)| IndicatorSample {
            ema_fast,
            ema_slow,
            sma_mid,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_periods_warmup_is_slow_period() {
        let periods = IndicatorPeriods::default();
        assert!(periods.validate().is_ok());
        assert_eq!(periods.warmup(), 21);
    }

    #[test]
    fn zero_period_rejected() {
        let periods = IndicatorPeriods {
            mid: 0,
            ..Default::default()
        };
        assert!(matches!(
            periods.validate(),
            Err(ConfigError::InvalidPeriod { name: "mid", .. })
        ));
    }

    #[test]
    fn warmup_nan_round_trips_through_json() {
        let sample = IndicatorSample {
            ema_fast: 1.5,
            ema_slow: 2.5,
            sma_mid: f64::NAN,
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"ema_fast":1.5,"ema_slow":2.5,"sma_mid":null}"#);
        let back: IndicatorSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ema_fast, 1.5);
        assert!(back.sma_mid.is_nan());
    }

    #[test]
    fn fast_must_be_below_slow() {
        let periods = IndicatorPeriods {
            fast: 21,
            slow: 9,
            mid: 20,
        };
        assert!(periods.validate().is_err());
    }

    #[test]
    fn samples_align_with_closes() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let samples = compute_indicators(&closes, &IndicatorPeriods::default());
        assert_eq!(samples.len(), 30);
        assert!(samples[0].ema_fast.is_finite());
        assert!(samples[18].sma_mid.is_nan());
        assert!(samples[19].is_finite());
    }

    #[test]
    fn spread_is_none_during_mid_warmup() {
        let closes = vec![100.0; 25];
        let samples = compute_indicators(&closes, &IndicatorPeriods::default());
        assert_eq!(samples[5].spread(CrossPair::FastMid), None);
        assert_eq!(samples[5].spread(CrossPair::FastSlow), Some(0.0));
        assert_eq!(samples[24].spread(CrossPair::FastMid), Some(0.0));
    }
}
