//! Ratchet invariant: a trailing stop may tighten, never loosen.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

/// Stop level that only moves in the position's favour.
///
/// - Long: the level can only rise (max of current and proposed)
/// - Short: the level can only fall (min of current and proposed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatchetState {
    current_level: Option<f64>,
    side: Side,
}

impl RatchetState {
    pub fn new(side: Side) -> Self {
        Self {
            current_level: None,
            side,
        }
    }

    pub fn with_initial_level(side: Side, initial_level: f64) -> Self {
        Self {
            current_level: Some(initial_level),
            side,
        }
    }

    /// Apply a proposed level and return the ratcheted one.
    ///
    /// # Example
    /// ```
    /// use tricross_core::domain::Side;
    /// use tricross_core::position_management::RatchetState;
    ///
    /// let mut ratchet = RatchetState::with_initial_level(Side::Long, 95.0);
    /// assert_eq!(ratchet.apply(100.0), 100.0);
    /// // A pullback proposes a looser stop; the level holds.
    /// assert_eq!(ratchet.apply(90.0), 100.0);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        let level = match (self.current_level, self.side) {
            (None, _) => proposed,
            (Some(current), Side::Long) => current.max(proposed),
            (Some(current), Side::Short) => current.min(proposed),
        };
        self.current_level = Some(level);
        level
    }

    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }

    pub fn side(&self) -> Side {
        self.side
    }
}
