//! Per-variable bounds carrying a decision level.
//!
//! Every bound remembers the decision-stack depth at which it became
//! active. Bounds asserted before the main loop carry level 0. When two
//! bounds contradict, the maximum of their levels is the backjump target
//! for nonchronological backtracking.

use crate::float;

/// One side of a variable's interval: possibly infinite, with a value and
/// the decision level that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableBound {
    finite: bool,
    value: f64,
    level: u32,
}

impl VariableBound {
    /// An infinite (absent) bound.
    #[must_use]
    pub fn infinite() -> Self {
        Self {
            finite: false,
            value: 0.0,
            level: 0,
        }
    }

    /// A finite level-0 bound.
    #[must_use]
    pub fn at(value: f64) -> Self {
        Self {
            finite: true,
            value,
            level: 0,
        }
    }

    /// Make the bound finite with the given value. The level is unchanged.
    pub fn set(&mut self, value: f64) {
        self.finite = true;
        self.value = value;
    }

    /// Set the decision level.
    pub fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    /// Is the bound finite?
    #[must_use]
    pub fn finite(&self) -> bool {
        self.finite
    }

    /// The bound value. Only meaningful when [`finite`](Self::finite).
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The decision level at which this bound became active.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for VariableBound {
    fn default() -> Self {
        Self::infinite()
    }
}

/// Check `lb <= ub` for a pair of bounds. Returns the maximum of the two
/// levels when the invariant is violated; infinite bounds never conflict.
#[must_use]
pub fn violation_level(lower: &VariableBound, upper: &VariableBound) -> Option<u32> {
    if !lower.finite() || !upper.finite() {
        return None;
    }

    if float::lte(lower.value(), upper.value()) {
        None
    } else {
        Some(lower.level().max(upper.level()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_by_default() {
        let bound = VariableBound::default();
        assert!(!bound.finite());
        assert_eq!(bound.level(), 0);
    }

    #[test]
    fn test_set_makes_finite() {
        let mut bound = VariableBound::infinite();
        bound.set(3.5);
        bound.set_level(2);
        assert!(bound.finite());
        assert_eq!(bound.value(), 3.5);
        assert_eq!(bound.level(), 2);
    }

    #[test]
    fn test_violation_level() {
        let mut lower = VariableBound::at(5.0);
        lower.set_level(1);
        let mut upper = VariableBound::at(3.0);
        upper.set_level(4);
        assert_eq!(violation_level(&lower, &upper), Some(4));

        let upper_ok = VariableBound::at(5.0);
        assert_eq!(violation_level(&lower, &upper_ok), None);

        let infinite = VariableBound::infinite();
        assert_eq!(violation_level(&lower, &infinite), None);
    }
}
