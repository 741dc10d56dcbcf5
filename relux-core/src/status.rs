//! Variable status relative to its bounds.
//!
//! The simplex engine drives all of its decisions off this six-way
//! classification, computed with the coarse out-of-bounds tolerance rather
//! than the default comparison epsilon.

use crate::bounds::VariableBound;
use crate::float;

/// Position of a variable's current value relative to its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableStatus {
    /// Strictly above the upper bound. Out of bounds.
    AboveUb,
    /// At the upper bound.
    AtUb,
    /// Strictly between the bounds (or unbounded on the relevant side).
    Between,
    /// Lower and upper bound coincide and the value sits on them.
    Fixed,
    /// At the lower bound.
    AtLb,
    /// Strictly below the lower bound. Out of bounds.
    BelowLb,
}

impl VariableStatus {
    /// Is this status out of bounds?
    #[must_use]
    pub fn out_of_bounds(self) -> bool {
        matches!(self, VariableStatus::AboveUb | VariableStatus::BelowLb)
    }

    /// Can a variable with this status decrease without leaving its bounds?
    #[must_use]
    pub fn can_decrease(self) -> bool {
        matches!(
            self,
            VariableStatus::Between | VariableStatus::AtUb | VariableStatus::AboveUb
        )
    }

    /// Can a variable with this status increase without leaving its bounds?
    #[must_use]
    pub fn can_increase(self) -> bool {
        matches!(
            self,
            VariableStatus::Between | VariableStatus::AtLb | VariableStatus::BelowLb
        )
    }
}

/// Classify `value` against the given bounds using `oob_epsilon`.
#[must_use]
pub fn compute_status(
    value: f64,
    lower: &VariableBound,
    upper: &VariableBound,
    oob_epsilon: f64,
) -> VariableStatus {
    match (lower.finite(), upper.finite()) {
        (true, true) => {
            let lb = lower.value();
            let ub = upper.value();

            if float::gt_eps(value, ub, oob_epsilon) {
                VariableStatus::AboveUb
            } else if float::are_equal_eps(value, ub, oob_epsilon) {
                if float::are_equal(lb, ub) {
                    VariableStatus::Fixed
                } else {
                    VariableStatus::AtUb
                }
            } else if float::gt_eps(value, lb, oob_epsilon) {
                VariableStatus::Between
            } else if float::are_equal_eps(value, lb, oob_epsilon) {
                VariableStatus::AtLb
            } else {
                VariableStatus::BelowLb
            }
        }
        (true, false) => {
            let lb = lower.value();

            if float::gt_eps(value, lb, oob_epsilon) {
                VariableStatus::Between
            } else if float::are_equal_eps(value, lb, oob_epsilon) {
                VariableStatus::AtLb
            } else {
                VariableStatus::BelowLb
            }
        }
        (false, true) => {
            let ub = upper.value();

            if float::gt_eps(value, ub, oob_epsilon) {
                VariableStatus::AboveUb
            } else if float::are_equal_eps(value, ub, oob_epsilon) {
                VariableStatus::AtUb
            } else {
                VariableStatus::Between
            }
        }
        (false, false) => VariableStatus::Between,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OOB: f64 = 1e-3;

    #[test]
    fn test_both_finite() {
        let lb = VariableBound::at(0.0);
        let ub = VariableBound::at(1.0);

        assert_eq!(compute_status(1.5, &lb, &ub, OOB), VariableStatus::AboveUb);
        assert_eq!(compute_status(1.0, &lb, &ub, OOB), VariableStatus::AtUb);
        assert_eq!(compute_status(0.5, &lb, &ub, OOB), VariableStatus::Between);
        assert_eq!(compute_status(0.0, &lb, &ub, OOB), VariableStatus::AtLb);
        assert_eq!(compute_status(-0.5, &lb, &ub, OOB), VariableStatus::BelowLb);
    }

    #[test]
    fn test_fixed() {
        let lb = VariableBound::at(2.0);
        let ub = VariableBound::at(2.0);
        assert_eq!(compute_status(2.0, &lb, &ub, OOB), VariableStatus::Fixed);
    }

    #[test]
    fn test_half_infinite() {
        let lb = VariableBound::at(0.0);
        let none = VariableBound::infinite();

        assert_eq!(
            compute_status(100.0, &lb, &none, OOB),
            VariableStatus::Between
        );
        assert_eq!(
            compute_status(-1.0, &lb, &none, OOB),
            VariableStatus::BelowLb
        );

        let ub = VariableBound::at(1.0);
        assert_eq!(
            compute_status(-100.0, &none, &ub, OOB),
            VariableStatus::Between
        );
        assert_eq!(compute_status(2.0, &none, &ub, OOB), VariableStatus::AboveUb);
    }

    #[test]
    fn test_tolerance_is_coarse() {
        let lb = VariableBound::at(0.0);
        let ub = VariableBound::at(1.0);

        // Within the out-of-bounds tolerance counts as at-bound.
        assert_eq!(compute_status(1.0005, &lb, &ub, OOB), VariableStatus::AtUb);
    }
}
