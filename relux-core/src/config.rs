//! Solver configuration.
//!
//! The numerical tolerances here are not independent: `oob_epsilon` must be
//! coarser than the default comparison epsilon or non-basic variables
//! oscillate at their bounds, and `almost_broken_margin` should not exceed
//! `oob_epsilon` or pairs get dissolved that the status computation still
//! considers healthy. The defaults below are the combination the solver has
//! been validated with; treat them as a set when tuning.

/// Tunable parameters for the decision procedure.
#[derive(Debug, Clone)]
pub struct Config {
    /// Baseline comparison tolerance, used for zero-snapping assignment
    /// values and dropping tableau cells.
    pub epsilon: f64,

    /// Tolerance for variable-status computation and bounds compliance.
    /// Must stay coarser than `epsilon`.
    pub oob_epsilon: f64,

    /// Minimum absolute pivot coefficient considered numerically safe.
    /// Pivots below it are taken only as a last resort and logged.
    pub instability_epsilon: f64,

    /// A ReLU pair whose F upper bound (or negated B lower bound) lies in
    /// `(0, margin]` is "almost broken"; with
    /// [`eliminate_almost_broken_relus`](Self::eliminate_almost_broken_relus)
    /// the bound is snapped to zero and the pair dissolved.
    pub almost_broken_margin: f64,

    /// Tolerance when reconciling an oracle assignment with the tableau row
    /// equations.
    pub oracle_agreement_epsilon: f64,

    /// Maximum tolerated discrepancy between the preprocessed rows and the
    /// current assignment before a restoration is forced.
    pub max_degradation: f64,

    /// Repair attempts on a single pair before the SMT core case-splits.
    pub broken_relu_split_threshold: u32,

    /// Per-partner cap on ReLU adjustments inside one oracle run; prevents
    /// flip cycling.
    pub relu_flip_cap: u32,

    /// Consecutive oracle failures tolerated before giving up entirely.
    pub max_oracle_failures: u32,

    /// Iteration cap for one oracle invocation.
    pub oracle_iteration_limit: u64,

    /// Allocate ReLU slack rows for the oracle (helps it keep `f >= b`).
    pub use_slack_variables: bool,

    /// Snap almost-broken pairs to dissolved instead of splitting on them
    /// later. Off by default; sound only up to `almost_broken_margin`.
    pub eliminate_almost_broken_relus: bool,

    /// Periodically measure degradation and restore when it exceeds
    /// [`max_degradation`](Self::max_degradation).
    pub use_degradation_checking: bool,

    /// Iterate bound tightening to fixpoint instead of a single pass.
    pub full_tighten_all_bounds: bool,

    /// Import only the basis from a successful oracle run and re-pivot
    /// locally, rather than copying the oracle's whole dictionary.
    pub oracle_extract_just_basis: bool,

    /// Backjump to the violation level rather than popping one level.
    pub use_conflict_analysis: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            epsilon: 1e-10,
            oob_epsilon: 1e-3,
            instability_epsilon: 1e-4,
            almost_broken_margin: 1e-3,
            oracle_agreement_epsilon: 1e-3,
            max_degradation: 1e-6,
            broken_relu_split_threshold: 5,
            relu_flip_cap: 5,
            max_oracle_failures: 10,
            oracle_iteration_limit: 100_000,
            use_slack_variables: true,
            eliminate_almost_broken_relus: false,
            use_degradation_checking: false,
            full_tighten_all_bounds: true,
            oracle_extract_just_basis: true,
            use_conflict_analysis: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerances_are_layered() {
        let config = Config::default();
        assert!(config.epsilon < config.instability_epsilon);
        assert!(config.instability_epsilon < config.oob_epsilon);
        assert!(config.almost_broken_margin <= config.oob_epsilon);
    }
}
