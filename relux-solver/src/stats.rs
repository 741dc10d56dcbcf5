//! Solver statistics.

use tracing::info;

/// Flat counters accumulated over a solve run. A snapshot is available via
/// [`crate::Reluplex::stats`]; a summary is logged periodically from the
/// main loop.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Main-loop progress calls.
    pub calls_to_progress: u64,
    /// Pivot operations performed by the solver (not the oracle).
    pub num_pivots: u64,

    /// Broken pairs handed to the repair procedure.
    pub broken_relus_fixed: u64,
    /// Repairs that moved the B member.
    pub broken_relu_fix_b: u64,
    /// Repairs that moved the F member.
    pub broken_relu_fix_f: u64,
    /// Repairs done by a plain update.
    pub broken_relu_fix_by_update: u64,
    /// Repairs that needed a pivot first.
    pub broken_relu_fix_by_pivot: u64,
    /// Broken pairs observed across all progress calls.
    pub total_broken_relus: u64,

    /// Almost-broken pairs encountered.
    pub almost_broken_relus: u64,
    /// Almost-broken pairs snapped to dissolved.
    pub almost_broken_relus_fixed: u64,

    /// Bounds learned by row tightening.
    pub bounds_tightened: u64,
    /// Variables eliminated during preprocessing.
    pub eliminated_vars: u64,

    /// Oracle invocations.
    pub oracle_invocations: u64,
    /// Oracle runs that found a feasible point.
    pub oracle_solutions: u64,
    /// Oracle runs that proved the branch infeasible.
    pub oracle_no_solutions: u64,
    /// Oracle runs that failed.
    pub oracle_failures: u64,
    /// Solutions whose import left basics out of bounds.
    pub oracle_incorrect_assignments: u64,
    /// Simplex iterations inside the oracle.
    pub oracle_iterations: u64,

    /// Row reports received from the oracle.
    pub oracle_bound_reports: u64,
    /// Row reports whose subject was a slack variable.
    pub oracle_bound_reports_on_slacks: u64,
    /// Bounds actually improved through oracle reports.
    pub oracle_derived_bounds: u64,
    /// Improved bounds that landed on slack variables.
    pub oracle_derived_bounds_on_slacks: u64,
    /// Pairs dissolved as a consequence of oracle-derived bounds.
    pub relus_dissolved_by_oracle_bounds: u64,

    /// ReLU-adjustment hook invocations.
    pub relu_adjust_invoked: u64,
    /// Adjustments applied.
    pub relu_adjust_applied: u64,
    /// Adjustments suppressed by the flip cap.
    pub relu_adjust_suppressed: u64,

    /// Restorations from the preprocessed backup.
    pub restorations: u64,
    /// Largest degradation measured.
    pub max_degradation: f64,

    /// Case splits pushed.
    pub stack_splits: u64,
    /// Merges pushed.
    pub stack_merges: u64,
    /// Snapshots discarded after both attempts.
    pub stack_pops: u64,
    /// Search states visited (pushes plus flips).
    pub stack_visited_states: u64,
    /// Pops forced by nonchronological backjumps.
    pub conflict_pops: u64,
    /// Current decision-stack depth.
    pub current_stack_depth: u32,
    /// Deepest stack seen.
    pub max_stack_depth: u32,
    /// Shallowest depth at which a second branch was entered.
    pub min_stack_second_phase: u32,
}

impl Stats {
    pub(crate) fn set_current_depth(&mut self, depth: u32) {
        self.current_stack_depth = depth;
        if depth > self.max_stack_depth {
            self.max_stack_depth = depth;
        }
    }

    pub(crate) fn note_second_phase(&mut self, depth: u32) {
        if depth < self.min_stack_second_phase || self.min_stack_second_phase == 0 {
            self.min_stack_second_phase = depth;
        }
    }

    /// Log a one-shot summary of the interesting counters.
    pub fn log_summary(&self) {
        info!(
            progress = self.calls_to_progress,
            pivots = self.num_pivots,
            relus_fixed = self.broken_relus_fixed,
            bounds_tightened = self.bounds_tightened,
            oracle_invocations = self.oracle_invocations,
            oracle_solutions = self.oracle_solutions,
            oracle_failures = self.oracle_failures,
            oracle_derived_bounds = self.oracle_derived_bounds,
            restorations = self.restorations,
            stack_depth = self.current_stack_depth,
            max_stack_depth = self.max_stack_depth,
            splits = self.stack_splits,
            merges = self.stack_merges,
            pops = self.stack_pops,
            visited_states = self.stack_visited_states,
            "statistics"
        );
    }
}
