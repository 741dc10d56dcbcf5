//! The Reluplex decision procedure.
//!
//! One [`Reluplex`] instance owns every piece of solver state: the sparse
//! tableau, leveled bounds, the assignment, the ReLU registry with its
//! dissolution map, the decision stack, and the statistics. The entry
//! points are the construction API (`set_lower_bound`, `initialize_cell`,
//! `mark_basic`, `set_relu_pair`, ...), then [`Reluplex::initialize`] and
//! [`Reluplex::solve`].
//!
//! The main loop alternates between two kinds of work: while any basic
//! variable is out of bounds, the LP oracle is invoked to drive it back
//! (with bound-learning callbacks); otherwise a persistently broken ReLU
//! pair is repaired or, past the repair threshold, case-split by the SMT
//! core. Bound inversions surface as
//! [`SolverError::InvariantViolation`] values carrying a decision level,
//! which the loop turns into backjumps.

use crate::lp::LpOutcome;
use crate::relu::{DissolutionKind, ReluPairs};
use crate::restore::Preprocessed;
use crate::smt::SmtState;
use crate::stats::Stats;
use crate::tableau::SparseTableau;
use relux_core::bounds::{self, VariableBound};
use relux_core::status::{compute_status, VariableStatus};
use relux_core::{float, Config, Result, SolverError, Var};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Statistics are logged every this many progress calls.
const STATS_LOG_INTERVAL: u64 = 500;

/// Terminal status of a solve run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Satisfiable; the witness is readable via
    /// [`Reluplex::get_assignment`].
    Sat,
    /// Unsatisfiable.
    Unsat,
    /// The solver hit a fatal error.
    Error,
    /// Cancelled before a verdict (quit flag).
    NotDone,
}

impl SolveStatus {
    /// Short uppercase form used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SolveStatus::Sat => "SAT",
            SolveStatus::Unsat => "UNSAT",
            SolveStatus::Error => "ERROR",
            SolveStatus::NotDone => "TIMEOUT",
        }
    }
}

/// What one main-loop step accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// State advanced; keep iterating.
    Advanced,
    /// The current branch is infeasible; backjump to this level.
    Conflict(u32),
}

/// The solver instance.
pub struct Reluplex {
    pub(crate) num_variables: usize,
    pub(crate) query_name: String,
    pub(crate) config: Config,
    pub(crate) status: SolveStatus,
    pub(crate) was_initialized: bool,

    pub(crate) tableau: SparseTableau,
    pub(crate) lower_bounds: Vec<VariableBound>,
    pub(crate) upper_bounds: Vec<VariableBound>,
    pub(crate) assignment: Vec<f64>,
    pub(crate) var_status: Vec<VariableStatus>,
    pub(crate) basic_variables: FxHashSet<Var>,
    pub(crate) eliminated: FxHashSet<Var>,

    pub(crate) relu_pairs: ReluPairs,
    pub(crate) dissolved: FxHashMap<Var, DissolutionKind>,
    pub(crate) names: FxHashMap<Var, String>,

    pub(crate) smt: SmtState,
    pub(crate) stats: Stats,
    pub(crate) preprocessed: Option<Preprocessed>,
    quit: Arc<AtomicBool>,

    // ReLU slack bookkeeping for the LP oracle (row-only slack mode).
    pub(crate) f_to_slack: FxHashMap<Var, Var>,
    pub(crate) slack_to_f: FxHashMap<Var, Var>,
    pub(crate) slack_to_b: FxHashMap<Var, Var>,
    pub(crate) active_slack_rows: FxHashSet<Var>,
    pub(crate) slack_lower: FxHashMap<Var, VariableBound>,
    pub(crate) slack_upper: FxHashMap<Var, VariableBound>,

    // Bounds learned through oracle callbacks, applied after a solve.
    pub(crate) oracle_stored_lower: FxHashMap<Var, VariableBound>,
    pub(crate) oracle_stored_upper: FxHashMap<Var, VariableBound>,
    pub(crate) relu_flip_counts: FxHashMap<Var, u32>,

    pub(crate) consecutive_failures: u32,
    pub(crate) previous_outcome: LpOutcome,
    pub(crate) temporarily_no_slacks: bool,
    pub(crate) vars_with_infinite_bounds: usize,
}

impl Reluplex {
    /// A solver over `num_variables` variables with the default
    /// configuration.
    #[must_use]
    pub fn new(num_variables: usize) -> Self {
        Self::with_config(num_variables, Config::default())
    }

    /// A solver with an explicit configuration.
    #[must_use]
    pub fn with_config(num_variables: usize, config: Config) -> Self {
        let epsilon = config.epsilon;
        Self {
            num_variables,
            query_name: String::new(),
            config,
            status: SolveStatus::NotDone,
            was_initialized: false,
            tableau: SparseTableau::new(num_variables, epsilon),
            lower_bounds: vec![VariableBound::infinite(); num_variables],
            upper_bounds: vec![VariableBound::infinite(); num_variables],
            assignment: vec![0.0; num_variables],
            var_status: vec![VariableStatus::Between; num_variables],
            basic_variables: FxHashSet::default(),
            eliminated: FxHashSet::default(),
            relu_pairs: ReluPairs::new(),
            dissolved: FxHashMap::default(),
            names: FxHashMap::default(),
            smt: SmtState::new(),
            stats: Stats::default(),
            preprocessed: None,
            quit: Arc::new(AtomicBool::new(false)),
            f_to_slack: FxHashMap::default(),
            slack_to_f: FxHashMap::default(),
            slack_to_b: FxHashMap::default(),
            active_slack_rows: FxHashSet::default(),
            slack_lower: FxHashMap::default(),
            slack_upper: FxHashMap::default(),
            oracle_stored_lower: FxHashMap::default(),
            oracle_stored_upper: FxHashMap::default(),
            relu_flip_counts: FxHashMap::default(),
            consecutive_failures: 0,
            previous_outcome: LpOutcome::Solution,
            temporarily_no_slacks: false,
            vars_with_infinite_bounds: 0,
        }
    }

    // ------------------------------------------------------------------
    // Construction API
    // ------------------------------------------------------------------

    /// Name used in reports and the final-statistics line.
    pub fn set_query_name(&mut self, name: impl Into<String>) {
        self.query_name = name.into();
    }

    /// The query name.
    #[must_use]
    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    /// Level-0 lower bound.
    pub fn set_lower_bound(&mut self, var: Var, bound: f64) {
        self.lower_bounds[var].set(bound);
        self.lower_bounds[var].set_level(0);
    }

    /// Level-0 upper bound.
    pub fn set_upper_bound(&mut self, var: Var, bound: f64) {
        self.upper_bounds[var].set(bound);
        self.upper_bounds[var].set_level(0);
    }

    /// Add a matrix entry during encoding.
    pub fn initialize_cell(&mut self, row: Var, column: Var, coefficient: f64) {
        self.tableau.add_entry(row, column, coefficient);
    }

    /// Declare `var` initially basic.
    pub fn mark_basic(&mut self, var: Var) {
        self.basic_variables.insert(var);
    }

    /// Register the ReLU pair `f = max(0, b)`. When slack variables are
    /// enabled, a slack row variable is allocated past the ordinary
    /// variable range for the LP oracle.
    pub fn set_relu_pair(&mut self, b: Var, f: Var) {
        self.relu_pairs.add_pair(b, f);

        if self.config.use_slack_variables {
            let slack = self.num_variables + self.f_to_slack.len();
            self.f_to_slack.insert(f, slack);
            self.slack_to_f.insert(slack, f);
            self.slack_to_b.insert(slack, b);
        }
    }

    /// Optional display name for a variable.
    pub fn set_name(&mut self, var: Var, name: impl Into<String>) {
        self.names.insert(var, name.into());
    }

    /// Display name of `var` (its index when unnamed).
    #[must_use]
    pub fn name_of(&self, var: Var) -> String {
        match self.names.get(&var) {
            Some(name) => name.clone(),
            None => var.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Number of variables.
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Current value of `var`.
    #[must_use]
    pub fn get_assignment(&self, var: Var) -> f64 {
        self.assignment[var]
    }

    /// Current lower bound of `var`, when finite.
    #[must_use]
    pub fn lower_bound(&self, var: Var) -> Option<f64> {
        let bound = &self.lower_bounds[var];
        bound.finite().then(|| bound.value())
    }

    /// Current upper bound of `var`, when finite.
    #[must_use]
    pub fn upper_bound(&self, var: Var) -> Option<f64> {
        let bound = &self.upper_bounds[var];
        bound.finite().then(|| bound.value())
    }

    /// Terminal status of the last [`solve`](Self::solve) run.
    #[must_use]
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// Solver statistics.
    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The shared cancellation flag. Setting it makes the main loop stop
    /// with [`SolveStatus::NotDone`] at its next iteration; safe to store
    /// in a signal handler.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.quit)
    }

    /// Cooperative cancel.
    pub fn quit(&self) {
        self.quit.store(true, Ordering::Relaxed);
    }

    /// Number of dissolved pairs.
    #[must_use]
    pub fn dissolved_pair_count(&self) -> usize {
        self.dissolved.len()
    }

    /// Dissolution state of the pair with F member `f`.
    #[must_use]
    pub fn dissolution_of(&self, f: Var) -> Option<DissolutionKind> {
        self.dissolved.get(&f).copied()
    }

    /// Was `var` eliminated during preprocessing?
    #[must_use]
    pub fn is_eliminated(&self, var: Var) -> bool {
        self.eliminated.contains(&var)
    }

    /// Is `var` currently basic?
    #[must_use]
    pub fn is_basic(&self, var: Var) -> bool {
        self.basic_variables.contains(&var)
    }

    /// Current decision-stack depth.
    #[must_use]
    pub fn current_depth(&self) -> u32 {
        self.smt.depth()
    }

    /// All tableau cells as sorted `(row, column, value)` triples.
    /// Intended for diagnostics and state-equality checks in tests.
    #[must_use]
    pub fn tableau_snapshot(&self) -> Vec<(Var, Var, f64)> {
        self.tableau.snapshot()
    }

    /// Number of main-loop states explored so far.
    #[must_use]
    pub fn states_explored(&self) -> u64 {
        self.stats.calls_to_progress
    }

    // ------------------------------------------------------------------
    // Status bookkeeping
    // ------------------------------------------------------------------

    pub(crate) fn compute_one_status(&mut self, var: Var) {
        self.var_status[var] = compute_status(
            self.assignment[var],
            &self.lower_bounds[var],
            &self.upper_bounds[var],
            self.config.oob_epsilon,
        );
    }

    pub(crate) fn compute_all_statuses(&mut self) {
        for var in 0..self.num_variables {
            self.compute_one_status(var);
        }
    }

    pub(crate) fn too_low(&self, var: Var) -> bool {
        self.var_status[var] == VariableStatus::BelowLb
    }

    pub(crate) fn too_high(&self, var: Var) -> bool {
        self.var_status[var] == VariableStatus::AboveUb
    }

    pub(crate) fn out_of_bounds(&self, var: Var) -> bool {
        self.var_status[var].out_of_bounds()
    }

    /// Only basic variables may leave their bounds.
    pub(crate) fn all_vars_within_bounds(&self) -> bool {
        self.basic_variables.iter().all(|&var| !self.out_of_bounds(var))
    }

    pub(crate) fn find_out_of_bounds(&self) -> Vec<Var> {
        let mut result: Vec<Var> = self
            .basic_variables
            .iter()
            .copied()
            .filter(|&var| self.out_of_bounds(var))
            .collect();
        result.sort_unstable();
        result
    }

    /// May `delta` be added to non-basic `var` without leaving its bounds?
    pub fn can_add_to_non_basic(&self, var: Var, delta: f64) -> Result<bool> {
        if float::is_zero_eps(delta, self.config.epsilon) {
            return Ok(true);
        }

        let oob = self.config.oob_epsilon;
        let status = self.var_status[var];
        if status.out_of_bounds() {
            return Err(SolverError::IllegalPivot(format!(
                "non-basic variable {} is out of bounds",
                self.name_of(var)
            )));
        }
        if status == VariableStatus::Fixed {
            return Ok(false);
        }

        if float::is_positive(delta) {
            if status == VariableStatus::AtUb && float::gt_eps(delta, oob, oob) {
                return Ok(false);
            }
            if !self.upper_bounds[var].finite() {
                return Ok(true);
            }
            Ok(float::lte_eps(
                self.assignment[var] + delta,
                self.upper_bounds[var].value(),
                oob,
            ))
        } else {
            if status == VariableStatus::AtLb && float::lt_eps(delta, -oob, oob) {
                return Ok(false);
            }
            if !self.lower_bounds[var].finite() {
                return Ok(true);
            }
            Ok(float::gte_eps(
                self.assignment[var] + delta,
                self.lower_bounds[var].value(),
                oob,
            ))
        }
    }

    // ------------------------------------------------------------------
    // ReLU queries
    // ------------------------------------------------------------------

    /// Is the pair `(b, f)` broken under the current assignment?
    pub(crate) fn relu_pair_is_broken(&self, b: Var, f: Var) -> bool {
        let b_val = self.assignment[b];
        let f_val = self.assignment[f];

        (float::is_zero(f_val) && float::is_positive(b_val))
            || (float::is_positive(f_val) && float::are_disequal(f_val, b_val))
    }

    /// Does `var` belong to a pair that has not been dissolved?
    pub(crate) fn active_relu_variable(&self, var: Var) -> bool {
        if !self.relu_pairs.is_relu(var) {
            return false;
        }
        match self.relu_pairs.to_f(var) {
            Ok(f) => !self.dissolved.contains_key(&f),
            Err(_) => false,
        }
    }

    /// Is `var` the B member of a merged pair (empty column, identified
    /// with its F partner)?
    pub(crate) fn is_dissolved_b_variable(&self, var: Var) -> bool {
        if !self.relu_pairs.is_b(var) {
            return false;
        }
        let Ok(f) = self.relu_pairs.partner(var) else {
            return false;
        };
        self.dissolved.get(&f) == Some(&DissolutionKind::Merge)
    }

    pub(crate) fn all_relus_hold(&self) -> bool {
        self.relu_pairs.pairs().iter().all(|&(b, f)| {
            self.dissolved.contains_key(&f) || !self.relu_pair_is_broken(b, f)
        })
    }

    pub(crate) fn find_broken_relus(&self) -> Vec<Var> {
        let mut result = Vec::new();
        for &(b, f) in self.relu_pairs.pairs() {
            if !self.dissolved.contains_key(&f) && self.relu_pair_is_broken(b, f) {
                result.push(b);
                result.push(f);
            }
        }
        result
    }

    pub(crate) fn count_broken_relu_pairs(&self) -> (u64, u64) {
        let mut broken = 0;
        let mut broken_non_basic = 0;
        for &(b, f) in self.relu_pairs.pairs() {
            if !self.dissolved.contains_key(&f) && self.relu_pair_is_broken(b, f) {
                broken += 1;
                if !self.basic_variables.contains(&b) && !self.basic_variables.contains(&f) {
                    broken_non_basic += 1;
                }
            }
        }
        (broken, broken_non_basic)
    }

    // ------------------------------------------------------------------
    // Simplex operations
    // ------------------------------------------------------------------

    fn snap_zero(&mut self, var: Var) {
        if float::is_zero_eps(self.assignment[var], self.config.epsilon) {
            self.assignment[var] = 0.0;
        }
    }

    /// Add `delta` to `var` and propagate through every row containing it.
    /// Unless `ignore_relu`, a broken pair with a non-basic partner is
    /// repaired by cascading into the partner.
    ///
    /// Callers are responsible for feasibility: an update must never push
    /// a non-basic variable out of its bounds (see
    /// [`can_add_to_non_basic`](Self::can_add_to_non_basic)).
    pub fn update(&mut self, var: Var, delta: f64, ignore_relu: bool) {
        if float::is_zero_eps(delta, self.config.epsilon) {
            return;
        }

        trace!(var = %self.name_of(var), delta, "update");

        self.assignment[var] += delta;
        self.snap_zero(var);
        self.compute_one_status(var);

        for (row, coefficient) in self.tableau.column_entries(var) {
            if row != var {
                self.assignment[row] += delta * coefficient;
                self.snap_zero(row);
                self.compute_one_status(row);
            }
        }

        if ignore_relu || !self.relu_pairs.is_relu(var) {
            return;
        }
        let Ok(partner) = self.relu_pairs.partner(var) else {
            return;
        };

        // If the partner is basic the broken pair is tolerated; it is the
        // simplex engine's job to fix basics.
        if self.basic_variables.contains(&partner) {
            return;
        }

        let var_is_f = self.relu_pairs.is_f(var);
        let (b, f) = if var_is_f { (partner, var) } else { (var, partner) };

        if self.dissolved.contains_key(&f) || !self.relu_pair_is_broken(b, f) {
            return;
        }

        if var_is_f {
            let delta = self.assignment[f] - self.assignment[b];
            self.update(b, delta, true);
        } else if float::is_negative(self.assignment[b]) {
            let delta = -self.assignment[f];
            self.update(f, delta, true);
        } else {
            let delta = self.assignment[b] - self.assignment[f];
            self.update(f, delta, true);
        }
    }

    /// Swap `non_basic` into the basis in place of `basic`.
    pub(crate) fn pivot(&mut self, non_basic: Var, basic: Var) -> Result<()> {
        self.stats.num_pivots += 1;

        trace!(
            basic = %self.name_of(basic),
            non_basic = %self.name_of(non_basic),
            "pivot"
        );

        if self.basic_variables.contains(&non_basic) {
            return Err(SolverError::IllegalPivot(format!(
                "entering variable {} is already basic",
                self.name_of(non_basic)
            )));
        }
        if !self.basic_variables.contains(&basic) {
            return Err(SolverError::IllegalPivot(format!(
                "leaving variable {} is not basic",
                self.name_of(basic)
            )));
        }

        self.basic_variables.remove(&basic);
        self.basic_variables.insert(non_basic);

        let cell = self.tableau.get(basic, non_basic);
        if float::lt(cell.abs(), self.config.instability_epsilon) {
            warn!(
                weight = cell.abs(),
                "numerically unstable pivot coefficient"
            );
        }

        // Rescale the leaving row so it defines the entering variable, then
        // clear the entering variable from every other row.
        self.tableau
            .add_scaled_row(basic, -1.0 / cell, non_basic, Some((non_basic, -1.0)));
        self.tableau.erase_row(basic);

        for (row, value) in self.tableau.column_entries(non_basic) {
            if row != non_basic {
                self.tableau
                    .add_scaled_row(non_basic, value, row, Some((non_basic, 0.0)));
            }
        }

        Ok(())
    }

    /// Recompute the value of every basic variable from its row.
    pub(crate) fn calculate_basic_values(&mut self) {
        let basics: Vec<Var> = self.basic_variables.iter().copied().collect();
        for basic in basics {
            self.calculate_basic_value(basic);
        }
    }

    pub(crate) fn calculate_basic_value(&mut self, basic: Var) {
        let mut result = 0.0;
        for (column, coefficient) in self.tableau.row_entries(basic) {
            if column != basic {
                result += self.assignment[column] * coefficient;
            }
        }
        if float::is_zero_eps(result, self.config.epsilon) {
            result = 0.0;
        }
        self.assignment[basic] = result;
        self.compute_one_status(basic);
    }

    // ------------------------------------------------------------------
    // Broken-ReLU repair
    // ------------------------------------------------------------------

    /// Repair the broken pair owning `to_fix`, preferring to move B.
    /// Returns false when neither member admits a feasible move.
    pub(crate) fn fix_broken_relu(&mut self, to_fix: Var) -> Result<bool> {
        let is_f = self.relu_pairs.is_f(to_fix);
        let partner = self.relu_pairs.partner(to_fix)?;
        let (b, f) = if is_f { (partner, to_fix) } else { (to_fix, partner) };

        self.stats.broken_relus_fixed += 1;
        debug!(var = %self.name_of(to_fix), "attempting broken-relu fix");

        let f_val = self.assignment[f];
        let b_val = self.assignment[b];

        let (f_delta, b_delta) = if float::is_positive(f_val) && !float::is_positive(b_val) {
            (-f_val, f_val - b_val)
        } else if float::is_positive(f_val) && float::is_positive(b_val) {
            (b_val - f_val, f_val - b_val)
        } else if float::is_zero(f_val) && float::is_positive(b_val) {
            (b_val, -b_val)
        } else {
            // Not actually broken under current tolerances.
            return Ok(true);
        };

        let increase_b = float::is_positive(b_delta);
        let increase_f = float::is_positive(f_delta);

        // B first; F only when B admits no move.
        if !self.fix_broken_relu_variable(b, increase_b, b_delta, false)? {
            return self.fix_broken_relu_variable(f, increase_f, f_delta, true);
        }
        Ok(true)
    }

    fn fix_broken_relu_variable(
        &mut self,
        var: Var,
        increase: bool,
        delta: f64,
        is_f: bool,
    ) -> Result<bool> {
        if is_f {
            self.stats.broken_relu_fix_f += 1;
        } else {
            self.stats.broken_relu_fix_b += 1;
        }

        if !self.basic_variables.contains(&var) {
            self.stats.broken_relu_fix_by_update += 1;
            trace!(var = %self.name_of(var), delta, "relu fix by update");
            self.update(var, delta, true);
            Ok(true)
        } else {
            self.stats.broken_relu_fix_by_pivot += 1;

            let Some(candidate) = self.find_pivot_candidate(var, increase, true) else {
                return Ok(false);
            };

            trace!(
                var = %self.name_of(var),
                delta,
                candidate = %self.name_of(candidate),
                "relu fix by pivot-and-update"
            );

            self.pivot(candidate, var)?;
            self.update(var, delta, true);
            Ok(true)
        }
    }

    /// Find a non-basic in `variable`'s row whose movement can change
    /// `variable` in the requested direction. Prefers numerically safe
    /// coefficients; falls back to the least-evil one.
    pub(crate) fn find_pivot_candidate(
        &self,
        variable: Var,
        increase: bool,
        ensure_stability: bool,
    ) -> Option<Var> {
        let mut least_evil: Option<(Var, f64)> = None;

        for (column, coefficient) in self.tableau.row_entries(variable) {
            if column == variable {
                continue;
            }

            let positive = float::is_positive(coefficient);
            let status = self.var_status[column];
            let fits = (increase && positive && status.can_increase())
                || (increase && !positive && status.can_decrease())
                || (!increase && positive && status.can_decrease())
                || (!increase && !positive && status.can_increase());
            if !fits {
                continue;
            }

            let weight = coefficient.abs();
            if !ensure_stability || float::gte(weight, self.config.instability_epsilon) {
                return Some(column);
            }

            match least_evil {
                Some((_, best)) if !float::gt(weight, best) => {}
                _ => least_evil = Some((column, weight)),
            }
        }

        if let Some((candidate, weight)) = least_evil {
            debug!(weight, "forced to pick a numerically poor pivot candidate");
            return Some(candidate);
        }
        None
    }

    // ------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------

    /// Run preprocessing: enforce level-0 bounds on non-basics and derive
    /// finite bounds for every variable.
    pub fn initialize(&mut self) -> Result<()> {
        self.initial_update()?;
        self.make_all_bounds_finite()?;
        self.was_initialized = true;
        Ok(())
    }

    fn initial_update(&mut self) -> Result<()> {
        self.compute_all_statuses();

        for var in 0..self.num_variables {
            if let Some(level) =
                bounds::violation_level(&self.lower_bounds[var], &self.upper_bounds[var])
            {
                warn!(
                    var = %self.name_of(var),
                    lower = self.lower_bounds[var].value(),
                    upper = self.upper_bounds[var].value(),
                    "bound invariant violated during initial update"
                );
                return Err(SolverError::InvariantViolation { level });
            }

            if !self.basic_variables.contains(&var) && self.out_of_bounds(var) {
                let delta = if self.too_low(var) {
                    self.lower_bounds[var].value() - self.assignment[var]
                } else {
                    self.upper_bounds[var].value() - self.assignment[var]
                };
                self.update(var, delta, false);
            }
        }

        Ok(())
    }

    /// Decide the query. Always returns a status; fatal errors are mapped
    /// to [`SolveStatus::Error`].
    pub fn solve(&mut self) -> SolveStatus {
        self.status = match self.solve_inner() {
            Ok(status) => status,
            Err(SolverError::StackEmpty) => SolveStatus::Unsat,
            Err(SolverError::InvariantViolation { .. }) => SolveStatus::Unsat,
            Err(error) => {
                warn!(%error, "solve aborted");
                SolveStatus::Error
            }
        };
        self.status
    }

    fn solve_inner(&mut self) -> Result<SolveStatus> {
        if !self.was_initialized {
            self.initialize()?;
        }

        self.count_vars_with_infinite_bounds();
        self.eliminate_aux_variables()?;
        self.store_preprocessed();

        info!("initialization steps over; entering the main loop");

        while !self.quit.load(Ordering::Relaxed) {
            self.compute_all_statuses();

            if self.all_vars_within_bounds() && self.all_relus_hold() {
                self.stats.log_summary();
                return Ok(SolveStatus::Sat);
            }

            match self.progress()? {
                Progress::Advanced => {}
                Progress::Conflict(level) => {
                    if self.config.use_conflict_analysis {
                        self.pop_to_level(level)?;
                    } else {
                        self.pop()?;
                    }
                    let depth = self.current_depth();
                    self.stats.note_second_phase(depth);
                }
            }
        }

        Ok(SolveStatus::NotDone)
    }

    fn progress(&mut self) -> Result<Progress> {
        match self.progress_inner() {
            Ok(progress) => Ok(progress),
            Err(SolverError::InvariantViolation { level }) => {
                debug!(level, "bound invariant violated; backjumping");
                Ok(Progress::Conflict(level))
            }
            Err(error) => Err(error),
        }
    }

    fn progress_inner(&mut self) -> Result<Progress> {
        self.stats.calls_to_progress += 1;

        if self.config.use_degradation_checking && self.stats.calls_to_progress % 50 == 0 {
            let degradation = self.check_degradation();
            if degradation > self.config.max_degradation {
                self.restore_from_backup(true)?;
                return Ok(Progress::Advanced);
            }
        }

        if self.stats.calls_to_progress % STATS_LOG_INTERVAL == 0 {
            self.stats.log_summary();
        }

        let out_of_bounds = self.find_out_of_bounds();
        if !out_of_bounds.is_empty() {
            debug!(count = out_of_bounds.len(), "out-of-bounds basics present");

            let outcome = self.fix_out_of_bounds()?;

            if self.consecutive_failures > self.config.max_oracle_failures {
                return Err(SolverError::ConsecutiveOracleFailures {
                    count: self.consecutive_failures,
                });
            }

            match outcome {
                LpOutcome::NoSolution => return Ok(Progress::Conflict(self.current_depth())),
                // Failed means state was restored from the backup; that is
                // this iteration's progress.
                LpOutcome::Failed => return Ok(Progress::Advanced),
                LpOutcome::Solution => {}
            }

            if self.all_relus_hold() {
                return Ok(Progress::Advanced);
            }

            // Feasible but with broken pairs left: see whether bounds
            // learned inside the oracle dissolve any of them.
            if self.learned_oracle_bounds() {
                let dissolved_before = self.dissolved.len();
                self.perform_oracle_bound_tightening()?;
                self.tighten_all_bounds()?;
                let dissolved_after = self.dissolved.len();
                if dissolved_after > dissolved_before {
                    self.stats.relus_dissolved_by_oracle_bounds +=
                        (dissolved_after - dissolved_before) as u64;
                }
            }

            return Ok(Progress::Advanced);
        }

        self.consecutive_failures = 0;
        self.previous_outcome = LpOutcome::Solution;

        debug!("no out-of-bounds variables; examining broken relus");

        let broken = self.find_broken_relus();
        let Some(&first) = broken.first() else {
            return Ok(Progress::Advanced);
        };
        self.stats.total_broken_relus += (broken.len() / 2) as u64;

        let f = self.relu_pairs.to_f(first)?;
        if self.notify_broken_relu(f)? {
            // Splitting or merging is a form of progress.
            return Ok(Progress::Advanced);
        }

        if self.fix_broken_relu(f)? {
            Ok(Progress::Advanced)
        } else {
            Ok(Progress::Conflict(self.current_depth()))
        }
    }
}
