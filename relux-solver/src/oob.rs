//! Out-of-bounds handling through the LP oracle.
//!
//! When basic variables sit outside their bounds, the solver translates
//! its tableau into a feasibility problem: one row per basic variable,
//! plus one slack row `s = f - b` per active ReLU pair (which keeps the
//! oracle from wandering below `f >= b`); one column per non-basic,
//! non-eliminated, non-merged-B variable. While the oracle runs, its row
//! reports are turned into learned interval bounds keyed by variable, and
//! its bound flips on ReLU variables drag the partner along. Afterwards
//! the solution is imported: the new basis is re-established by local
//! pivots (or the whole dictionary copied), the assignment clipped into
//! bounds, and basics recomputed from their rows.

use crate::lp::simplex::BoundedSimplex;
use crate::lp::{BoundSide, LpColumn, LpHooks, LpOracle, LpOutcome, LpProblem, LpRow, LpStateView};
use crate::solver::Reluplex;
use relux_core::bounds::VariableBound;
use relux_core::{float, Result, SolverError, Var, VariableStatus};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, warn};

/// Tolerance the oracle uses to consider a row within its bounds. Much
/// finer than the solver's `oob_epsilon`, so imported solutions pass the
/// bounds check with slack to spare.
const ORACLE_FEASIBILITY_EPSILON: f64 = 1e-9;

struct OracleAdapter<'a> {
    solver: &'a mut Reluplex,
}

impl LpHooks for OracleAdapter<'_> {
    fn row_bound_hook(&mut self, leaving: Var, entering: Var, row: &[(Var, f64)]) -> Result<()> {
        self.solver.store_oracle_bound_on_row(row, leaving)?;

        // The same row, solved for the entering variable.
        let Some(&(_, entering_coefficient)) = row.iter().find(|&&(var, _)| var == entering)
        else {
            return Ok(());
        };
        if float::is_zero(entering_coefficient) {
            return Ok(());
        }

        let scale = -1.0 / entering_coefficient;
        let scaled: SmallVec<[(Var, f64); 8]> = row
            .iter()
            .map(|&(var, coefficient)| {
                if var == entering {
                    (var, -1.0)
                } else {
                    (var, coefficient * scale)
                }
            })
            .collect();

        self.solver.store_oracle_bound_on_row(&scaled, entering)
    }

    fn iteration_count(&mut self, count: u64) {
        self.solver.stats.oracle_iterations += count;
    }

    fn relu_adjustment(&mut self, non_basic: Var, view: &dyn LpStateView) -> Option<Var> {
        let solver = &mut *self.solver;
        solver.stats.relu_adjust_invoked += 1;

        if !solver.active_relu_variable(non_basic) {
            return None;
        }
        let partner = solver.relu_pairs.partner(non_basic).ok()?;
        if !view.is_non_basic(partner) {
            return None;
        }

        let own_side = view.side(non_basic)?;
        let partner_side = view.side(partner)?;
        if own_side == partner_side {
            return None;
        }

        let count = solver.relu_flip_counts.entry(partner).or_insert(0);
        *count += 1;
        if *count > solver.config.relu_flip_cap {
            solver.stats.relu_adjust_suppressed += 1;
            return None;
        }

        solver.stats.relu_adjust_applied += 1;
        Some(partner)
    }
}

impl Reluplex {
    /// Refresh slack-row bounds for every active pair: `s = f - b` lies in
    /// `[0, ub(f) - lb(b)]`. The lower bound is a level-0 fact; the upper
    /// bound inherits the levels of the bounds it came from.
    pub(crate) fn compute_slack_bounds(&mut self) {
        self.slack_lower.clear();
        self.slack_upper.clear();
        self.active_slack_rows.clear();

        for &(b, f) in self.relu_pairs.pairs() {
            if self.dissolved.contains_key(&f) {
                continue;
            }
            let Some(&slack) = self.f_to_slack.get(&f) else {
                continue;
            };

            self.active_slack_rows.insert(slack);
            self.slack_lower.insert(slack, VariableBound::at(0.0));

            let gap = self.upper_bounds[f].value() - self.lower_bounds[b].value();
            let mut upper = VariableBound::at(gap);
            upper.set_level(
                self.upper_bounds[f]
                    .level()
                    .max(self.lower_bounds[b].level()),
            );
            self.slack_upper.insert(slack, upper);
        }
    }

    /// `s = f - b` over column variables, substituting the row of either
    /// member that is currently basic.
    fn prepare_slack_row(&self, slack: Var) -> Vec<(Var, f64)> {
        let b = self.slack_to_b[&slack];
        let f = self.slack_to_f[&slack];

        let mut row: FxHashMap<Var, f64> = FxHashMap::default();

        if !self.basic_variables.contains(&f) {
            *row.entry(f).or_insert(0.0) += 1.0;
        } else {
            for (column, weight) in self.tableau.row_entries(f) {
                if column != f {
                    *row.entry(column).or_insert(0.0) += weight;
                }
            }
        }

        if !self.basic_variables.contains(&b) {
            *row.entry(b).or_insert(0.0) += -1.0;
        } else {
            for (column, weight) in self.tableau.row_entries(b) {
                if column != b {
                    *row.entry(column).or_insert(0.0) += -weight;
                }
            }
        }

        let mut entries: Vec<(Var, f64)> = row
            .into_iter()
            .filter(|&(_, weight)| !float::is_zero(weight))
            .collect();
        entries.sort_by_key(|&(var, _)| var);
        entries
    }

    fn build_lp_problem(&self) -> LpProblem {
        let mut rows = Vec::with_capacity(self.basic_variables.len() + self.active_slack_rows.len());

        let mut basics: Vec<Var> = self.basic_variables.iter().copied().collect();
        basics.sort_unstable();
        for basic in basics {
            let entries: Vec<(Var, f64)> = self
                .tableau
                .row_entries(basic)
                .into_iter()
                .filter(|&(column, _)| column != basic)
                .collect();

            rows.push(LpRow {
                var: basic,
                lower: self.lower_bounds[basic].value(),
                upper: self.upper_bounds[basic].value(),
                entries,
            });
        }

        let mut slacks: Vec<Var> = self.active_slack_rows.iter().copied().collect();
        slacks.sort_unstable();
        for slack in slacks {
            rows.push(LpRow {
                var: slack,
                lower: self.slack_lower[&slack].value(),
                upper: self.slack_upper[&slack].value(),
                entries: self.prepare_slack_row(slack),
            });
        }

        let mut columns = Vec::new();
        for var in 0..self.num_variables {
            if self.basic_variables.contains(&var)
                || self.eliminated.contains(&var)
                || self.is_dissolved_b_variable(var)
            {
                continue;
            }

            let side = match self.var_status[var] {
                VariableStatus::AtUb => BoundSide::Upper,
                // A ReLU variable floating between its bounds starts at the
                // bound matching its activation phase.
                VariableStatus::Between => {
                    if float::is_positive(self.assignment[var]) {
                        BoundSide::Upper
                    } else {
                        BoundSide::Lower
                    }
                }
                _ => BoundSide::Lower,
            };

            columns.push(LpColumn {
                var,
                lower: self.lower_bounds[var].value(),
                upper: self.upper_bounds[var].value(),
                side,
            });
        }

        LpProblem {
            rows,
            columns,
            iteration_limit: self.config.oracle_iteration_limit,
            feasibility_epsilon: ORACLE_FEASIBILITY_EPSILON,
        }
    }

    /// Drive out-of-bounds basics back into bounds through the oracle.
    pub(crate) fn fix_out_of_bounds(&mut self) -> Result<LpOutcome> {
        self.stats.oracle_invocations += 1;

        self.oracle_stored_lower.clear();
        self.oracle_stored_upper.clear();
        self.active_slack_rows.clear();
        self.slack_lower.clear();
        self.slack_upper.clear();
        self.relu_flip_counts.clear();

        if self.config.use_slack_variables {
            if self.temporarily_no_slacks {
                debug!("slack rows temporarily disabled after repeated failures");
                self.temporarily_no_slacks = false;
            } else {
                self.compute_slack_bounds();
            }
        }

        let problem = self.build_lp_problem();
        let mut oracle = BoundedSimplex::new(&problem);
        let outcome = oracle.solve(&mut OracleAdapter { solver: self })?;

        match outcome {
            LpOutcome::Solution => {
                debug!("oracle found a feasible point; importing");
                self.stats.oracle_solutions += 1;
                self.import_oracle_solution(&oracle)?;

                if !self.all_vars_within_bounds() {
                    // Rare: the basis re-established locally disagrees with
                    // the oracle numerically.
                    warn!("oracle solution import left basics out of bounds");
                    self.stats.oracle_incorrect_assignments += 1;
                    self.register_oracle_failure()?;
                    return Ok(LpOutcome::Failed);
                }

                self.previous_outcome = LpOutcome::Solution;
                self.consecutive_failures = 0;
                Ok(LpOutcome::Solution)
            }
            LpOutcome::NoSolution => {
                debug!("oracle proved the branch infeasible");
                self.stats.oracle_no_solutions += 1;
                self.previous_outcome = LpOutcome::NoSolution;
                self.consecutive_failures = 0;
                Ok(LpOutcome::NoSolution)
            }
            LpOutcome::Failed => {
                warn!("oracle failed; restoring from backup");
                self.stats.oracle_failures += 1;
                self.register_oracle_failure()?;
                Ok(LpOutcome::Failed)
            }
        }
    }

    fn register_oracle_failure(&mut self) -> Result<()> {
        // Soft restoration keeps the current basis while the failure
        // streak is short; afterwards rebuild from scratch.
        self.restore_from_backup(self.consecutive_failures < 5)?;

        if self.previous_outcome == LpOutcome::Failed {
            // Two failures in a row: restoration alone did not help, so
            // drop the slack rows for the next attempt.
            self.temporarily_no_slacks = true;
        }

        self.previous_outcome = LpOutcome::Failed;
        self.consecutive_failures += 1;
        Ok(())
    }

    fn import_oracle_solution(&mut self, oracle: &BoundedSimplex) -> Result<()> {
        if self.config.oracle_extract_just_basis {
            let new_basics: FxHashSet<Var> = oracle
                .basics()
                .into_iter()
                .filter(|&var| var < self.num_variables)
                .collect();

            let should_be: FxHashSet<Var> = new_basics
                .difference(&self.basic_variables)
                .copied()
                .collect();
            let shouldnt_be: FxHashSet<Var> = self
                .basic_variables
                .difference(&new_basics)
                .copied()
                .collect();

            self.adjust_basic_variables(&should_be, shouldnt_be, false)?;
        } else {
            if !self.active_slack_rows.is_empty() {
                return Err(SolverError::Encoding(
                    "full dictionary extraction requires slack rows to be disabled".into(),
                ));
            }

            self.tableau.clear();
            self.basic_variables.clear();

            for var in 0..self.num_variables {
                if self.eliminated.contains(&var) || self.is_dissolved_b_variable(var) {
                    continue;
                }
                if let Some(row) = oracle.dictionary_row(var) {
                    self.basic_variables.insert(var);
                    for (column, coefficient) in row {
                        self.tableau.add_entry(var, column, coefficient);
                    }
                    self.tableau.add_entry(var, var, -1.0);
                }
            }
        }

        // Import the assignment. Non-basics are clipped into their bounds
        // to absorb oracle imprecision.
        for (var, value) in oracle.assignment() {
            if var >= self.num_variables {
                continue;
            }

            let mut value = value;
            if !self.basic_variables.contains(&var) {
                if float::gt(self.lower_bounds[var].value(), value) {
                    value = self.lower_bounds[var].value();
                }
                if float::lt(self.upper_bounds[var].value(), value) {
                    value = self.upper_bounds[var].value();
                }
                if value != 0.0 && float::is_zero(value) {
                    value = 0.0;
                }
            }
            self.assignment[var] = value;
        }

        self.reconcile_imported_rows();
        self.calculate_basic_values();
        self.compute_all_statuses();

        let (broken, _broken_non_basic) = self.count_broken_relu_pairs();
        debug!(broken, "broken pairs after oracle import");

        Ok(())
    }

    /// Compare the imported basic values against their row equations
    /// before recomputation; disagreements beyond tolerance are logged.
    fn reconcile_imported_rows(&self) {
        for &basic in &self.basic_variables {
            let mut computed = 0.0;
            for (column, coefficient) in self.tableau.row_entries(basic) {
                if column != basic {
                    computed += self.assignment[column] * coefficient;
                }
            }

            if !float::are_equal_eps(
                self.assignment[basic],
                computed,
                self.config.oracle_agreement_epsilon,
            ) {
                warn!(
                    basic = %self.name_of(basic),
                    imported = self.assignment[basic],
                    computed,
                    "oracle assignment disagrees with row equation"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Oracle-derived bound learning
    // ------------------------------------------------------------------

    fn oracle_lower_of(&self, var: Var) -> (f64, u32) {
        if self.active_slack_rows.contains(&var) {
            let bound = &self.slack_lower[&var];
            return (bound.value(), bound.level());
        }
        if let Some(bound) = self.oracle_stored_lower.get(&var) {
            return (bound.value(), bound.level());
        }
        let bound = &self.lower_bounds[var];
        (bound.value(), bound.level())
    }

    fn oracle_upper_of(&self, var: Var) -> (f64, u32) {
        if self.active_slack_rows.contains(&var) {
            let bound = &self.slack_upper[&var];
            return (bound.value(), bound.level());
        }
        if let Some(bound) = self.oracle_stored_upper.get(&var) {
            return (bound.value(), bound.level());
        }
        let bound = &self.upper_bounds[var];
        (bound.value(), bound.level())
    }

    /// Derive interval bounds for `basic` from one oracle row and stash
    /// any improvement. A derived inversion conflicts at the maximum of
    /// the contributing levels.
    pub(crate) fn store_oracle_bound_on_row(
        &mut self,
        row: &[(Var, f64)],
        basic: Var,
    ) -> Result<()> {
        self.stats.oracle_bound_reports += 1;
        let basic_is_slack = self.active_slack_rows.contains(&basic);
        if basic_is_slack {
            self.stats.oracle_bound_reports_on_slacks += 1;
        }

        let mut max = 0.0;
        let mut min = 0.0;
        let mut max_level = 0;
        let mut min_level = 0;

        for &(var, weight) in row {
            if var == basic {
                continue;
            }

            let (lower, lower_level) = self.oracle_lower_of(var);
            let (upper, upper_level) = self.oracle_upper_of(var);

            if float::is_positive(weight) {
                max += upper * weight;
                min += lower * weight;
                min_level = min_level.max(lower_level);
                max_level = max_level.max(upper_level);
            } else if float::is_negative(weight) {
                min += upper * weight;
                max += lower * weight;
                max_level = max_level.max(lower_level);
                min_level = min_level.max(upper_level);
            }
        }

        let (mut current_lower, mut current_lower_level) = self.oracle_lower_of(basic);
        let (mut current_upper, mut current_upper_level) = self.oracle_upper_of(basic);

        let mut updated = false;
        if float::lt(max, current_upper) {
            let mut bound = VariableBound::at(max);
            bound.set_level(max_level);
            if basic_is_slack {
                self.slack_upper.insert(basic, bound);
                self.stats.oracle_derived_bounds_on_slacks += 1;
            } else {
                self.oracle_stored_upper.insert(basic, bound);
            }
            self.stats.oracle_derived_bounds += 1;

            updated = true;
            current_upper = max;
            current_upper_level = max_level;
        }

        if float::gt(min, current_lower) {
            let mut bound = VariableBound::at(min);
            bound.set_level(min_level);
            if basic_is_slack {
                self.slack_lower.insert(basic, bound);
                self.stats.oracle_derived_bounds_on_slacks += 1;
            } else {
                self.oracle_stored_lower.insert(basic, bound);
            }
            self.stats.oracle_derived_bounds += 1;

            updated = true;
            current_lower = min;
            current_lower_level = min_level;
        }

        if updated && float::gt(current_lower, current_upper) {
            return Err(SolverError::InvariantViolation {
                level: current_lower_level.max(current_upper_level),
            });
        }

        Ok(())
    }

    pub(crate) fn learned_oracle_bounds(&self) -> bool {
        !self.oracle_stored_lower.is_empty() || !self.oracle_stored_upper.is_empty()
    }

    /// Apply the bounds stashed during the oracle run through the ordinary
    /// update contract. Improvements are re-checked per bound: earlier
    /// updates in this very loop may have moved things via ReLU cascades.
    pub(crate) fn perform_oracle_bound_tightening(&mut self) -> Result<()> {
        debug!("applying oracle-derived bounds");

        let mut lower: Vec<(Var, VariableBound)> = self.oracle_stored_lower.drain().collect();
        lower.sort_by_key(|&(var, _)| var);
        let mut upper: Vec<(Var, VariableBound)> = self.oracle_stored_upper.drain().collect();
        upper.sort_by_key(|&(var, _)| var);

        for (var, bound) in lower {
            if float::gt(bound.value(), self.lower_bounds[var].value()) {
                self.update_lower_bound(var, bound.value(), bound.level())?;
            }
        }
        for (var, bound) in upper {
            if float::lt(bound.value(), self.upper_bounds[var].value()) {
                self.update_upper_bound(var, bound.value(), bound.level())?;
            }
        }

        Ok(())
    }
}
