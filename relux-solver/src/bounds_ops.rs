//! Bound updates and ReLU dissolution.
//!
//! Bounds on ReLU variables never move independently: a positive upper
//! bound tightens both members of the pair, a non-positive upper bound
//! commits the pair to its inactive branch (split), and a non-negative
//! lower bound commits it to the active branch (merge, which identifies B
//! with F in the tableau). Every update that produces `lb > ub` returns
//! [`SolverError::InvariantViolation`] carrying the highest decision level
//! among the conflicting facts.

use crate::relu::DissolutionKind;
use crate::solver::Reluplex;
use relux_core::bounds;
use relux_core::{float, Result, SolverError, Var};
use tracing::{debug, trace};

impl Reluplex {
    pub(crate) fn bound_invariant(&self, var: Var) -> Result<()> {
        match bounds::violation_level(&self.lower_bounds[var], &self.upper_bounds[var]) {
            Some(level) => Err(SolverError::InvariantViolation { level }),
            None => Ok(()),
        }
    }

    pub(crate) fn mark_dissolved(&mut self, f: Var, kind: DissolutionKind) {
        debug!(f = %self.name_of(f), ?kind, "marking relu pair dissolved");
        debug_assert!(!self.dissolved.contains_key(&f));
        self.dissolved.insert(f, kind);
    }

    /// Tighten the upper bound of `var` to `bound` at decision level
    /// `level`, honoring the ReLU contract: positive bounds tighten both
    /// members of an active pair, non-positive bounds dissolve it as a
    /// split. An inversion reports the conflict level.
    pub fn update_upper_bound(&mut self, var: Var, bound: f64, level: u32) -> Result<()> {
        let relu = self.relu_pairs.is_relu(var);
        let (b, f, partner) = if relu {
            let partner = self.relu_pairs.partner(var)?;
            let f = if self.relu_pairs.is_f(var) { var } else { partner };
            let b = if self.relu_pairs.is_b(var) { var } else { partner };
            (b, f, partner)
        } else {
            (0, 0, 0)
        };

        if !relu || self.dissolved.contains_key(&f) {
            self.upper_bounds[var].set(bound);
            self.upper_bounds[var].set_level(level);
            self.bound_invariant(var)?;

            self.compute_one_status(var);
            // Basic variables may sit out of bounds; non-basics must move.
            if !self.basic_variables.contains(&var) && self.out_of_bounds(var) {
                self.update(var, bound - self.assignment[var], false);
            }
            return Ok(());
        }

        let mut bound = bound;
        if float::is_positive(bound) && float::lte(bound, self.config.almost_broken_margin) {
            self.stats.almost_broken_relus += 1;
            if self.config.eliminate_almost_broken_relus {
                self.stats.almost_broken_relus_fixed += 1;
                bound = 0.0;
            }
        }

        if float::is_positive(bound) {
            // Active pair, positive bound: tighten both members.
            self.upper_bounds[var].set(bound);
            self.upper_bounds[var].set_level(level);
            self.upper_bounds[partner].set(bound);
            self.upper_bounds[partner].set_level(level);

            self.bound_invariant(var)?;
            self.bound_invariant(partner)?;

            self.compute_one_status(var);
            self.compute_one_status(partner);

            if !self.basic_variables.contains(&var) && self.out_of_bounds(var) {
                self.update(var, bound - self.assignment[var], true);
            }
            if !self.basic_variables.contains(&partner) && self.out_of_bounds(partner) {
                self.update(partner, bound - self.assignment[partner], true);
            }
            return Ok(());
        }

        // Non-positive bound dissolves the pair.
        if float::is_negative(bound) && self.relu_pairs.is_f(var) {
            // F is bounded below by zero, so this must conflict.
            self.upper_bounds[var].set(bound);
            self.upper_bounds[var].set_level(level);

            self.bound_invariant(var)?;
            return Err(SolverError::UpperLowerInvariantViolated(var));
        }

        self.mark_dissolved(f, DissolutionKind::Split);

        self.upper_bounds[f].set(0.0);
        self.upper_bounds[f].set_level(level);
        self.upper_bounds[b].set(bound);
        self.upper_bounds[b].set_level(level);

        self.bound_invariant(b)?;
        self.bound_invariant(f)?;

        self.compute_one_status(b);
        self.compute_one_status(f);

        if !self.basic_variables.contains(&b) && self.out_of_bounds(b) {
            self.update(b, bound - self.assignment[b], true);
        }
        if !self.basic_variables.contains(&f) && self.out_of_bounds(f) {
            let delta = -self.assignment[f];
            self.update(f, delta, true);
        }

        Ok(())
    }

    /// Tighten the lower bound of `var` to `bound` at decision level
    /// `level`; a non-negative bound on an active pair merges it. Returns
    /// whether the tableau changed (a merge took place), which forces
    /// full-tightening passes to restart.
    pub fn update_lower_bound(&mut self, var: Var, bound: f64, level: u32) -> Result<bool> {
        let relu = self.relu_pairs.is_relu(var);
        let (f, partner) = if relu {
            let partner = self.relu_pairs.partner(var)?;
            let f = if self.relu_pairs.is_f(var) { var } else { partner };
            (f, partner)
        } else {
            (0, 0)
        };

        if !relu || self.dissolved.contains_key(&f) {
            self.lower_bounds[var].set(bound);
            self.lower_bounds[var].set_level(level);
            self.bound_invariant(var)?;

            self.compute_one_status(var);
            if !self.basic_variables.contains(&var) && self.out_of_bounds(var) {
                self.update(var, bound - self.assignment[var], false);
            }
            return Ok(false);
        }

        let mut bound = bound;
        if float::is_negative(bound) && float::gte(bound, -self.config.almost_broken_margin) {
            self.stats.almost_broken_relus += 1;
            if self.config.eliminate_almost_broken_relus {
                self.stats.almost_broken_relus_fixed += 1;
                bound = 0.0;
            }
        }

        if !float::is_negative(bound) {
            // Non-negative lower bound commits the pair to its active
            // branch: tighten both members, then unify.
            trace!(var = %self.name_of(var), bound, "non-negative lower bound on active pair");

            self.lower_bounds[var].set(bound);
            self.lower_bounds[var].set_level(level);
            self.lower_bounds[partner].set(bound);
            self.lower_bounds[partner].set_level(level);

            self.bound_invariant(var)?;
            self.bound_invariant(partner)?;

            self.compute_one_status(var);
            self.compute_one_status(partner);

            if !self.basic_variables.contains(&var) && self.out_of_bounds(var) {
                self.update(var, bound - self.assignment[var], true);
            }
            if !self.basic_variables.contains(&partner) && self.out_of_bounds(partner) {
                self.update(partner, bound - self.assignment[partner], true);
            }

            return self.unify_relu_pair(f);
        }

        // Negative lower bound: applies to B only, F is untouched.
        self.lower_bounds[var].set(bound);
        self.lower_bounds[var].set_level(level);
        self.bound_invariant(var)?;

        self.compute_one_status(var);
        if !self.basic_variables.contains(&var) && self.out_of_bounds(var) {
            self.update(var, bound - self.assignment[var], true);
        }

        Ok(false)
    }

    /// Identify the B member of pair `f` with F: make both non-basic,
    /// align their values, transfer B's column into F's, and record the
    /// merge. Returns whether the tableau changed.
    pub(crate) fn unify_relu_pair(&mut self, f: Var) -> Result<bool> {
        let b = self.relu_pairs.partner(f)?;

        trace!(f = %self.name_of(f), b = %self.name_of(b), "unifying relu pair");

        // An empty B column means the pair was already unified.
        if self.tableau.column_size(b) == 0 {
            return Ok(false);
        }

        // Making b or f non-basic can leave them momentarily out of
        // bounds; the updates below repair that.
        if self.basic_variables.contains(&b) {
            self.make_non_basic(b, f)?;
        }
        if self.basic_variables.contains(&f) {
            self.make_non_basic(f, b)?;
        }

        if self.too_low(f) {
            let delta = self.lower_bounds[f].value() - self.assignment[f];
            self.update(f, delta, true);
        } else if self.too_high(f) {
            let delta = self.upper_bounds[f].value() - self.assignment[f];
            self.update(f, delta, true);
        }

        // Bounds are equal on both members, so aligning b with f is safe.
        let delta = self.assignment[f] - self.assignment[b];
        self.update(b, delta, true);

        self.tableau.add_column_erase_source(b, f);
        self.mark_dissolved(f, DissolutionKind::Merge);

        Ok(true)
    }

    /// Pivot `basic` out of the basis through any eligible column except
    /// `forbidden_partner`, preferring numerically safe coefficients.
    pub(crate) fn make_non_basic(&mut self, basic: Var, forbidden_partner: Var) -> Result<()> {
        if !self.basic_variables.contains(&basic) {
            return Err(SolverError::IllegalPivot(format!(
                "variable {} is not basic",
                self.name_of(basic)
            )));
        }

        let mut least_evil: Option<(Var, f64)> = None;
        for (column, value) in self.tableau.row_entries(basic) {
            if column == basic || column == forbidden_partner {
                continue;
            }

            let weight = value.abs();
            if float::gte(weight, self.config.instability_epsilon) {
                return self.pivot(column, basic);
            }

            match least_evil {
                Some((_, best)) if !float::gt(weight, best) => {}
                _ => least_evil = Some((column, weight)),
            }
        }

        match least_evil {
            Some((column, _)) => self.pivot(column, basic),
            None => Err(SolverError::CannotMakeNonBasic(basic)),
        }
    }
}
