//! Interval propagation over tableau rows.
//!
//! Every row `Σ c_j·x_j − x_b = 0` can be solved for any one of its
//! variables; summing bound contributions of the others yields an interval
//! for it. The decision level of a derived bound is the maximum level among
//! the contributing bounds. A learned non-negative lower bound on a ReLU
//! variable merges the pair and changes the tableau, which restarts the
//! fixpoint iteration.

use crate::solver::Reluplex;
use relux_core::{float, Result, SolverError, Var};
use tracing::{debug, trace};

impl Reluplex {
    pub(crate) fn count_vars_with_infinite_bounds(&mut self) {
        self.vars_with_infinite_bounds = (0..self.num_variables)
            .filter(|&var| {
                !self.upper_bounds[var].finite() || !self.lower_bounds[var].finite()
            })
            .count();
    }

    /// Derive finite bounds for every variable. Each row may contain at
    /// most one variable with an infinite bound; its interval follows from
    /// the finite bounds of the rest.
    pub(crate) fn make_all_bounds_finite(&mut self) -> Result<()> {
        self.count_vars_with_infinite_bounds();
        debug!(
            infinite = self.vars_with_infinite_bounds,
            "making all bounds finite"
        );

        let mut basics: Vec<Var> = self.basic_variables.iter().copied().collect();
        basics.sort_unstable();
        for basic in basics {
            if self.basic_variables.contains(&basic) {
                self.make_bounds_finite_on_row(basic)?;
            }
        }

        self.count_vars_with_infinite_bounds();
        if self.vars_with_infinite_bounds != 0 {
            return Err(SolverError::VarsWithInfiniteBounds(
                self.vars_with_infinite_bounds,
            ));
        }
        Ok(())
    }

    fn make_bounds_finite_on_row(&mut self, basic: Var) -> Result<()> {
        let entries = self.tableau.row_entries(basic);

        let mut tightening: Option<(Var, f64)> = None;
        for &(column, value) in &entries {
            if !self.upper_bounds[column].finite() || !self.lower_bounds[column].finite() {
                if tightening.is_some() {
                    return Err(SolverError::MultipleInfiniteVarsOnRow(basic));
                }
                tightening = Some((column, value));
            }
        }

        // Rows whose variables are all bounded (e.g. user-supplied output
        // bounds) need nothing.
        let Some((tightening_var, tightening_value)) = tightening else {
            return Ok(());
        };

        let scale = -1.0 / tightening_value;
        let mut max = 0.0;
        let mut min = 0.0;

        for &(column, value) in &entries {
            if column == tightening_var {
                continue;
            }

            let coefficient = value * scale;
            if float::is_positive(coefficient) {
                max += self.upper_bounds[column].value() * coefficient;
                min += self.lower_bounds[column].value() * coefficient;
            } else {
                min += self.upper_bounds[column].value() * coefficient;
                max += self.lower_bounds[column].value() * coefficient;
            }
        }

        if !self.upper_bounds[tightening_var].finite()
            || float::lt(max, self.upper_bounds[tightening_var].value())
        {
            self.update_upper_bound(tightening_var, max, 0)?;
        }

        if !self.lower_bounds[tightening_var].finite()
            || float::gt(min, self.lower_bounds[tightening_var].value())
        {
            self.update_lower_bound(tightening_var, min, 0)?;
        }

        self.compute_one_status(tightening_var);
        if !self.basic_variables.contains(&tightening_var) && self.out_of_bounds(tightening_var) {
            let delta = self.lower_bounds[tightening_var].value() - self.assignment[tightening_var];
            self.update(tightening_var, delta, false);
        }

        Ok(())
    }

    /// Pivot out and erase every initially basic variable that is fixed at
    /// zero. Eliminated variables never reappear in active computations.
    pub(crate) fn eliminate_aux_variables(&mut self) -> Result<()> {
        trace!("eliminating auxiliary variables");
        self.compute_all_statuses();

        let mut initial: Vec<Var> = self.basic_variables.iter().copied().collect();
        initial.sort_unstable();

        for aux in initial {
            self.eliminate_if_possible(aux)?;
        }

        trace!(count = self.eliminated.len(), "auxiliary elimination done");
        Ok(())
    }

    fn eliminate_if_possible(&mut self, var: Var) -> Result<()> {
        if self.relu_pairs.is_relu(var) {
            return Err(SolverError::Encoding(format!(
                "relu variable {} marked as auxiliary",
                self.name_of(var)
            )));
        }

        let increase = self.too_low(var);
        let delta = if increase {
            self.lower_bounds[var].value() - self.assignment[var]
        } else {
            self.upper_bounds[var].value() - self.assignment[var]
        };

        let Some(candidate) = self.find_pivot_candidate(var, increase, false) else {
            trace!(var = %self.name_of(var), "no pivot candidate; leaving in basis");
            return Ok(());
        };

        self.pivot(candidate, var)?;
        self.update(var, delta, false);

        if !self.fixed_at_zero(var) {
            trace!(var = %self.name_of(var), "not fixed at zero; keeping");
            return Ok(());
        }

        trace!(var = %self.name_of(var), "fixed at zero; eliminating");
        self.tableau.erase_column(var);
        self.eliminated.insert(var);
        self.stats.eliminated_vars += 1;

        Ok(())
    }

    pub(crate) fn fixed_at_zero(&self, var: Var) -> bool {
        self.var_status[var] == relux_core::VariableStatus::Fixed
            && float::is_zero(self.upper_bounds[var].value())
    }

    /// Propagate bounds through every row, in a single pass or to
    /// fixpoint depending on the configuration. A merge restarts the
    /// fixpoint iteration because it rewrites the tableau under us.
    pub fn tighten_all_bounds(&mut self) -> Result<()> {
        trace!("tighten_all_bounds starting");
        let learned_before = self.stats.bounds_tightened;

        if !self.config.full_tighten_all_bounds {
            let mut basics: Vec<Var> = self.basic_variables.iter().copied().collect();
            basics.sort_unstable();
            for basic in basics {
                if self.basic_variables.contains(&basic) {
                    self.tighten_bounds_on_row(basic)?;
                }
            }
        } else {
            loop {
                let mut restart = false;

                let mut basics: Vec<Var> = self.basic_variables.iter().copied().collect();
                basics.sort_unstable();
                for basic in basics {
                    if !self.basic_variables.contains(&basic) {
                        continue;
                    }
                    if self.tighten_bounds_on_row(basic)? {
                        restart = true;
                        break;
                    }
                }

                if !restart {
                    break;
                }
            }
        }

        trace!(
            learned = self.stats.bounds_tightened - learned_before,
            "tighten_all_bounds done"
        );
        Ok(())
    }

    /// Derive interval bounds for every variable of one row. Returns true
    /// when a merge changed the tableau and iteration must restart.
    pub(crate) fn tighten_bounds_on_row(&mut self, basic: Var) -> Result<bool> {
        let entries = self.tableau.row_entries(basic);

        for &(tightening_var, tightening_value) in &entries {
            let scale = -1.0 / tightening_value;

            let mut max = 0.0;
            let mut min = 0.0;
            let mut max_level = 0;
            let mut min_level = 0;

            for &(column, value) in &entries {
                if column == tightening_var {
                    continue;
                }

                let coefficient = value * scale;
                if float::is_positive(coefficient) {
                    min += self.lower_bounds[column].value() * coefficient;
                    max += self.upper_bounds[column].value() * coefficient;

                    min_level = min_level.max(self.lower_bounds[column].level());
                    max_level = max_level.max(self.upper_bounds[column].level());
                } else {
                    min += self.upper_bounds[column].value() * coefficient;
                    max += self.lower_bounds[column].value() * coefficient;

                    max_level = max_level.max(self.lower_bounds[column].level());
                    min_level = min_level.max(self.upper_bounds[column].level());
                }
            }

            if float::lt(max, self.upper_bounds[tightening_var].value()) {
                self.stats.bounds_tightened += 1;
                self.update_upper_bound(tightening_var, max, max_level)?;
            }

            if float::gt(min, self.lower_bounds[tightening_var].value()) {
                self.stats.bounds_tightened += 1;
                if self.update_lower_bound(tightening_var, min, min_level)? {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}
