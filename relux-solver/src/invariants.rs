//! Structural invariant checks.
//!
//! These hold whenever the solver is between main-loop iterations; the
//! test suites call them after every interesting operation.

use crate::relu::DissolutionKind;
use crate::solver::Reluplex;
use relux_core::float;

impl Reluplex {
    /// Verify the structural invariants, returning a description of the
    /// first violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        // Every basic variable's column is exactly its -1 self-cell, and
        // no basic appears in another basic's row.
        for &basic in &self.basic_variables {
            if self.tableau.column_size(basic) != 1 {
                return Err(format!(
                    "basic {} has column size {}",
                    self.name_of(basic),
                    self.tableau.column_size(basic)
                ));
            }
            let column = self.tableau.column_entries(basic);
            if column[0].0 != basic || float::are_disequal(column[0].1, -1.0) {
                return Err(format!(
                    "basic {} lacks its -1 self-cell",
                    self.name_of(basic)
                ));
            }

            for (column, _) in self.tableau.row_entries(basic) {
                if column != basic && self.basic_variables.contains(&column) {
                    return Err(format!(
                        "basic {} appears in the row of basic {}",
                        self.name_of(column),
                        self.name_of(basic)
                    ));
                }
            }
        }

        // Only basic variables may be out of bounds.
        for var in 0..self.num_variables {
            if self.out_of_bounds(var) && !self.basic_variables.contains(&var) {
                return Err(format!(
                    "non-basic {} is out of bounds: value = {}, range = [{}, {}]",
                    self.name_of(var),
                    self.assignment[var],
                    self.lower_bounds[var].value(),
                    self.upper_bounds[var].value()
                ));
            }
        }

        // Every row equation holds under the current assignment.
        for &basic in &self.basic_variables {
            let mut computed = 0.0;
            for (column, coefficient) in self.tableau.row_entries(basic) {
                if column != basic {
                    computed += self.assignment[column] * coefficient;
                }
            }
            if !float::are_equal_eps(
                computed,
                self.assignment[basic],
                self.config.oracle_agreement_epsilon,
            ) {
                return Err(format!(
                    "row of basic {} computes {} but assignment is {}",
                    self.name_of(basic),
                    computed,
                    self.assignment[basic]
                ));
            }
        }

        // Dissolved pairs have the committed shape.
        for (&f, &kind) in &self.dissolved {
            let Ok(b) = self.relu_pairs.partner(f) else {
                return Err(format!("dissolved variable {} has no partner", f));
            };

            match kind {
                DissolutionKind::Split => {
                    if !float::is_zero(self.upper_bounds[f].value())
                        || !float::is_zero(self.lower_bounds[f].value())
                    {
                        return Err(format!(
                            "after a split, {} is not fixed at zero",
                            self.name_of(f)
                        ));
                    }
                    if float::is_positive(self.upper_bounds[b].value()) {
                        return Err(format!(
                            "after a split, ub({}) is positive",
                            self.name_of(b)
                        ));
                    }
                }
                DissolutionKind::Merge => {
                    if self.tableau.column_size(b) != 0 {
                        return Err(format!(
                            "after a merge, column of {} is not empty",
                            self.name_of(b)
                        ));
                    }
                    if float::is_negative(self.lower_bounds[f].value()) {
                        return Err(format!(
                            "after a merge, lb({}) is negative",
                            self.name_of(f)
                        ));
                    }
                }
            }
        }

        // Finite bounds are ordered.
        for var in 0..self.num_variables {
            if self.lower_bounds[var].finite()
                && self.upper_bounds[var].finite()
                && float::gt(
                    self.lower_bounds[var].value(),
                    self.upper_bounds[var].value(),
                )
            {
                return Err(format!(
                    "bounds of {} inverted: [{}, {}]",
                    self.name_of(var),
                    self.lower_bounds[var].value(),
                    self.upper_bounds[var].value()
                ));
            }
        }

        Ok(())
    }
}
