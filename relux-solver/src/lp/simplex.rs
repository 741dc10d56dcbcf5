//! Embedded bounded-variable simplex.
//!
//! A phase-1 primal simplex over the dictionary representation: every basic
//! variable is defined by a row over the non-basics, non-basics sit at one
//! of their (finite) bounds, and the search repeatedly drives the
//! smallest-index out-of-bounds basic toward its violated bound. The ratio
//! test is three-way: the leaving basic reaching its bound, another basic
//! blocking en route, or the entering variable exhausting its own range -
//! the last case is a bound flip rather than a pivot, and is where ReLU
//! partner adjustments are applied. Smallest-index (Bland-style) selection
//! keeps degenerate cycling at bay; the iteration cap is the backstop.

use crate::lp::{BoundSide, LpHooks, LpOracle, LpOutcome, LpProblem, LpStateView};
use crate::tableau::SparseTableau;
use relux_core::{Result, Var};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

/// Coefficients below this magnitude are not trusted as pivot elements
/// unless nothing better exists in the row.
const PIVOT_FLOOR: f64 = 1e-9;

/// Bounded-variable phase-1 simplex solver.
pub struct BoundedSimplex {
    /// Dense index -> external variable.
    vars: Vec<Var>,
    /// External variable -> dense index.
    index_of: FxHashMap<Var, usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    value: Vec<f64>,
    is_basic: Vec<bool>,
    tableau: SparseTableau,
    iteration_limit: u64,
    feasibility_epsilon: f64,
}

struct View<'a> {
    solver: &'a BoundedSimplex,
}

impl LpStateView for View<'_> {
    fn is_non_basic(&self, var: Var) -> bool {
        self.solver
            .index_of
            .get(&var)
            .is_some_and(|&idx| !self.solver.is_basic[idx])
    }

    fn side(&self, var: Var) -> Option<BoundSide> {
        let &idx = self.solver.index_of.get(&var)?;
        if self.solver.is_basic[idx] {
            return None;
        }
        self.solver.side_of(idx)
    }
}

impl BoundedSimplex {
    /// Build the solver state from a problem description.
    #[must_use]
    pub fn new(problem: &LpProblem) -> Self {
        let mut vars: Vec<Var> = problem
            .columns
            .iter()
            .map(|c| c.var)
            .chain(problem.rows.iter().map(|r| r.var))
            .collect();
        vars.sort_unstable();

        let index_of: FxHashMap<Var, usize> =
            vars.iter().enumerate().map(|(i, &v)| (v, i)).collect();

        let size = vars.len();
        let mut solver = Self {
            vars,
            index_of,
            lower: vec![0.0; size],
            upper: vec![0.0; size],
            value: vec![0.0; size],
            is_basic: vec![false; size],
            tableau: SparseTableau::new(size, 1e-12),
            iteration_limit: problem.iteration_limit,
            feasibility_epsilon: problem.feasibility_epsilon,
        };

        for column in &problem.columns {
            let idx = solver.index_of[&column.var];
            solver.lower[idx] = column.lower;
            solver.upper[idx] = column.upper;
            solver.value[idx] = match column.side {
                BoundSide::Lower => column.lower,
                BoundSide::Upper => column.upper,
            };
        }

        for row in &problem.rows {
            let idx = solver.index_of[&row.var];
            solver.lower[idx] = row.lower;
            solver.upper[idx] = row.upper;
            solver.is_basic[idx] = true;

            solver.tableau.add_entry(idx, idx, -1.0);
            for &(col_var, coefficient) in &row.entries {
                let col_idx = solver.index_of[&col_var];
                solver.tableau.add_entry(idx, col_idx, coefficient);
            }
        }

        // Basic values follow from the non-basic starting point.
        for row in &problem.rows {
            let idx = solver.index_of[&row.var];
            solver.value[idx] = solver.row_value(idx);
        }

        solver
    }

    fn row_value(&self, basic: usize) -> f64 {
        let mut result = 0.0;
        for (column, coefficient) in self.tableau.row_entries(basic) {
            if column != basic {
                result += self.value[column] * coefficient;
            }
        }
        result
    }

    fn side_of(&self, idx: usize) -> Option<BoundSide> {
        let eps = self.feasibility_epsilon;
        if (self.value[idx] - self.lower[idx]).abs() <= eps {
            Some(BoundSide::Lower)
        } else if (self.value[idx] - self.upper[idx]).abs() <= eps {
            Some(BoundSide::Upper)
        } else {
            None
        }
    }

    fn first_out_of_bounds(&self) -> Option<usize> {
        let eps = self.feasibility_epsilon;
        (0..self.vars.len()).find(|&idx| {
            self.is_basic[idx]
                && (self.value[idx] < self.lower[idx] - eps
                    || self.value[idx] > self.upper[idx] + eps)
        })
    }

    /// Pick the entering non-basic for the violated row: the smallest-index
    /// eligible candidate, preferring coefficients above the pivot floor.
    fn select_entering(&self, leaving: usize, increase_leaving: bool) -> Option<(usize, f64, f64)> {
        let eps = self.feasibility_epsilon;
        let mut entries = self.tableau.row_entries(leaving);
        entries.sort_unstable_by_key(|&(column, _)| column);

        let mut fallback: Option<(usize, f64, f64)> = None;
        for &(column, coefficient) in &entries {
            if column == leaving {
                continue;
            }

            // Direction the entering variable must move so that the leaving
            // basic moves toward its violated bound.
            let direction = if increase_leaving == (coefficient > 0.0) {
                1.0
            } else {
                -1.0
            };

            let movable = if direction > 0.0 {
                self.value[column] < self.upper[column] - eps
            } else {
                self.value[column] > self.lower[column] + eps
            };
            if !movable {
                continue;
            }

            if coefficient.abs() >= PIVOT_FLOOR {
                return Some((column, coefficient, direction));
            }
            if fallback.is_none() && coefficient.abs() > 0.0 {
                fallback = Some((column, coefficient, direction));
            }
        }

        fallback
    }

    /// Move non-basic `entering` by `delta` and propagate through every row
    /// containing it.
    fn apply_step(&mut self, entering: usize, delta: f64) {
        self.value[entering] += delta;
        for (row, coefficient) in self.tableau.column_entries(entering) {
            if row != entering {
                self.value[row] += coefficient * delta;
            }
        }
    }

    fn pivot(&mut self, entering: usize, leaving: usize) {
        let cell = self.tableau.get(leaving, entering);
        self.tableau
            .add_scaled_row(leaving, -1.0 / cell, entering, Some((entering, -1.0)));
        self.tableau.erase_row(leaving);

        for (row, coefficient) in self.tableau.column_entries(entering) {
            if row != entering {
                self.tableau
                    .add_scaled_row(entering, coefficient, row, Some((entering, 0.0)));
            }
        }

        self.is_basic[leaving] = false;
        self.is_basic[entering] = true;
    }

    /// The row of `basic` as external `(variable, coefficient)` pairs,
    /// leading with the basic's own `-1`.
    fn external_row(&self, basic: usize) -> SmallVec<[(Var, f64); 8]> {
        let mut row: SmallVec<[(Var, f64); 8]> = SmallVec::new();
        row.push((self.vars[basic], -1.0));
        for (column, coefficient) in self.tableau.row_entries(basic) {
            if column != basic {
                row.push((self.vars[column], coefficient));
            }
        }
        row
    }

    fn flip(&mut self, idx: usize, to: BoundSide) {
        let bound = match to {
            BoundSide::Lower => self.lower[idx],
            BoundSide::Upper => self.upper[idx],
        };
        let delta = bound - self.value[idx];
        self.apply_step(idx, delta);
        self.value[idx] = bound;
    }
}

impl LpOracle for BoundedSimplex {
    fn solve(&mut self, hooks: &mut dyn LpHooks) -> Result<LpOutcome> {
        let eps = self.feasibility_epsilon;
        let mut iterations: u64 = 0;

        let outcome = loop {
            let Some(leaving) = self.first_out_of_bounds() else {
                break LpOutcome::Solution;
            };

            if iterations >= self.iteration_limit {
                trace!(iterations, "oracle iteration limit reached");
                break LpOutcome::Failed;
            }
            iterations += 1;

            let increase = self.value[leaving] < self.lower[leaving];
            let target = if increase {
                self.lower[leaving]
            } else {
                self.upper[leaving]
            };

            let Some((entering, coefficient, direction)) = self.select_entering(leaving, increase)
            else {
                break LpOutcome::NoSolution;
            };

            // Three-way ratio test.
            let step_to_target = (target - self.value[leaving]).abs() / coefficient.abs();
            let step_to_own_bound = if direction > 0.0 {
                self.upper[entering] - self.value[entering]
            } else {
                self.value[entering] - self.lower[entering]
            };

            let mut blocking: Option<(usize, f64, f64)> = None;
            for (row, row_coefficient) in self.tableau.column_entries(entering) {
                if row == entering || row == leaving {
                    continue;
                }
                // Basics already out of bounds do not block; they are fixed
                // on later iterations.
                if self.value[row] < self.lower[row] - eps || self.value[row] > self.upper[row] + eps
                {
                    continue;
                }

                let movement = row_coefficient * direction;
                let (room, bound) = if movement > 0.0 {
                    (self.upper[row] - self.value[row], self.upper[row])
                } else if movement < 0.0 {
                    (self.value[row] - self.lower[row], self.lower[row])
                } else {
                    continue;
                };

                let step = (room.max(0.0)) / movement.abs();
                let replace = match blocking {
                    None => true,
                    Some((block_row, block_step, _)) => {
                        step < block_step - eps || (step < block_step + eps && row < block_row)
                    }
                };
                if replace {
                    blocking = Some((row, step, bound));
                }
            }

            let block_step = blocking.map_or(f64::INFINITY, |(_, step, _)| step);

            if step_to_own_bound < step_to_target - eps && step_to_own_bound < block_step - eps {
                // Bound flip: the entering variable exhausts its range
                // before anything else binds.
                let flip_to = if direction > 0.0 {
                    BoundSide::Upper
                } else {
                    BoundSide::Lower
                };

                let partner = hooks.relu_adjustment(self.vars[entering], &View { solver: self });
                self.flip(entering, flip_to);
                if let Some(partner_var) = partner {
                    if let Some(&partner_idx) = self.index_of.get(&partner_var) {
                        if !self.is_basic[partner_idx] {
                            if let Some(side) = self.side_of(partner_idx) {
                                self.flip(partner_idx, side.opposite());
                            }
                        }
                    }
                }
                continue;
            }

            let (pivot_row, step, leave_at) = match blocking {
                Some((block_row, block_step, block_bound)) if step_to_target > block_step => {
                    (block_row, block_step, block_bound)
                }
                _ => (leaving, step_to_target, target),
            };

            let row_report = self.external_row(pivot_row);
            hooks.row_bound_hook(self.vars[pivot_row], self.vars[entering], &row_report)?;

            self.apply_step(entering, direction * step);
            self.value[pivot_row] = leave_at;
            self.pivot(entering, pivot_row);
        };

        hooks.iteration_count(iterations);
        Ok(outcome)
    }

    fn basics(&self) -> Vec<Var> {
        (0..self.vars.len())
            .filter(|&idx| self.is_basic[idx])
            .map(|idx| self.vars[idx])
            .collect()
    }

    fn assignment(&self) -> Vec<(Var, f64)> {
        (0..self.vars.len())
            .map(|idx| (self.vars[idx], self.value[idx]))
            .collect()
    }

    fn dictionary_row(&self, var: Var) -> Option<Vec<(Var, f64)>> {
        let &idx = self.index_of.get(&var)?;
        if !self.is_basic[idx] {
            return None;
        }

        Some(
            self.tableau
                .row_entries(idx)
                .into_iter()
                .filter(|&(column, _)| column != idx)
                .map(|(column, coefficient)| (self.vars[column], coefficient))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{LpColumn, LpRow};

    struct NoHooks;

    impl LpHooks for NoHooks {
        fn row_bound_hook(&mut self, _: Var, _: Var, _: &[(Var, f64)]) -> Result<()> {
            Ok(())
        }
        fn iteration_count(&mut self, _: u64) {}
        fn relu_adjustment(&mut self, _: Var, _: &dyn LpStateView) -> Option<Var> {
            None
        }
    }

    fn problem(rows: Vec<LpRow>, columns: Vec<LpColumn>) -> LpProblem {
        LpProblem {
            rows,
            columns,
            iteration_limit: 1000,
            feasibility_epsilon: 1e-9,
        }
    }

    #[test]
    fn test_already_feasible() {
        // basic 2 = x0 + x1 with both at 0.5, bounds [0, 2].
        let p = problem(
            vec![LpRow {
                var: 2,
                lower: 0.0,
                upper: 2.0,
                entries: vec![(0, 1.0), (1, 1.0)],
            }],
            vec![
                LpColumn {
                    var: 0,
                    lower: 0.5,
                    upper: 1.0,
                    side: BoundSide::Lower,
                },
                LpColumn {
                    var: 1,
                    lower: 0.5,
                    upper: 1.0,
                    side: BoundSide::Lower,
                },
            ],
        );

        let mut solver = BoundedSimplex::new(&p);
        assert_eq!(solver.solve(&mut NoHooks).unwrap(), LpOutcome::Solution);
        let assignment: FxHashMap<Var, f64> = solver.assignment().into_iter().collect();
        assert!((assignment[&2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_drives_basic_into_bounds() {
        // basic 1 = x0, basic must equal 5 but x0 starts at 0.
        let p = problem(
            vec![LpRow {
                var: 1,
                lower: 5.0,
                upper: 5.0,
                entries: vec![(0, 1.0)],
            }],
            vec![LpColumn {
                var: 0,
                lower: 0.0,
                upper: 10.0,
                side: BoundSide::Lower,
            }],
        );

        let mut solver = BoundedSimplex::new(&p);
        assert_eq!(solver.solve(&mut NoHooks).unwrap(), LpOutcome::Solution);
        let assignment: FxHashMap<Var, f64> = solver.assignment().into_iter().collect();
        assert!((assignment[&0] - 5.0).abs() < 1e-9);
        assert!((assignment[&1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_infeasible() {
        // basic 1 = x0, basic pinned to 5 but x0 can only reach 3.
        let p = problem(
            vec![LpRow {
                var: 1,
                lower: 5.0,
                upper: 5.0,
                entries: vec![(0, 1.0)],
            }],
            vec![LpColumn {
                var: 0,
                lower: 0.0,
                upper: 3.0,
                side: BoundSide::Lower,
            }],
        );

        let mut solver = BoundedSimplex::new(&p);
        assert_eq!(solver.solve(&mut NoHooks).unwrap(), LpOutcome::NoSolution);
    }

    #[test]
    fn test_two_rows_coupled() {
        // basic 2 = x0 + x1 in [1, 1]; basic 3 = x0 - x1 in [0, 0].
        // Solution: x0 = x1 = 0.5.
        let p = problem(
            vec![
                LpRow {
                    var: 2,
                    lower: 1.0,
                    upper: 1.0,
                    entries: vec![(0, 1.0), (1, 1.0)],
                },
                LpRow {
                    var: 3,
                    lower: 0.0,
                    upper: 0.0,
                    entries: vec![(0, 1.0), (1, -1.0)],
                },
            ],
            vec![
                LpColumn {
                    var: 0,
                    lower: 0.0,
                    upper: 1.0,
                    side: BoundSide::Lower,
                },
                LpColumn {
                    var: 1,
                    lower: 0.0,
                    upper: 1.0,
                    side: BoundSide::Lower,
                },
            ],
        );

        let mut solver = BoundedSimplex::new(&p);
        assert_eq!(solver.solve(&mut NoHooks).unwrap(), LpOutcome::Solution);
        let assignment: FxHashMap<Var, f64> = solver.assignment().into_iter().collect();
        assert!((assignment[&0] + assignment[&1] - 1.0).abs() < 1e-6);
        assert!((assignment[&0] - assignment[&1]).abs() < 1e-6);
    }

    #[test]
    fn test_hook_sees_leaving_row() {
        struct Recorder {
            rows_seen: usize,
        }
        impl LpHooks for Recorder {
            fn row_bound_hook(
                &mut self,
                leaving: Var,
                entering: Var,
                row: &[(Var, f64)],
            ) -> Result<()> {
                self.rows_seen += 1;
                assert_ne!(leaving, entering);
                // The leaving basic leads with coefficient -1.
                assert_eq!(row[0], (leaving, -1.0));
                Ok(())
            }
            fn iteration_count(&mut self, count: u64) {
                assert!(count >= 1);
            }
            fn relu_adjustment(&mut self, _: Var, _: &dyn LpStateView) -> Option<Var> {
                None
            }
        }

        let p = problem(
            vec![LpRow {
                var: 1,
                lower: 5.0,
                upper: 5.0,
                entries: vec![(0, 1.0)],
            }],
            vec![LpColumn {
                var: 0,
                lower: 0.0,
                upper: 10.0,
                side: BoundSide::Lower,
            }],
        );

        let mut solver = BoundedSimplex::new(&p);
        let mut recorder = Recorder { rows_seen: 0 };
        assert_eq!(solver.solve(&mut recorder).unwrap(), LpOutcome::Solution);
        assert!(recorder.rows_seen >= 1);
    }
}
