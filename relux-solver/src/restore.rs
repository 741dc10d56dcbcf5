//! Numerical-failure recovery.
//!
//! Right after preprocessing the solver stores a one-time snapshot of its
//! state. When the LP oracle fails or accumulated roundoff degrades the
//! tableau past tolerance, the snapshot is restored and the bounds learned
//! since are re-asserted one variable at a time, replaying splits and
//! merges through the ordinary bound-update contract so the dissolution
//! map comes out the same.

use crate::relu::DissolutionKind;
use crate::solver::Reluplex;
use crate::tableau::SparseTableau;
use relux_core::bounds::VariableBound;
use relux_core::{float, Result, Var};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

/// One-time post-preprocessing snapshot.
pub(crate) struct Preprocessed {
    pub(crate) tableau: SparseTableau,
    pub(crate) lower_bounds: Vec<VariableBound>,
    pub(crate) upper_bounds: Vec<VariableBound>,
    pub(crate) assignment: Vec<f64>,
    pub(crate) basics: FxHashSet<Var>,
    pub(crate) dissolved: FxHashMap<Var, DissolutionKind>,
}

impl Reluplex {
    pub(crate) fn store_preprocessed(&mut self) {
        self.preprocessed = Some(Preprocessed {
            tableau: self.tableau.clone(),
            lower_bounds: self.lower_bounds.clone(),
            upper_bounds: self.upper_bounds.clone(),
            assignment: self.assignment.clone(),
            basics: self.basic_variables.clone(),
            dissolved: self.dissolved.clone(),
        });
    }

    /// Restore the preprocessed snapshot, then re-assert the bounds that
    /// were current at failure time. When `keep_basis` the pre-failure
    /// basis is re-established by pivoting (skipping numerically poor
    /// pivots); otherwise the preprocessed basis is kept.
    pub(crate) fn restore_from_backup(&mut self, keep_basis: bool) -> Result<()> {
        self.stats.restorations += 1;
        info!(keep_basis, "restoring tableau from preprocessed backup");

        let backup_lower = self.lower_bounds.clone();
        let backup_upper = self.upper_bounds.clone();
        let backup_basics = self.basic_variables.clone();
        let backup_dissolved = self.dissolved.clone();

        {
            let Some(preprocessed) = self.preprocessed.as_ref() else {
                return Ok(());
            };

            preprocessed.tableau.backup_into(&mut self.tableau);
            self.dissolved.clone_from(&preprocessed.dissolved);
            self.assignment.clone_from(&preprocessed.assignment);
            self.basic_variables.clone_from(&preprocessed.basics);
            self.lower_bounds.clone_from(&preprocessed.lower_bounds);
            self.upper_bounds.clone_from(&preprocessed.upper_bounds);
        }

        // Preprocessing-era bounds are all level-0 facts.
        for var in 0..self.num_variables {
            self.lower_bounds[var].set_level(0);
            self.upper_bounds[var].set_level(0);
        }
        self.compute_all_statuses();

        // Re-assert the failure-time bounds. Ordinary variables take both
        // sides directly; ReLU variables replay through the pair contract
        // so splits and merges come out as recorded.
        for var in 0..self.num_variables {
            let new_lower = &backup_lower[var];
            let new_upper = &backup_upper[var];

            // Variables outside any still-active pair (including pairs
            // dissolved during preprocessing) take their bounds directly.
            if !self.active_relu_variable(var) {
                if new_lower.finite() && self.lower_improves(var, new_lower.value()) {
                    self.update_lower_bound(var, new_lower.value(), new_lower.level())?;
                }
                if new_upper.finite() && self.upper_improves(var, new_upper.value()) {
                    self.update_upper_bound(var, new_upper.value(), new_upper.level())?;
                }
                continue;
            }

            // Pairs are handled once, from the F side.
            if !self.relu_pairs.is_f(var) {
                continue;
            }

            let f = var;
            let b = self.relu_pairs.partner(f)?;

            let b_lower = &backup_lower[b];
            let b_upper = &backup_upper[b];

            match backup_dissolved.get(&f) {
                None => {
                    // Still active at failure time: upper bounds of both
                    // members match, so one update cascades; the B lower
                    // bound must have stayed negative.
                    if new_upper.finite() && self.upper_improves(f, new_upper.value()) {
                        self.update_upper_bound(f, new_upper.value(), new_upper.level())?;
                    }
                    if b_lower.finite() && self.lower_improves(b, b_lower.value()) {
                        self.update_lower_bound(b, b_lower.value(), b_lower.level())?;
                    }
                }
                Some(DissolutionKind::Split) => {
                    // B's upper bound is non-positive; re-asserting it
                    // replays the split.
                    if b_upper.finite() && self.upper_improves(b, b_upper.value()) {
                        self.update_upper_bound(b, b_upper.value(), b_upper.level())?;
                    }

                    // The pair may have broken later than the split did, so
                    // fix F's level individually.
                    self.upper_bounds[f].set_level(new_upper.level());

                    if b_lower.finite() && self.lower_improves(b, b_lower.value()) {
                        self.update_lower_bound(b, b_lower.value(), b_lower.level())?;
                    }
                }
                Some(DissolutionKind::Merge) => {
                    // B's lower bound is non-negative; re-asserting it
                    // replays the merge. F's bounds may have been tightened
                    // after the merge, so assert them afterwards.
                    if b_lower.finite() && self.lower_improves(b, b_lower.value()) {
                        self.update_lower_bound(b, b_lower.value(), b_lower.level())?;
                    }
                    if new_lower.finite() && self.lower_improves(f, new_lower.value()) {
                        self.update_lower_bound(f, new_lower.value(), new_lower.level())?;
                    }
                    if new_upper.finite() && self.upper_improves(f, new_upper.value()) {
                        self.update_upper_bound(f, new_upper.value(), new_upper.level())?;
                    }
                }
            }
        }

        if keep_basis {
            debug!("re-establishing the pre-failure basis");
            let should_be: FxHashSet<Var> = backup_basics
                .difference(&self.basic_variables)
                .copied()
                .collect();
            let shouldnt_be: FxHashSet<Var> = self
                .basic_variables
                .difference(&backup_basics)
                .copied()
                .collect();
            self.adjust_basic_variables(&should_be, shouldnt_be, true)?;
        }

        info!("restoration done");
        Ok(())
    }

    fn lower_improves(&self, var: Var, value: f64) -> bool {
        !self.lower_bounds[var].finite() || float::gt(value, self.lower_bounds[var].value())
    }

    fn upper_improves(&self, var: Var, value: f64) -> bool {
        !self.upper_bounds[var].finite() || float::lt(value, self.upper_bounds[var].value())
    }

    /// Pivot so that every variable in `should_be` enters the basis,
    /// paired against leaving candidates from `shouldnt_be`. Numerically
    /// poor pivots are skipped. When `adjust_assignment`, freshly
    /// non-basic variables are moved back into bounds and their ReLU
    /// partners fixed up.
    pub(crate) fn adjust_basic_variables(
        &mut self,
        should_be: &FxHashSet<Var>,
        mut shouldnt_be: FxHashSet<Var>,
        adjust_assignment: bool,
    ) -> Result<()> {
        let mut entering_vars: Vec<Var> = should_be.iter().copied().collect();
        entering_vars.sort_unstable();

        for entering in entering_vars {
            let column = self.tableau.column_entries(entering);

            for (leaving, _) in column {
                if !shouldnt_be.contains(&leaving) {
                    continue;
                }

                let weight = self.tableau.get(leaving, entering).abs();
                if float::lt(weight, self.config.instability_epsilon) {
                    debug!(weight, "skipping a numerically poor basis pivot");
                    continue;
                }

                shouldnt_be.remove(&leaving);
                self.pivot(entering, leaving)?;
                self.compute_one_status(leaving);

                if adjust_assignment {
                    // The leaving variable is non-basic now and must obey
                    // its bounds.
                    if self.too_low(leaving) {
                        let delta = self.lower_bounds[leaving].value() - self.assignment[leaving];
                        self.update(leaving, delta, true);
                    } else if self.too_high(leaving) {
                        let delta = self.upper_bounds[leaving].value() - self.assignment[leaving];
                        self.update(leaving, delta, true);
                    }

                    if self.relu_pairs.is_relu(leaving) {
                        let f = self.relu_pairs.to_f(leaving)?;
                        let b = self.relu_pairs.partner(f)?;

                        if !self.dissolved.contains_key(&f)
                            && self.relu_pair_is_broken(b, f)
                            && !self.basic_variables.contains(&b)
                            && !self.basic_variables.contains(&f)
                        {
                            if float::is_positive(self.assignment[b]) {
                                let delta = self.assignment[b] - self.assignment[f];
                                self.update(f, delta, true);
                            } else {
                                let delta = -self.assignment[f];
                                self.update(f, delta, true);
                            }
                        }
                    }
                }

                break;
            }
        }

        Ok(())
    }

    /// Largest discrepancy between the preprocessed rows and the current
    /// assignment. Columns belonging to merged B variables are read
    /// through their F partner.
    pub(crate) fn check_degradation(&mut self) -> f64 {
        let Some(preprocessed) = self.preprocessed.as_ref() else {
            return 0.0;
        };

        let mut max = 0.0_f64;
        let basics: Vec<Var> = preprocessed.basics.iter().copied().collect();
        for basic in basics {
            let degradation = self.degradation_of(basic);
            if degradation > max {
                max = degradation;
            }
        }

        if max > self.stats.max_degradation {
            self.stats.max_degradation = max;
        }
        max
    }

    fn merged_alias(&self, var: Var) -> Var {
        if self.relu_pairs.is_b(var) && self.tableau.column_size(var) == 0 {
            if let Ok(f) = self.relu_pairs.partner(var) {
                return f;
            }
        }
        var
    }

    fn degradation_of(&self, variable: Var) -> f64 {
        let Some(preprocessed) = self.preprocessed.as_ref() else {
            return 0.0;
        };

        let mut result = 0.0;
        for (column, coefficient) in preprocessed.tableau.row_entries(variable) {
            if column != variable {
                result += self.assignment[self.merged_alias(column)] * coefficient;
            }
        }

        (result - self.assignment[self.merged_alias(variable)]).abs()
    }
}
