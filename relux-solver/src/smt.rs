//! Case splitting over ReLU pairs.
//!
//! When a pair keeps coming back broken, the solver stops repairing it and
//! commits to one of its branches: merge (active) when A[f] is currently
//! positive, split (inactive) otherwise. The full solver state is
//! snapshotted before the commitment; popping either flips the snapshot to
//! the untried branch or discards it and keeps popping. An empty stack
//! means the search space is exhausted.
//!
//! Backjumping is nonchronological: a bound conflict carries the highest
//! decision level among the facts that produced it, and the stack pops
//! down to that level in one go.

use crate::relu::DissolutionKind;
use crate::solver::Reluplex;
use crate::tableau::SparseTableau;
use relux_core::bounds::VariableBound;
use relux_core::{float, Result, SolverError, Var};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

/// Full solver state captured when a case split is pushed.
pub(crate) struct Snapshot {
    pub(crate) variable: Var,
    pub(crate) kind: DissolutionKind,
    pub(crate) first_attempt: bool,
    pub(crate) lower_bounds: Vec<VariableBound>,
    pub(crate) upper_bounds: Vec<VariableBound>,
    pub(crate) assignment: Vec<f64>,
    pub(crate) dissolved: FxHashMap<Var, DissolutionKind>,
    pub(crate) basics: FxHashSet<Var>,
    pub(crate) tableau: SparseTableau,
}

/// The decision stack and per-pair violation counters.
pub(crate) struct SmtState {
    pub(crate) stack: Vec<Snapshot>,
    pub(crate) violations: FxHashMap<Var, u32>,
}

impl SmtState {
    pub(crate) fn new() -> Self {
        Self {
            stack: Vec::new(),
            violations: FxHashMap::default(),
        }
    }

    pub(crate) fn depth(&self) -> u32 {
        self.stack.len() as u32
    }
}

impl Reluplex {
    fn store_current_state(&self, variable: Var) -> Snapshot {
        Snapshot {
            variable,
            // Placeholder until the direction is chosen.
            kind: DissolutionKind::Split,
            first_attempt: true,
            lower_bounds: self.lower_bounds.clone(),
            upper_bounds: self.upper_bounds.clone(),
            assignment: self.assignment.clone(),
            dissolved: self.dissolved.clone(),
            basics: self.basic_variables.clone(),
            tableau: self.tableau.clone(),
        }
    }

    fn restore_state(&mut self, snapshot: &Snapshot) {
        self.lower_bounds.clone_from(&snapshot.lower_bounds);
        self.upper_bounds.clone_from(&snapshot.upper_bounds);
        self.assignment.clone_from(&snapshot.assignment);
        self.dissolved.clone_from(&snapshot.dissolved);
        self.basic_variables.clone_from(&snapshot.basics);
        snapshot.tableau.backup_into(&mut self.tableau);
        self.compute_all_statuses();
    }

    /// Split first when F currently sits at zero; merge first when it is
    /// positive.
    fn begin_with_split(&self, f: Var) -> bool {
        !float::is_positive(self.assignment[f])
    }

    /// Record one more violation of pair `f`; once the threshold is hit,
    /// case-split on it. Returns whether a split or merge happened.
    pub fn notify_broken_relu(&mut self, f: Var) -> Result<bool> {
        let count = self.smt.violations.entry(f).or_insert(0);
        *count += 1;

        if *count < self.config.broken_relu_split_threshold {
            return Ok(false);
        }

        self.dissolve_relu_on(f)?;
        self.smt.violations.clear();
        Ok(true)
    }

    /// Snapshot, choose a direction, and assert it.
    pub(crate) fn dissolve_relu_on(&mut self, variable: Var) -> Result<()> {
        debug!(
            var = %self.name_of(variable),
            depth = self.smt.depth(),
            "case-splitting on relu"
        );

        let mut snapshot = self.store_current_state(variable);

        if self.begin_with_split(variable) {
            snapshot.kind = DissolutionKind::Split;
            self.stats.stack_splits += 1;
            self.smt.stack.push(snapshot);

            let depth = self.smt.depth();
            self.update_upper_bound(variable, 0.0, depth)?;
        } else {
            snapshot.kind = DissolutionKind::Merge;
            self.stats.stack_merges += 1;
            self.smt.stack.push(snapshot);

            let depth = self.smt.depth();
            self.update_lower_bound(variable, 0.0, depth)?;
        }

        let depth = self.smt.depth();
        self.stats.stack_visited_states += 1;
        self.stats.set_current_depth(depth);
        Ok(())
    }

    /// Backjump: pop down to `violating_level`. Level 0 conflicts admit no
    /// further choices, so the stack is effectively empty.
    pub fn pop_to_level(&mut self, violating_level: u32) -> Result<()> {
        if violating_level == 0 {
            return Err(SolverError::StackEmpty);
        }

        self.pop()?;
        while self.smt.depth() > violating_level {
            self.stats.conflict_pops += 1;
            self.pop()?;
        }
        Ok(())
    }

    /// Restore the top snapshot. If its alternative branch is untried,
    /// flip to it and stop; otherwise discard and keep popping.
    pub fn pop(&mut self) -> Result<()> {
        loop {
            let Some(mut snapshot) = self.smt.stack.pop() else {
                return Err(SolverError::StackEmpty);
            };

            trace!(var = %self.name_of(snapshot.variable), "popping");
            self.restore_state(&snapshot);

            if snapshot.first_attempt {
                snapshot.first_attempt = false;
                let variable = snapshot.variable;

                let flipped = match snapshot.kind {
                    DissolutionKind::Split => DissolutionKind::Merge,
                    DissolutionKind::Merge => DissolutionKind::Split,
                };
                snapshot.kind = flipped;
                self.smt.stack.push(snapshot);
                let depth = self.smt.depth();

                match flipped {
                    DissolutionKind::Merge => {
                        trace!("popped a split; now merging");
                        self.stats.stack_merges += 1;
                        self.update_lower_bound(variable, 0.0, depth)?;
                    }
                    DissolutionKind::Split => {
                        trace!("popped a merge; now splitting");
                        self.stats.stack_splits += 1;
                        self.update_upper_bound(variable, 0.0, depth)?;
                    }
                }

                self.compute_all_statuses();
                self.stats.stack_visited_states += 1;
                self.stats.note_second_phase(depth);
                return Ok(());
            }

            self.stats.stack_pops += 1;
            self.stats.set_current_depth(self.smt.depth());
        }
    }
}
