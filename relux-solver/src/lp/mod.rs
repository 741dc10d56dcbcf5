//! LP oracle abstraction.
//!
//! The solver drives out-of-bounds basic variables back into their bounds
//! by handing the current tableau to an LP oracle as a pure feasibility
//! problem. The contract is deliberately narrow - a problem description,
//! three callbacks, and three outcomes - so that any bounded-variable
//! simplex implementation can sit behind it. The embedded implementation
//! lives in [`simplex`].

pub mod simplex;

use relux_core::{Result, Var};

/// Result of one oracle invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpOutcome {
    /// A feasible point was found; basis and assignment are available.
    Solution,
    /// The constraints are infeasible under the current bounds.
    NoSolution,
    /// The oracle gave up (iteration limit, numerical trouble).
    Failed,
}

/// Which bound a non-basic variable currently sits at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSide {
    /// Sitting at its lower bound.
    Lower,
    /// Sitting at its upper bound.
    Upper,
}

impl BoundSide {
    /// The other side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            BoundSide::Lower => BoundSide::Upper,
            BoundSide::Upper => BoundSide::Lower,
        }
    }
}

/// A column of the LP: a non-basic variable with finite bounds, starting at
/// one of them.
#[derive(Debug, Clone)]
pub struct LpColumn {
    /// External variable id.
    pub var: Var,
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
    /// Starting side.
    pub side: BoundSide,
}

/// A row of the LP: a basic (or slack-row) variable, its bounds, and its
/// defining equation over column variables.
#[derive(Debug, Clone)]
pub struct LpRow {
    /// External variable id.
    pub var: Var,
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
    /// `(column variable, coefficient)` entries; the row variable itself
    /// contributes an implicit `-1`.
    pub entries: Vec<(Var, f64)>,
}

/// A feasibility problem handed to the oracle.
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// Basic and slack-row variables with their equations.
    pub rows: Vec<LpRow>,
    /// Non-basic variables.
    pub columns: Vec<LpColumn>,
    /// Iteration cap; exceeding it yields [`LpOutcome::Failed`].
    pub iteration_limit: u64,
    /// Tolerance for considering a row value within its bounds.
    pub feasibility_epsilon: f64,
}

/// Read-only view of the oracle's state, exposed to hooks.
pub trait LpStateView {
    /// Is `var` currently non-basic inside the oracle?
    fn is_non_basic(&self, var: Var) -> bool;
    /// Which bound a non-basic variable sits at, if it sits at one.
    fn side(&self, var: Var) -> Option<BoundSide>;
}

/// Callbacks the oracle invokes while it runs.
pub trait LpHooks {
    /// Invoked before each pivot with the leaving basic, the entering
    /// non-basic, and the leaving row as `(variable, coefficient)` entries
    /// (the leaving basic itself carries `-1`). An `Err` aborts the run.
    fn row_bound_hook(&mut self, leaving: Var, entering: Var, row: &[(Var, f64)]) -> Result<()>;

    /// Total iteration count, reported once per invocation.
    fn iteration_count(&mut self, count: u64);

    /// The oracle is about to flip `non_basic` between its bounds. Return
    /// the ReLU partner that should flip along with it, if any.
    fn relu_adjustment(&mut self, non_basic: Var, view: &dyn LpStateView) -> Option<Var>;
}

/// The oracle contract: run once, then expose the solution.
pub trait LpOracle {
    /// Run the simplex search.
    fn solve(&mut self, hooks: &mut dyn LpHooks) -> Result<LpOutcome>;

    /// Variables basic in the final state. Meaningful after
    /// [`LpOutcome::Solution`].
    fn basics(&self) -> Vec<Var>;

    /// Final primal value of every participating variable.
    fn assignment(&self) -> Vec<(Var, f64)>;

    /// The final dictionary row of `var` over non-basic variables, when
    /// `var` is basic in the final state. Excludes the `-1` self-entry.
    fn dictionary_row(&self, var: Var) -> Option<Vec<(Var, f64)>>;
}
