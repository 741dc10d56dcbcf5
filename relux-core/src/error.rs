//! Solver errors.
//!
//! Two variants are ordinary control flow rather than failures:
//! [`SolverError::InvariantViolation`] signals branch infeasibility at a
//! known decision level (the SMT core backjumps to it), and
//! [`SolverError::StackEmpty`] means the search space is exhausted (UNSAT).
//! Everything else is terminal and maps to an `Error` solve status.

use crate::Var;
use thiserror::Error;

/// Convenience alias used across the solver crates.
pub type Result<T> = std::result::Result<T, SolverError>;

/// Everything a solver operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    /// A bound update produced `lb > ub`. Carries the highest decision
    /// level among the facts that entailed the conflict; the SMT core pops
    /// down to that level.
    #[error("bound invariant violated at decision level {level}")]
    InvariantViolation {
        /// Backjump target.
        level: u32,
    },

    /// The decision stack is exhausted: the query is unsatisfiable.
    #[error("decision stack is empty")]
    StackEmpty,

    /// The LP oracle failed this many times in a row; restoration no longer
    /// helps.
    #[error("{count} consecutive LP oracle failures")]
    ConsecutiveOracleFailures {
        /// Number of consecutive failures observed.
        count: u32,
    },

    /// A pivot was requested between variables in the wrong basis states.
    #[error("illegal pivot: {0}")]
    IllegalPivot(String),

    /// A ReLU operation was applied to a variable outside every pair.
    #[error("variable {0} is not a ReLU variable")]
    NotReluVariable(Var),

    /// No eligible pivot column exists to move this variable out of the
    /// basis.
    #[error("cannot make variable {0} non-basic")]
    CannotMakeNonBasic(Var),

    /// A bound update that must conflict (negative upper bound on an F
    /// variable) unexpectedly did not.
    #[error("expected a bound conflict on variable {0} that did not occur")]
    UpperLowerInvariantViolated(Var),

    /// Finite-bound derivation needs every row to contain at most one
    /// variable with an infinite bound.
    #[error("row of basic {0} has multiple variables with infinite bounds")]
    MultipleInfiniteVarsOnRow(Var),

    /// Preprocessing finished with variables still unbounded.
    #[error("{0} variables still have infinite bounds after preprocessing")]
    VarsWithInfiniteBounds(usize),

    /// The query handed to the solver is malformed.
    #[error("invalid query encoding: {0}")]
    Encoding(String),
}
