//! Relux Solver - a Reluplex-style decision procedure.
//!
//! Decides satisfiability of conjunctions of linear arithmetic constraints
//! and rectifier constraints `f = max(0, b)`, the query shape produced by
//! verification of feed-forward ReLU networks. The engine is a revised
//! simplex kernel over a shared sparse tableau, extended with per-variable
//! bound tightening, ReLU repair, case splitting with nonchronological
//! backjumping, an embedded LP oracle with bound-learning callbacks, and
//! numerical-safety machinery (degradation checks and tableau
//! restoration).
//!
//! # Examples
//!
//! ```
//! use relux_solver::{Reluplex, SolveStatus};
//!
//! // x1 = x0, x0 in [2, 3], x1 in [0, 10].
//! let mut solver = Reluplex::new(2);
//! solver.initialize_cell(1, 0, 1.0);
//! solver.initialize_cell(1, 1, -1.0);
//! solver.mark_basic(1);
//! solver.set_lower_bound(0, 2.0);
//! solver.set_upper_bound(0, 3.0);
//! solver.set_lower_bound(1, 0.0);
//! solver.set_upper_bound(1, 10.0);
//!
//! solver.initialize().unwrap();
//! assert_eq!(solver.solve(), SolveStatus::Sat);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bounds_ops;
mod invariants;
pub mod lp;
mod oob;
pub mod relu;
mod restore;
mod smt;
pub mod stats;
mod solver;
pub mod tableau;
mod tighten;

pub use lp::{LpHooks, LpOracle, LpOutcome, LpProblem, LpStateView};
pub use relu::{DissolutionKind, ReluPairs};
pub use solver::{Reluplex, SolveStatus};
pub use stats::Stats;
pub use tableau::SparseTableau;
