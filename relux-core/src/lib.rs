//! Relux Core - foundational types for the relux ReLU/simplex solver.
//!
//! This crate provides the pieces shared by the solver and its front ends:
//! - Epsilon-tolerant floating-point comparison ([`float`])
//! - Per-variable bounds carrying a decision level ([`bounds`])
//! - The six-state variable status used by the simplex engine ([`status`])
//! - The solver error enum and `Result` alias ([`error`])
//! - Tunable numerical and search configuration ([`config`])
//!
//! # Examples
//!
//! ```
//! use relux_core::bounds::VariableBound;
//! use relux_core::status::{compute_status, VariableStatus};
//!
//! let lower = VariableBound::at(0.0);
//! let upper = VariableBound::at(1.0);
//! let status = compute_status(0.5, &lower, &upper, 1e-3);
//! assert_eq!(status, VariableStatus::Between);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bounds;
pub mod config;
pub mod error;
pub mod float;
pub mod status;

pub use bounds::VariableBound;
pub use config::Config;
pub use error::{Result, SolverError};
pub use status::VariableStatus;

/// Variable identifier. Variables are dense indices `0..num_variables`;
/// ReLU slack variables used by the LP oracle live past `num_variables`.
pub type Var = usize;
