//! Library surface of the relux driver: the query encoder and the
//! final-statistics reporter. The binary in `main.rs` wires these to the
//! command line.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod encode;
pub mod report;
