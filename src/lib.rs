//! nbdoctest - notebook output regression testing
//!
//! This library drives Jupyter kernels over the messaging protocol,
//! compares what notebook cells produce with their saved outputs, and
//! carries a smoke test for the timed-automata model checker bindings.

pub mod cli;
pub mod commands;
pub mod common;
pub mod kernel;
pub mod modelcheck;
pub mod notebook;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use notebook::{Notebook, OutputRecord};
