//! Notebook test runner
//!
//! Executes notebooks against a live kernel and compares what each cell
//! publishes with the outputs saved in the document. Comparison works on
//! canonicalized outputs so that addresses, ids, counters and rendering
//! noise never cause a mismatch.

pub mod canonical;
pub mod compare;
pub mod report;
pub mod runner;

pub use canonical::Canonicalizer;
pub use compare::{compare_outputs, render, Comparison};
pub use report::{CellResult, CellStatus, NotebookReport, NotebookStatus, RunOutcome, EXIT_SKIP};
pub use runner::{run_cell, run_notebook, wait_for_ready};
