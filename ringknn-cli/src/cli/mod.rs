//! Command-line interface for the ringknn classification driver.
//!
//! Parses the positional `data labels k [expected_accuracy
//! [expected_indexes]]` surface, drives the in-process ring, and renders
//! the per-phase timing and accuracy lines.

mod commands;

pub use commands::{Cli, ExecutionSummary, Transport, render_summary, run_cli};
