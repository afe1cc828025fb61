//! Report generation.
//!
//! This module renders aggregate statistics as text and JSON and writes
//! the output files of a run.

pub mod generator;
pub mod writer;

pub use writer::ReportWriter;
