//! HGTM Experiment: seeded scenarios and reports for the migration kernel.
//!
//! This crate drives `hgtm_kernel` from the outside:
//! - Generates synthetic multi-group networks from a seed
//! - Runs the migration pipeline once or over repeated trials
//! - Saves run reports and trial summaries as JSON

pub mod experiment;
pub mod generator;
pub mod results;
