//! Spreadsheet-to-form replay pipeline for formfill.
//!
//! Reads tabular records from a downloaded origin file, maps each column label
//! to a form field identifier, writes the values into a live surface and submits
//! one record at a time, accounting for every skipped or failed field in a run
//! report.

pub mod field_mapping;
pub mod field_writer;
pub mod record_source;
pub mod replay_config;
pub mod replay_orchestrator;
pub mod run_report;
pub mod session_bootstrap;
pub mod submitter;
pub mod surface;
pub mod surface_cli_bridge;
pub mod wait_policy;
