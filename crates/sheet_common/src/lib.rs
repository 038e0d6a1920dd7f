//! Shared plumbing for SheetSync
//!
//! This crate holds the pieces every SheetSync component needs regardless of
//! what it does with a spreadsheet: logging setup and log redaction.

pub mod sanitizer;
pub mod telemetry;

pub use sanitizer::LogSanitizer;

/// Default directory (relative to the working directory) holding sheet files
pub const DEFAULT_DATA_DIR: &str = ".sheetsync/sheets";

/// Default file extension for persisted sheets
pub const DEFAULT_SHEET_EXTENSION: &str = "ss";
