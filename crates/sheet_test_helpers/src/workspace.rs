//! Data directory utilities for tests
//!
//! Provides temporary directories laid out the way a sheet registry expects
//! them, optionally pre-populated with sheet files.

use assert_fs::TempDir;
use std::fs;
use std::path::PathBuf;

/// Extension used for fixture sheet files
pub const SHEET_EXTENSION: &str = "ss";

/// Create a temporary directory for testing
///
/// The directory will be automatically cleaned up when the `TempDir` is dropped.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Create an empty sheet data directory
///
/// # Example
///
/// ```rust
/// use sheet_test_helpers::workspace::data_dir;
///
/// let dir = data_dir();
/// assert!(dir.path().is_dir());
/// ```
pub fn data_dir() -> TempDir {
    temp_dir()
}

/// Create a data directory holding the given sheets
///
/// # Arguments
///
/// * `sheets` - Tuples of (sheet name, raw file content)
///
/// # Example
///
/// ```rust
/// use sheet_test_helpers::workspace::data_dir_with_sheets;
///
/// let dir = data_dir_with_sheets(&[
///     ("budget", "secret 1\nA1 42\n"),
///     ("empty", "pw 0\n"),
/// ]);
/// assert!(dir.path().join("budget.ss").exists());
/// ```
pub fn data_dir_with_sheets(sheets: &[(&str, &str)]) -> TempDir {
    let dir = data_dir();
    for (name, content) in sheets {
        fs::write(sheet_path(&dir, name), content).expect("Failed to write sheet file");
    }
    dir
}

/// Path a sheet of this name would have inside `dir`
pub fn sheet_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(format!("{}.{}", name, SHEET_EXTENSION))
}
