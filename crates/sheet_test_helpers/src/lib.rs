//! Shared test utilities for SheetSync test suites
//!
//! # Modules
//!
//! - [`workspace`]: temporary data directories and sheet file fixtures
//! - [`logging`]: test logging configuration
//! - [`assertions`]: predicates over persisted sheet files
//! - [`timing`]: bounded waits for async receives
//!
//! # Example
//!
//! ```rust
//! use sheet_test_helpers::prelude::*;
//!
//! let dir = data_dir_with_sheets(&[("budget", "secret 2\nA1 42\n")]);
//! let sheet = std::fs::read_to_string(dir.path().join("budget.ss")).unwrap();
//! assert!(sheet_header("secret", 2).eval(&sheet));
//! ```

pub mod assertions;
pub mod logging;
pub mod timing;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::logging::{init_test_logging, suppress_logs};
    pub use crate::timing::{assert_quiet, within};
    pub use crate::workspace::{data_dir, data_dir_with_sheets, temp_dir};
    pub use predicates::prelude::*;
}
