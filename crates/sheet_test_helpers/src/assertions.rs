//! Domain-specific assertions for SheetSync tests
//!
//! Predicates over the raw text of a persisted sheet file, evaluated with
//! `Predicate::eval` against `std::fs::read_to_string` output.

use predicates::prelude::*;

/// The first line is exactly `<password> <version>`
///
/// # Example
///
/// ```rust
/// use sheet_test_helpers::assertions::sheet_header;
/// use predicates::prelude::*;
///
/// assert!(sheet_header("secret", 3).eval("secret 3\nA1 42\n"));
/// assert!(!sheet_header("secret", 3).eval("secret 4\n"));
/// ```
pub fn sheet_header(password: &str, version: u64) -> impl Predicate<str> {
    let expected = format!("{} {}", password, version);
    predicate::function(move |s: &str| s.lines().next() == Some(expected.as_str()))
}

/// Some line after the header is exactly `<name> <contents>` as written
/// on disk (escaped form)
///
/// # Example
///
/// ```rust
/// use sheet_test_helpers::assertions::has_cell_line;
/// use predicates::prelude::*;
///
/// assert!(has_cell_line("A1", "42").eval("pw 1\nA1 42\n"));
/// assert!(!has_cell_line("A1", "4").eval("pw 1\nA1 42\n"));
/// ```
pub fn has_cell_line(name: &str, raw_contents: &str) -> impl Predicate<str> {
    let expected = format!("{} {}", name, raw_contents);
    predicate::function(move |s: &str| s.lines().skip(1).any(|line| line == expected))
}

/// The file holds a header and exactly `count` cell lines
pub fn cell_line_count(count: usize) -> impl Predicate<str> {
    predicate::function(move |s: &str| {
        s.lines().next().is_some()
            && s.lines().skip(1).filter(|l| !l.trim().is_empty()).count() == count
    })
}

/// The password does not appear anywhere (for log capture checks)
pub fn does_not_leak(secret: &str) -> impl Predicate<str> {
    let secret = secret.to_string();
    predicate::function(move |s: &str| !s.contains(secret.as_str()))
}
