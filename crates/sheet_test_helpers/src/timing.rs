//! Bounded waits for async tests
//!
//! Session fan-out is asynchronous, so tests wait on receives with a timeout
//! instead of hanging forever when a message never arrives.

use std::future::Future;
use std::time::Duration;

/// How long [`within`] waits before failing the test
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// How long [`assert_quiet`] listens for an unexpected message
pub const QUIET_WAIT: Duration = Duration::from_millis(100);

/// Await `future`, panicking if it takes longer than [`DEFAULT_WAIT`]
///
/// # Example
///
/// ```rust
/// use sheet_test_helpers::timing::within;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let value = within(async { 7 }).await;
/// assert_eq!(value, 7);
/// # }
/// ```
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(DEFAULT_WAIT, future)
        .await
        .expect("Timed out waiting for future")
}

/// Assert that `future` does not produce a value within [`QUIET_WAIT`]
///
/// `None` counts as quiet, which suits `recv`-style futures where `None`
/// means the stream ended without delivering anything.
pub async fn assert_quiet<F, T>(future: F)
where
    F: Future<Output = Option<T>>,
    T: std::fmt::Debug,
{
    if let Ok(Some(value)) = tokio::time::timeout(QUIET_WAIT, future).await {
        panic!("Expected no message, received {:?}", value);
    }
}
