#![allow(dead_code)]

mod server_mock;
#[cfg(unix)]
pub mod signals;

pub use server_mock::{ServerEvent, ServerMock, ShutdownBehavior};

use tokio::time::{Duration, Instant};
use tokio_graceful_stop::GracefulStop;

/// A coordinator that does not install OS signal handlers, so that tests
/// can run in parallel within one process.
pub fn coordinator(capacity: usize, timeout: Duration) -> GracefulStop {
    GracefulStop::builder()
        .capacity(capacity)
        .timeout(timeout)
        .catch_signals(false)
        .build()
}

/// Asserts that `expected` passed since `start`, allowing for timer
/// granularity.
#[track_caller]
pub fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "expected {expected:?} to pass, but {elapsed:?} passed"
    );
}
