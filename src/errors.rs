//! All the errors that can be caused by this crate.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::BoxedError;

/// The ways a bounded server shutdown can fail.
///
/// Returned by [`shutdown_server`](crate::shutdown_server). Inside of the
/// shutdown sequence these are only logged; none of them stops the
/// sequence.
#[derive(Debug, Error, Diagnostic)]
pub enum ServerShutdownError {
    /// The server did not finish its graceful shutdown within the given time.
    #[error("server shutdown did not finish within {0:?}")]
    #[diagnostic(code(graceful_stop::server_timeout))]
    Timeout(Duration),
    /// The server reported an error while shutting down.
    #[error("server shutdown failed")]
    #[diagnostic(code(graceful_stop::server_failed))]
    Failed(#[source] BoxedError),
    /// The server panicked while shutting down.
    ///
    /// Only reported inside of the shutdown sequence, which runs the server
    /// shutdown in a task of its own.
    #[error("server shutdown panicked")]
    #[diagnostic(code(graceful_stop::server_panicked))]
    Panicked,
}

impl ServerShutdownError {
    /// Whether the server exceeded its shutdown deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServerShutdownError::Timeout(_))
    }
}

/// The shutdown sequence did not complete within the time given to
/// [`wait_timeout`](crate::GracefulStop::wait_timeout).
#[derive(Debug, Error, Diagnostic)]
#[error("shutdown did not complete within {0:?}")]
#[diagnostic(code(graceful_stop::wait_timeout))]
pub struct WaitTimeoutError(pub(crate) Duration);

impl WaitTimeoutError {
    /// The time that was waited for.
    pub fn timeout(&self) -> Duration {
        self.0
    }
}
