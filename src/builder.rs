use std::{sync::Arc, time::Duration};

use crate::{GracefulStop, ManagedServer};

/// The grace period granted to registered subsystems if nothing else is
/// configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The time the managed server gets for its graceful shutdown before it
/// gets closed forcefully.
///
/// Longer than [`DEFAULT_TIMEOUT`], as draining open connections usually
/// dominates the shutdown.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(15);

/// Configures a [`GracefulStop`] before it gets created.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tokio_graceful_stop::GracefulStop;
///
/// let stop = GracefulStop::builder()
///     .capacity(4)
///     .timeout(Duration::from_secs(2))
///     .server_timeout(Duration::from_secs(10))
///     .build();
/// ```
#[derive(Default)]
#[must_use = "the builder does nothing until `build()` is called"]
pub struct GracefulStopBuilder {
    pub(crate) capacity: usize,
    pub(crate) timeout: Option<Duration>,
    pub(crate) server_timeout: Option<Duration>,
    pub(crate) ignore_signals: bool,
    pub(crate) server: Option<Arc<dyn ManagedServer>>,
}

impl GracefulStopBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of subsystems that are expected to register.
    ///
    /// Only a hint to pre-allocate storage; any number can be registered.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the grace period that gets awaited after all registered
    /// subsystems were notified.
    ///
    /// Zero disables the grace period.
    ///
    /// The default is [`DEFAULT_TIMEOUT`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the deadline of the server's graceful shutdown.
    ///
    /// The default is [`DEFAULT_SERVER_TIMEOUT`].
    pub fn server_timeout(mut self, server_timeout: Duration) -> Self {
        self.server_timeout = Some(server_timeout);
        self
    }

    /// Whether SIGINT and SIGTERM (Ctrl+C on Windows) trigger the shutdown.
    ///
    /// If disabled, only [`GracefulStop::request_shutdown`] can trigger it.
    /// The default is `true`.
    pub fn catch_signals(mut self, catch_signals: bool) -> Self {
        self.ignore_signals = !catch_signals;
        self
    }

    /// Attaches the managed server right away.
    pub fn server(mut self, server: impl ManagedServer) -> Self {
        self.server = Some(Arc::new(server));
        self
    }

    /// Creates the coordinator.
    pub fn build(self) -> GracefulStop {
        GracefulStop::from_builder(self)
    }
}
