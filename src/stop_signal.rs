use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A fire-once stop notification for a single subsystem.
///
/// Register it at the coordinator through [`GracefulStop::add`](crate::GracefulStop::add);
/// once a shutdown is in progress, the coordinator fires it exactly once and every
/// clone of it observes the transition.
///
/// Internally this is a [`CancellationToken`], so it can be handed to code that
/// already speaks that type through [`StopSignal::token`], and a token can be
/// turned into a stop signal through [`From`].
///
/// # Examples
///
/// ```
/// use tokio_graceful_stop::StopSignal;
///
/// #[tokio::main]
/// async fn main() {
///     let signal = StopSignal::new();
///     let listener = signal.clone();
///
///     let subsystem = tokio::spawn(async move {
///         listener.stopped().await;
///         "cleaned up"
///     });
///
///     signal.fire();
///     assert_eq!(subsystem.await.unwrap(), "cleaned up");
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    /// Creates a new, unfired stop signal.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Fires the signal, releasing all current and future waiters.
    ///
    /// Firing an already fired signal has no effect.
    pub fn fire(&self) {
        self.token.cancel();
    }

    /// Whether the signal was fired already.
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until the signal gets fired.
    ///
    /// Returns immediately if it was fired before.
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Same as [`stopped`](Self::stopped), but owns a clone of the signal,
    /// so the returned future is `'static`.
    pub async fn stopped_owned(self) {
        self.token.cancelled_owned().await
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl From<CancellationToken> for StopSignal {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl From<StopSignal> for CancellationToken {
    fn from(signal: StopSignal) -> Self {
        signal.token
    }
}
