use std::{
    fmt,
    sync::{atomic::Ordering, Arc, Mutex, MutexGuard},
    time::Duration,
};

use atomic::Atomic;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    builder::{DEFAULT_SERVER_TIMEOUT, DEFAULT_TIMEOUT},
    errors::WaitTimeoutError,
    server::stop_server,
    signal_handling::{deliver, signal_sink, OsSignals, TerminationSignal},
    tokio_task, GracefulStopBuilder, ManagedServer, StopSignal, StopState,
};

struct Inner {
    timeout: Duration,
    server_timeout: Duration,
    catch_signals: bool,
    stop_signals: Mutex<Vec<StopSignal>>,
    server: Mutex<Option<Arc<dyn ManagedServer>>>,
    signal_sender: mpsc::Sender<TerminationSignal>,
    // Taken by the watch loop when it starts.
    signal_receiver: Mutex<Option<mpsc::Receiver<TerminationSignal>>>,
    break_signal: CancellationToken,
    state: Atomic<StopState>,
    done_signal: CancellationToken,
}

/// Coordinates the graceful shutdown of a server process.
///
/// Once [watching](GracefulStop::watch), it waits for SIGINT or SIGTERM
/// (Ctrl+C on Windows) and then performs the shutdown sequence:
///
/// 1. Shuts down the [managed server](GracefulStop::set_server), if one is
///    attached. If the server does not finish within the server timeout, it
///    gets closed forcefully.
/// 2. Fires the [`StopSignal`] of every registered subsystem.
/// 3. If at least one subsystem is registered, grants them the configured
///    grace period to wind down.
/// 4. Releases everyone blocked in [`wait`](GracefulStop::wait).
///
/// The object is a cheap handle; clones refer to the same coordinator and
/// can be moved into other tasks freely.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tokio_graceful_stop::GracefulStop;
///
/// #[tokio::main]
/// async fn main() {
///     let stop = GracefulStop::new(1, Duration::from_millis(100));
///
///     let worker_stop = stop.subscribe();
///     let worker = tokio::spawn(async move {
///         worker_stop.stopped().await;
///         // ... flush buffers, close files ...
///     });
///
///     stop.watch();
///
///     // Usually triggered by SIGTERM or Ctrl+C.
///     stop.request_shutdown();
///
///     stop.wait().await;
///     worker.await.unwrap();
/// }
/// ```
#[derive(Clone)]
pub struct GracefulStop {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl GracefulStop {
    /// Creates a new coordinator.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The number of subsystems expected to register. Only a hint.
    /// * `timeout` - The grace period subsystems get after their stop signal
    ///   fired. Zero disables it.
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self::builder().capacity(capacity).timeout(timeout).build()
    }

    /// Creates a [`GracefulStopBuilder`] for more detailed configuration.
    pub fn builder() -> GracefulStopBuilder {
        GracefulStopBuilder::new()
    }

    pub(crate) fn from_builder(builder: GracefulStopBuilder) -> Self {
        let (signal_sender, signal_receiver) = signal_sink();

        Self {
            inner: Arc::new(Inner {
                timeout: builder.timeout.unwrap_or(DEFAULT_TIMEOUT),
                server_timeout: builder.server_timeout.unwrap_or(DEFAULT_SERVER_TIMEOUT),
                catch_signals: !builder.ignore_signals,
                stop_signals: Mutex::new(Vec::with_capacity(builder.capacity)),
                server: Mutex::new(builder.server),
                signal_sender,
                signal_receiver: Mutex::new(Some(signal_receiver)),
                break_signal: CancellationToken::new(),
                state: Atomic::new(StopState::Idle),
                done_signal: CancellationToken::new(),
            }),
        }
    }

    /// Registers the stop signal of a subsystem.
    ///
    /// The signal gets fired once during the shutdown sequence, after the
    /// managed server has stopped.
    ///
    /// Subsystems have to be registered before the shutdown sequence starts;
    /// later registrations are not notified.
    pub fn add(&self, stop_signal: impl Into<StopSignal>) {
        if matches!(
            self.state(),
            StopState::ShuttingDown | StopState::Finished
        ) {
            tracing::warn!("Subsystem registered after shutdown started, it might not get notified.");
        }

        lock(&self.inner.stop_signals).push(stop_signal.into());
    }

    /// Creates a new [`StopSignal`], registers it and returns it.
    pub fn subscribe(&self) -> StopSignal {
        let stop_signal = StopSignal::new();
        self.add(stop_signal.clone());
        stop_signal
    }

    /// Attaches the server that gets shut down first during the shutdown
    /// sequence. Replaces a previously attached server.
    pub fn set_server(&self, server: impl ManagedServer) {
        *lock(&self.inner.server) = Some(Arc::new(server));
    }

    /// Attaches the server and starts [watching](Self::watch).
    ///
    /// Convenient inside of server construction callbacks, which can hand
    /// over the server and make sure the watch is running in one call.
    ///
    /// # Returns
    ///
    /// `true` if this call started the watch loop.
    #[track_caller]
    pub fn set_server_and_watch(&self, server: impl ManagedServer) -> bool {
        self.set_server(server);
        self.watch()
    }

    /// Starts waiting for termination signals in the background.
    ///
    /// Only the first call has an effect, no matter how many tasks call it
    /// concurrently. Once the first call returned, signals are caught.
    ///
    /// Must be called from within a Tokio runtime. Calls from outside of a
    /// runtime have no effect and leave the coordinator ready to be watched.
    ///
    /// # Returns
    ///
    /// `true` if this call started the watch loop.
    #[track_caller]
    pub fn watch(&self) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::error!("Not inside of a Tokio runtime, unable to watch.");
            return false;
        }

        if self
            .inner
            .state
            .compare_exchange(
                StopState::Idle,
                StopState::Watching,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        let Some(signal_receiver) = lock(&self.inner.signal_receiver).take() else {
            tracing::error!("Signal sink is already in use, unable to watch.");
            return false;
        };

        if self.inner.catch_signals {
            match OsSignals::subscribe() {
                Ok(os_signals) => {
                    tokio_task::spawn(
                        os_signals.forward(self.inner.signal_sender.clone()),
                        "graceful-stop-signals",
                    );
                }
                Err(e) => {
                    tracing::error!("Unable to catch termination signals: {}", e);
                }
            }
        }

        tokio_task::spawn(
            Arc::clone(&self.inner).watch(signal_receiver),
            "graceful-stop-watch",
        );

        tracing::debug!("Waiting for termination signals ...");
        true
    }

    /// Stops watching without performing the shutdown sequence.
    ///
    /// Has no effect once a termination signal was received; the shutdown
    /// sequence can not be interrupted. Calling it multiple times is harmless.
    ///
    /// Note that [`wait`](Self::wait) never returns after a successful abort
    /// if the watch was started, as the shutdown sequence does not run.
    /// Use [`state`](Self::state) to detect this case.
    pub fn abort(&self) {
        if !self.inner.break_signal.is_cancelled() {
            tracing::debug!("Aborting watch ...");
            self.inner.break_signal.cancel();
        }
    }

    /// Triggers the shutdown sequence as if a termination signal arrived.
    ///
    /// Never blocks. If called before [`watch`](Self::watch), the request
    /// stays pending and triggers the shutdown as soon as watching starts.
    ///
    /// # Returns
    ///
    /// `false` if the request got dropped, because another trigger is
    /// already pending or the watch loop already ended.
    pub fn request_shutdown(&self) -> bool {
        deliver(&self.inner.signal_sender, TerminationSignal::Requested)
    }

    /// Waits until the shutdown sequence completed.
    ///
    /// Returns immediately if watching was never started.
    pub async fn wait(&self) {
        if self.state().is_started() {
            self.inner.done_signal.cancelled().await;
        }
    }

    /// Same as [`wait`](Self::wait), but gives up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<(), WaitTimeoutError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| WaitTimeoutError(timeout))
    }

    /// The current lifecycle stage.
    pub fn state(&self) -> StopState {
        self.inner.state.load(Ordering::Acquire)
    }

    /// Whether the shutdown sequence completed.
    pub fn is_finished(&self) -> bool {
        self.inner.done_signal.is_cancelled()
    }
}

impl Inner {
    async fn watch(self: Arc<Self>, mut signal_receiver: mpsc::Receiver<TerminationSignal>) {
        let signal = tokio::select! {
            biased;
            _ = self.break_signal.cancelled() => None,
            signal = signal_receiver.recv() => signal,
        };

        // Closes the sink, which also ends the signal forwarding.
        drop(signal_receiver);

        let Some(signal) = signal else {
            self.state.store(StopState::Aborted, Ordering::Release);
            tracing::debug!("Watch aborted.");
            return;
        };

        self.state.store(StopState::ShuttingDown, Ordering::Release);
        tracing::info!("Received {}, shutting down ...", signal);

        self.shutdown_sequence().await;
    }

    async fn shutdown_sequence(&self) {
        let server = lock(&self.server).clone();
        if let Some(server) = server {
            stop_server(server, self.server_timeout).await;
        }

        let stop_signals = std::mem::take(&mut *lock(&self.stop_signals));
        for stop_signal in &stop_signals {
            stop_signal.fire();
        }
        tracing::debug!("Notified {} subsystem(s).", stop_signals.len());

        if !self.timeout.is_zero() && !stop_signals.is_empty() {
            tracing::debug!("Granting subsystems {:?} to wind down ...", self.timeout);
            tokio::time::sleep(self.timeout).await;
        }

        self.state.store(StopState::Finished, Ordering::Release);
        self.done_signal.cancel();
        tracing::info!("Shutdown finished.");
    }
}

impl fmt::Debug for GracefulStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GracefulStop")
            .field("state", &self.state())
            .field("timeout", &self.inner.timeout)
            .field("server_timeout", &self.inner.server_timeout)
            .field("pending_subsystems", &lock(&self.inner.stop_signals).len())
            .field("has_server", &lock(&self.inner.server).is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests;
