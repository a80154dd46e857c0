use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{errors::ServerShutdownError, tokio_task, BoxedError};

/// A network server whose lifetime is bounded by a [`GracefulStop`](crate::GracefulStop).
///
/// The coordinator never creates or destroys the server, it only asks it to
/// stop: first gracefully, within a deadline, and if the deadline passes,
/// forcefully.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use tokio_graceful_stop::{BoxedError, ManagedServer};
/// use tokio_util::sync::CancellationToken;
///
/// struct MyServer {
///     stop_accepting: CancellationToken,
/// }
///
/// #[async_trait]
/// impl ManagedServer for MyServer {
///     async fn shutdown(&self) -> Result<(), BoxedError> {
///         self.stop_accepting.cancel();
///         // ... wait for open connections to drain ...
///         Ok(())
///     }
///
///     async fn force_close(&self) -> Result<(), BoxedError> {
///         // ... drop all open connections ...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ManagedServer: Send + Sync + 'static {
    /// Stops accepting new connections and waits for the open ones to finish.
    ///
    /// The coordinator bounds this call with a deadline and drops the returned
    /// future once the deadline passes, so implementations must be cancel safe.
    async fn shutdown(&self) -> Result<(), BoxedError>;

    /// Closes the server and all connections it tracks immediately.
    ///
    /// Only invoked if [`shutdown`](Self::shutdown) exceeded its deadline.
    /// Connections the server handed off and no longer tracks (for example
    /// upgraded websocket connections) are not guaranteed to be closed.
    async fn force_close(&self) -> Result<(), BoxedError>;
}

#[async_trait]
impl<T: ManagedServer + ?Sized> ManagedServer for Arc<T> {
    async fn shutdown(&self) -> Result<(), BoxedError> {
        (**self).shutdown().await
    }

    async fn force_close(&self) -> Result<(), BoxedError> {
        (**self).force_close().await
    }
}

/// Performs a graceful server shutdown bounded by `timeout`.
///
/// # Returns
///
/// * `Ok(())` - The server shut down within the deadline.
/// * [`ServerShutdownError::Timeout`] - The deadline passed; the shutdown
///   future got dropped.
/// * [`ServerShutdownError::Failed`] - The server reported an error.
pub async fn shutdown_server(
    server: &dyn ManagedServer,
    timeout: Duration,
) -> Result<(), ServerShutdownError> {
    match tokio::time::timeout(timeout, server.shutdown()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerShutdownError::Failed(e)),
        Err(_elapsed) => Err(ServerShutdownError::Timeout(timeout)),
    }
}

/// Stops the server, falling back to a forced close if the graceful
/// shutdown exceeds `timeout`. Never fails; problems get logged.
///
/// The server's methods run in tasks of their own, so a panicking server
/// can not take the shutdown sequence down with it.
pub(crate) async fn stop_server(server: Arc<dyn ManagedServer>, timeout: Duration) {
    tracing::info!("Shutting down server ...");

    let shutdown = tokio_task::spawn(
        {
            let server = Arc::clone(&server);
            async move { shutdown_server(server.as_ref(), timeout).await }
        },
        "graceful-stop-server-shutdown",
    );
    let result = shutdown
        .await
        .unwrap_or_else(|_join_error| Err(ServerShutdownError::Panicked));

    if let Err(err) = result {
        tracing::warn!("Server shutdown error: {}", err);

        if err.is_timeout() {
            tracing::error!("Forcing server shutdown ...");
            let force_close = tokio_task::spawn(
                async move { server.force_close().await },
                "graceful-stop-server-force-close",
            );
            match force_close.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!("Forced server shutdown failed: {}", err),
                Err(err) => tracing::error!("Forced server shutdown failed: {}", err),
            }
        }
    }

    tracing::info!("Server stopped.");
}

/// Adapts a server that runs inside of a spawned task into a [`ManagedServer`].
///
/// The server function receives a [`CancellationToken`] that gets cancelled
/// once a graceful shutdown is requested; it is expected to stop accepting
/// connections then, drain the open ones and return. This is the shape of
/// most Tokio based servers, like hyper's or axum's `with_graceful_shutdown`.
///
/// A forced close aborts the task.
pub struct TaskServer {
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<(), BoxedError>>>>,
    abort_handle: AbortHandle,
}

impl TaskServer {
    /// Spawns the server function as a new task.
    ///
    /// Must be called from within a Tokio runtime.
    #[track_caller]
    pub fn spawn<Err, Fut, Srv>(server: Srv) -> Self
    where
        Srv: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), Err>> + Send + 'static,
        Err: Into<BoxedError>,
    {
        let token = CancellationToken::new();
        let server_future = server(token.clone());

        let task = tokio_task::spawn(
            async move { server_future.await.map_err(Into::<BoxedError>::into) },
            "graceful-stop-server",
        );
        let abort_handle = task.abort_handle();

        Self {
            token,
            task: Mutex::new(Some(task)),
            abort_handle,
        }
    }

    /// The token that signals the server to shut down gracefully.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the server task has ended.
    pub fn is_finished(&self) -> bool {
        self.abort_handle.is_finished()
    }
}

#[async_trait]
impl ManagedServer for TaskServer {
    async fn shutdown(&self) -> Result<(), BoxedError> {
        self.token.cancel();

        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(task) = task else {
            // Already joined by an earlier call.
            return Ok(());
        };

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn force_close(&self) -> Result<(), BoxedError> {
        self.abort_handle.abort();
        Ok(())
    }
}
