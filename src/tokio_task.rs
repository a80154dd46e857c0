use std::future::Future;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawns a background task of the coordinator.
///
/// The task runs inside of the caller's current span, so its log output
/// stays attributed to whoever started it.
///
/// With `tokio_unstable` and the `tracing` feature, the task carries `name`,
/// which makes it identifiable in tools like `tokio-console`.
#[cfg(not(all(tokio_unstable, feature = "tracing")))]
#[track_caller]
pub(crate) fn spawn<F>(f: F, _name: &str) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(f.in_current_span())
}

#[cfg(all(tokio_unstable, feature = "tracing"))]
#[track_caller]
pub(crate) fn spawn<F>(f: F, name: &str) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match tokio::task::Builder::new().name(name).spawn(f.in_current_span()) {
        Ok(handle) => handle,
        Err(e) => panic!("unable to spawn task '{name}': {e}"),
    }
}
