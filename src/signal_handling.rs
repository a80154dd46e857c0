use std::{fmt, io};

use tokio::sync::mpsc::{self, error::TrySendError};

/// The event that resolved the trigger race and started the shutdown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminationSignal {
    /// SIGINT on Unix, Ctrl+C on Windows.
    Interrupt,
    /// SIGTERM, the default signal sent by `kill` and service managers.
    Terminate,
    /// A programmatic request through
    /// [`GracefulStop::request_shutdown`](crate::GracefulStop::request_shutdown).
    Requested,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(windows)]
            TerminationSignal::Interrupt => f.write_str("CTRL_C"),
            #[cfg(not(windows))]
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
            TerminationSignal::Requested => f.write_str("shutdown request"),
        }
    }
}

/// Creates the per-instance signal sink.
///
/// A buffer of one is enough: a single pending signal already decides the
/// trigger race, so further ones can be dropped.
pub(crate) fn signal_sink() -> (mpsc::Sender<TerminationSignal>, mpsc::Receiver<TerminationSignal>) {
    mpsc::channel(1)
}

/// Puts a signal into the sink without ever blocking.
///
/// Returns `false` if the signal got dropped, either because another one is
/// already pending or because nobody is listening any more.
pub(crate) fn deliver(sender: &mpsc::Sender<TerminationSignal>, signal: TerminationSignal) -> bool {
    match sender.try_send(signal) {
        Ok(()) => true,
        Err(TrySendError::Full(signal)) => {
            tracing::debug!("Dropping {signal}, a shutdown trigger is already pending.");
            false
        }
        Err(TrySendError::Closed(signal)) => {
            tracing::debug!("Dropping {signal}, the watch loop is no longer running.");
            false
        }
    }
}

/// The operating system signals that request a graceful shutdown.
///
/// The following signals are handled:
///
/// - On Windows:
///     - Ctrl+C (SIGINT)
///
/// - On Unix:
///     - SIGINT and SIGTERM
///
/// SIGKILL can not be caught by any process and is therefore not listed.
pub(crate) struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl OsSignals {
    /// Installs the signal handlers.
    ///
    /// Signals arriving after this call returns are buffered until the
    /// subscription gets polled, so nothing is lost in between.
    #[cfg(unix)]
    pub(crate) fn subscribe() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(windows)]
    pub(crate) fn subscribe() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    #[cfg(not(any(unix, windows)))]
    pub(crate) fn subscribe() -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "signal handling is not supported on this platform",
        ))
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Option<TerminationSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(TerminationSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(TerminationSignal::Terminate),
            else => None,
        }
    }

    #[cfg(windows)]
    async fn recv(&mut self) -> Option<TerminationSignal> {
        self.ctrl_c.recv().await.map(|()| TerminationSignal::Interrupt)
    }

    #[cfg(not(any(unix, windows)))]
    async fn recv(&mut self) -> Option<TerminationSignal> {
        None
    }

    /// Forwards received signals into the sink until its receiving side
    /// is gone.
    pub(crate) async fn forward(mut self, sender: mpsc::Sender<TerminationSignal>) {
        loop {
            let signal = tokio::select! {
                _ = sender.closed() => break,
                signal = self.recv() => signal,
            };

            match signal {
                Some(signal) => {
                    tracing::debug!("Received {signal}.");
                    deliver(&sender, signal);
                }
                None => {
                    tracing::warn!("Signal stream ended, no longer catching signals.");
                    break;
                }
            }
        }
    }
}
