//! This crate provides a coordinator that performs an orderly, time bounded
//! shutdown of a Tokio based server process.
//!
//! Once [watching](GracefulStop::watch), it waits for SIGINT or SIGTERM (Ctrl+C
//! on Windows) or for a programmatic [shutdown request](GracefulStop::request_shutdown).
//! Then it:
//! - stops the [managed server](ManagedServer), forcefully if the graceful
//!   shutdown takes too long,
//! - fires the [`StopSignal`] of every registered subsystem,
//! - grants the subsystems a grace period to wind down,
//! - and releases everyone waiting in [`wait()`](GracefulStop::wait).
//!
//! Everything happens exactly once, no matter how many tasks call
//! [`watch()`](GracefulStop::watch) or [`abort()`](GracefulStop::abort).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tokio_graceful_stop::{GracefulStop, StopSignal, TaskServer};
//!
//! async fn worker(stop: StopSignal) {
//!     loop {
//!         tokio::select! {
//!             _ = stop.stopped() => break,
//!             _ = tokio::time::sleep(Duration::from_millis(10)) => {
//!                 // ... do some work ...
//!             }
//!         }
//!     }
//!     tracing::info!("Worker stopped.");
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let stop = GracefulStop::new(1, Duration::from_millis(100));
//!
//!     tokio::spawn(worker(stop.subscribe()));
//!
//!     let server = TaskServer::spawn(|shutdown| async move {
//!         // ... accept connections until `shutdown` is cancelled ...
//!         shutdown.cancelled().await;
//!         Ok::<(), std::io::Error>(())
//!     });
//!     stop.set_server_and_watch(server);
//!
//!     // In a real program, this is where SIGTERM or Ctrl+C would arrive.
//! #   stop.request_shutdown();
//!
//!     stop.wait().await;
//! }
//! ```
//!
//! The crate logs through [`tracing`]; it never installs a subscriber itself.

#![deny(unreachable_pub)]
#![deny(missing_docs)]

/// The error type managed servers report their failures with.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

mod builder;
mod coordinator;
pub mod errors;
mod server;
mod signal_handling;
mod state;
mod stop_signal;
mod tokio_task;

pub use builder::{GracefulStopBuilder, DEFAULT_SERVER_TIMEOUT, DEFAULT_TIMEOUT};
pub use coordinator::GracefulStop;
pub use server::{shutdown_server, ManagedServer, TaskServer};
pub use signal_handling::TerminationSignal;
pub use state::StopState;
pub use stop_signal::StopSignal;
