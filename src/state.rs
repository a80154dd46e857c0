use bytemuck::NoUninit;

/// The lifecycle stage of a [`GracefulStop`](crate::GracefulStop).
///
/// Transitions only move forward:
///
/// ```text
/// Idle -> Watching -> ShuttingDown -> Finished
///                  \-> Aborted
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, NoUninit)]
#[repr(u8)]
pub enum StopState {
    /// The watch loop was never started.
    Idle,
    /// Waiting for a termination signal or an abort.
    Watching,
    /// A termination signal arrived and the shutdown sequence is running.
    ShuttingDown,
    /// The shutdown sequence completed.
    Finished,
    /// The watch loop was aborted before a termination signal arrived.
    Aborted,
}

impl StopState {
    /// Whether the watch loop was ever activated.
    pub fn is_started(self) -> bool {
        self != StopState::Idle
    }
}
